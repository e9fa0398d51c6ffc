// RS-485 half-duplex line on USART1.

// Key Features:
// - Receive interrupt moves bytes into a lock-free queue (`on_receive`)
// - Frames are sent with the transceiver driver enabled for the whole frame
// - `reopen` rebuilds the USART for a new baud rate and frame format

// Detailed Operation:
// `Rs485Link` is owned by the main loop, which sends replies with blocking
// writes. The receive interrupt never touches it: `on_receive` reads the data
// register directly and only feeds the single-producer queue, so a long reply
// never holds off the higher priority tasks.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

use hal::{
    self,
    clocks::Clocks,
    gpio::Pin,
    pac::{self, USART1},
    usart::{Parity, StopBits, Usart, UsartConfig, UsartInterrupt, WordLen},
};
use heapless::spsc::{Consumer, Producer};

use hmdscan_algo::config::{FrameFormat, LinkSettings};
use hmdscan_algo::registers::rtu::SerialLink;

use super::pinout;

/// Receive queue depth; one request frame plus margin.
pub const RX_QUEUE_LEN: usize = 512;

const ISR_RXNE: u32 = 1 << 5;
const ISR_ORE: u32 = 1 << 3;
const ICR_ORECF: u32 = 1 << 3;

/// Line parameters for a frame format. Parity counts as a ninth data bit.
fn usart_config(format: FrameFormat) -> UsartConfig {
    let (word_len, parity, stop_bits) = match format {
        FrameFormat::Serial8N1 => (WordLen::W8, Parity::Disabled, StopBits::S1),
        FrameFormat::Serial8N2 => (WordLen::W8, Parity::Disabled, StopBits::S2),
        FrameFormat::Serial8E1 => (WordLen::W9, Parity::EnabledEven, StopBits::S1),
        FrameFormat::Serial8O1 => (WordLen::W9, Parity::EnabledOdd, StopBits::S1),
    };
    UsartConfig {
        word_len,
        parity,
        stop_bits,
        ..Default::default()
    }
}

pub struct Rs485Link {
    usart: Option<Usart<USART1>>,
    de: Pin,
    clock_cfg: Clocks,
}

impl Rs485Link {
    pub fn new(usart1: USART1, settings: &LinkSettings, clock_cfg: &Clocks) -> Self {
        pinout::bus::USART1_TX.init();
        pinout::bus::USART1_RX.init();
        let mut de = pinout::bus::RS485_DE.init();
        de.set_low();

        let mut link = Rs485Link {
            usart: None,
            de,
            clock_cfg: clock_cfg.clone(),
        };
        link.open(usart1, settings);
        link
    }

    fn open(&mut self, usart1: USART1, settings: &LinkSettings) {
        let mut usart = Usart::new(
            usart1,
            settings.baud_rate.bits_per_second(),
            usart_config(settings.frame_format),
            &self.clock_cfg,
        );
        usart.enable_interrupt(UsartInterrupt::ReadNotEmpty);
        self.usart = Some(usart);
    }

    /// Receive interrupt body: moves the received byte into the queue.
    pub fn on_receive(rx: &mut Producer<'static, u8, RX_QUEUE_LEN>) {
        // Status and data registers only; reading RDR clears RXNE
        let regs = unsafe { &*pac::USART1::ptr() };
        let isr = regs.isr.read().bits();
        if isr & ISR_ORE != 0 {
            regs.icr.write(|w| unsafe { w.bits(ICR_ORECF) });
        }
        if isr & ISR_RXNE != 0 {
            let byte = regs.rdr.read().bits() as u8;
            if rx.enqueue(byte).is_err() {
                defmt::warn!("MODBUS: receive queue full");
            }
        }
    }

    pub fn send(&mut self, frame: &[u8]) {
        if let Some(usart) = self.usart.as_mut() {
            self.de.set_high();
            if usart.write(frame).is_err() {
                defmt::warn!("MODBUS: transmit failed");
            }
            self.de.set_low();
        }
    }

    pub fn reopen(&mut self, settings: &LinkSettings) {
        if let Some(old) = self.usart.take() {
            self.open(old.regs, settings);
        }
    }
}

/// `SerialLink` view pairing the link with the receive queue consumer.
pub struct LinkPort<'a> {
    pub link: &'a mut Rs485Link,
    pub rx: &'a mut Consumer<'static, u8, RX_QUEUE_LEN>,
}

impl SerialLink for LinkPort<'_> {
    fn read(&mut self) -> Option<u8> {
        self.rx.dequeue()
    }

    fn write(&mut self, frame: &[u8]) {
        self.link.send(frame);
    }

    fn reopen(&mut self, settings: &LinkSettings) {
        while self.rx.dequeue().is_some() {}
        self.link.reopen(settings);
    }
}
