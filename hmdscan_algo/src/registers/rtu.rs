// Modbus RTU slave serving the holding register file.

// Key Features:
// - Function 3 (read holding registers) and 16 (write multiple registers)
// - CRC-16/MODBUS check on requests and appended to replies
// - Broadcast writes (address 0) executed without reply
// - Exception replies: illegal function, illegal data address, illegal data value
// - Frame end detected by the t3.5 silent interval, fixed at 1750 µs above 19200 baud
// - Cumulative error counter reported to the register exchange

// Detailed Operation:
// Bytes are drained from the `SerialLink` into the frame buffer on every poll and
// time-stamped with the poll time. Once the line has been silent for t3.5 the
// buffered bytes are treated as one request. Frames addressed to another slave
// are dropped silently; malformed frames and exceptions bump the error counter.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

use super::RegisterTransport;
use crate::config::{BaudRate, LinkSettings};

pub const FUNCTION_READ_HOLDING: u8 = 3;
pub const FUNCTION_WRITE_MULTIPLE: u8 = 16;

const BROADCAST: u8 = 0;
const EXCEPTION_FLAG: u8 = 0x80;
const FRAME_CAPACITY: usize = 256;
const CRC_LEN: usize = 2;
/// Shortest request carrying address, function, start, count and CRC.
const MIN_REQUEST_LEN: usize = 8;
const MAX_READ_WORDS: usize = 125;
const MAX_WRITE_WORDS: usize = 123;

type Frame = heapless::Vec<u8, FRAME_CAPACITY>;

/// Half-duplex serial line carrying the RTU frames.
pub trait SerialLink {
    /// Next received byte, if any.
    fn read(&mut self) -> Option<u8>;
    /// Transmits a complete reply frame.
    fn write(&mut self, frame: &[u8]);
    /// Applies new line parameters, dropping anything in flight.
    fn reopen(&mut self, settings: &LinkSettings);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ExceptionCode {
    IllegalFunction = 1,
    IllegalDataAddress = 2,
    IllegalDataValue = 3,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RtuError {
    ShortFrame,
    Crc,
    Overflow,
    Exception(ExceptionCode),
}

/// CRC-16/MODBUS of a frame body, sent low byte first.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = crc_any::CRC::crc16modbus();
    crc.digest(data);
    crc.get_crc() as u16
}

/// Inter-frame silence in µs: 3.5 characters of 11 bits, fixed above 19200 baud.
pub const fn silent_interval_us(baud: BaudRate) -> u32 {
    let bps = baud.bits_per_second();
    if bps > 19_200 {
        1750
    } else {
        38_500_000 / bps
    }
}

pub struct RtuSlave {
    slave_id: u8,
    silent_us: u32,
    frame: Frame,
    last_rx_us: u32,
    overflow: bool,
    errors: u16,
}

impl RtuSlave {
    pub fn new(settings: &LinkSettings) -> Self {
        Self {
            slave_id: settings.slave_id.to_register() as u8,
            silent_us: silent_interval_us(settings.baud_rate),
            frame: Frame::new(),
            last_rx_us: 0,
            overflow: false,
            errors: 0,
        }
    }

    /// Adopts new link parameters and reopens the line. The error counter is kept.
    pub fn reconfigure<L: SerialLink>(&mut self, link: &mut L, settings: &LinkSettings) {
        info!(
            "MODBUS: id {} at {} baud",
            settings.slave_id.to_register(),
            settings.baud_rate.bits_per_second()
        );
        self.slave_id = settings.slave_id.to_register() as u8;
        self.silent_us = silent_interval_us(settings.baud_rate);
        self.frame.clear();
        self.overflow = false;
        link.reopen(settings);
    }

    #[inline(always)]
    pub fn errors(&self) -> u16 {
        self.errors
    }

    /// Pairs the slave with a link for one register exchange.
    pub fn bind<'a, L: SerialLink>(&'a mut self, link: &'a mut L) -> RtuPort<'a, L> {
        RtuPort { slave: self, link }
    }

    /// Drains the link and answers a request once the line went silent.
    ///
    /// Returns the cumulative error count.
    pub fn poll<L: SerialLink>(&mut self, link: &mut L, registers: &mut [u16], now_us: u32) -> u16 {
        while let Some(byte) = link.read() {
            if self.frame.push(byte).is_err() {
                self.overflow = true;
            }
            self.last_rx_us = now_us;
        }

        if self.frame.is_empty() || now_us.wrapping_sub(self.last_rx_us) < self.silent_us {
            return self.errors;
        }

        if let Err(e) = self.process(link, registers) {
            debug!("MODBUS: request failed: {}", e);
            self.errors = self.errors.wrapping_add(1);
        }
        self.frame.clear();
        self.overflow = false;
        self.errors
    }

    fn process<L: SerialLink>(&mut self, link: &mut L, registers: &mut [u16]) -> Result<(), RtuError> {
        if self.overflow {
            return Err(RtuError::Overflow);
        }
        if self.frame.len() < MIN_REQUEST_LEN {
            return Err(RtuError::ShortFrame);
        }

        let address = self.frame[0];
        if address != self.slave_id && address != BROADCAST {
            return Ok(());
        }

        let (body, crc) = self.frame.split_at(self.frame.len() - CRC_LEN);
        if crc16(body) != u16::from_le_bytes([crc[0], crc[1]]) {
            return Err(RtuError::Crc);
        }

        let mut reply = Frame::new();
        let result = handle_request(body, registers, &mut reply);
        if let Err(code) = result {
            reply.clear();
            // Capacity is far above the three exception bytes.
            let _ = reply.extend_from_slice(&[address, body[1] | EXCEPTION_FLAG, code as u8]);
        }

        if address != BROADCAST {
            let crc = crc16(&reply);
            let _ = reply.extend_from_slice(&crc.to_le_bytes());
            link.write(&reply);
        }

        result.map_err(RtuError::Exception)
    }
}

/// Executes one CRC-checked request (without CRC) and builds the reply body.
fn handle_request(body: &[u8], registers: &mut [u16], reply: &mut Frame) -> Result<(), ExceptionCode> {
    let function = body[1];
    let start = u16::from_be_bytes([body[2], body[3]]) as usize;
    let count = u16::from_be_bytes([body[4], body[5]]) as usize;

    match function {
        FUNCTION_READ_HOLDING => {
            if count == 0 || count > MAX_READ_WORDS {
                return Err(ExceptionCode::IllegalDataValue);
            }
            if start + count > registers.len() {
                return Err(ExceptionCode::IllegalDataAddress);
            }
            push_bytes(reply, &[body[0], function, (count * 2) as u8])?;
            for word in &registers[start..start + count] {
                push_bytes(reply, &word.to_be_bytes())?;
            }
            Ok(())
        }
        FUNCTION_WRITE_MULTIPLE => {
            let byte_count = body.get(6).copied().unwrap_or(0) as usize;
            if count == 0
                || count > MAX_WRITE_WORDS
                || byte_count != count * 2
                || body.len() != 7 + byte_count
            {
                return Err(ExceptionCode::IllegalDataValue);
            }
            if start + count > registers.len() {
                return Err(ExceptionCode::IllegalDataAddress);
            }
            for (word, bytes) in registers[start..start + count]
                .iter_mut()
                .zip(body[7..].chunks_exact(2))
            {
                *word = u16::from_be_bytes([bytes[0], bytes[1]]);
            }
            push_bytes(reply, &body[..6])
        }
        _ => Err(ExceptionCode::IllegalFunction),
    }
}

fn push_bytes(reply: &mut Frame, bytes: &[u8]) -> Result<(), ExceptionCode> {
    reply
        .extend_from_slice(bytes)
        .map_err(|_| ExceptionCode::IllegalDataValue)
}

/// A slave bound to its link, usable as the exchange transport.
pub struct RtuPort<'a, L: SerialLink> {
    slave: &'a mut RtuSlave,
    link: &'a mut L,
}

impl<'a, L: SerialLink> RegisterTransport for RtuPort<'a, L> {
    fn poll(&mut self, registers: &mut [u16], now_us: u32) -> u16 {
        self.slave.poll(&mut *self.link, registers, now_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{defaults, FrameFormat};
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[derive(Default)]
    struct ScriptedLink {
        rx: VecDeque<u8>,
        tx: Vec<Vec<u8>>,
        reopened: usize,
    }

    impl ScriptedLink {
        fn receive(&mut self, body: &[u8]) {
            self.rx.extend(body.iter().copied());
            self.rx.extend(crc16(body).to_le_bytes());
        }
    }

    impl SerialLink for ScriptedLink {
        fn read(&mut self) -> Option<u8> {
            self.rx.pop_front()
        }

        fn write(&mut self, frame: &[u8]) {
            self.tx.push(frame.to_vec());
        }

        fn reopen(&mut self, _settings: &LinkSettings) {
            self.reopened += 1;
            self.rx.clear();
        }
    }

    fn slave() -> RtuSlave {
        RtuSlave::new(&defaults::FACTORY.link())
    }

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let mut frame = body.to_vec();
        frame.extend(crc16(body).to_le_bytes());
        frame
    }

    /// Polls once to receive and again after the silent interval to process.
    fn exchange(slave: &mut RtuSlave, link: &mut ScriptedLink, registers: &mut [u16]) -> u16 {
        slave.poll(link, registers, 1_000);
        slave.poll(link, registers, 1_000 + 5_000)
    }

    #[test]
    fn crc_matches_reference_frame() {
        let crc = crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(crc.to_le_bytes(), [0xC5, 0xCD]);
        assert_eq!(crc16(b"123456789"), 0x4B37);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn silent_interval_depends_on_baud() {
        assert_eq!(silent_interval_us(BaudRate::B9600), 4010);
        assert_eq!(silent_interval_us(BaudRate::B19200), 2005);
        assert_eq!(silent_interval_us(BaudRate::B115200), 1750);
    }

    #[test]
    fn reads_holding_registers() {
        let mut registers = [0u16; 58];
        registers[0] = 58;
        registers[1] = 50;
        let mut slave = slave();
        let mut link = ScriptedLink::default();
        link.receive(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]);

        assert_eq!(exchange(&mut slave, &mut link, &mut registers), 0);
        assert_eq!(link.tx, [with_crc(&[0x01, 0x03, 0x04, 0x00, 58, 0x00, 50])]);
    }

    #[test]
    fn writes_multiple_registers() {
        let mut registers = [0u16; 58];
        let mut slave = slave();
        let mut link = ScriptedLink::default();
        link.receive(&[0x01, 0x10, 0x00, 0x08, 0x00, 0x02, 0x04, 0x00, 0x08, 0x00, 0x3C]);

        assert_eq!(exchange(&mut slave, &mut link, &mut registers), 0);
        assert_eq!(registers[8], 8);
        assert_eq!(registers[9], 60);
        assert_eq!(link.tx, [with_crc(&[0x01, 0x10, 0x00, 0x08, 0x00, 0x02])]);
    }

    #[test]
    fn waits_for_silent_interval() {
        let mut registers = [0u16; 58];
        let mut slave = slave();
        let mut link = ScriptedLink::default();
        link.receive(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);

        slave.poll(&mut link, &mut registers, 10_000);
        slave.poll(&mut link, &mut registers, 10_000 + 1_000);
        assert!(link.tx.is_empty());
        slave.poll(&mut link, &mut registers, 10_000 + 2_005);
        assert_eq!(link.tx.len(), 1);
    }

    #[test]
    fn broadcast_write_is_silent() {
        let mut registers = [0u16; 58];
        let mut slave = slave();
        let mut link = ScriptedLink::default();
        link.receive(&[0x00, 0x10, 0x00, 0x11, 0x00, 0x01, 0x02, 0x00, 0x03]);

        assert_eq!(exchange(&mut slave, &mut link, &mut registers), 0);
        assert_eq!(registers[17], 3);
        assert!(link.tx.is_empty());
    }

    #[test]
    fn other_slave_is_ignored() {
        let mut registers = [0u16; 58];
        let mut slave = slave();
        let mut link = ScriptedLink::default();
        link.receive(&[0x07, 0x03, 0x00, 0x00, 0x00, 0x01]);

        assert_eq!(exchange(&mut slave, &mut link, &mut registers), 0);
        assert!(link.tx.is_empty());
    }

    #[test]
    fn exceptions_are_answered_and_counted() {
        let mut registers = [0u16; 58];
        let mut slave = slave();
        let mut link = ScriptedLink::default();

        link.receive(&[0x01, 0x04, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(exchange(&mut slave, &mut link, &mut registers), 1);
        assert_eq!(link.tx[0], with_crc(&[0x01, 0x84, 0x01]));

        link.receive(&[0x01, 0x03, 0x00, 0x38, 0x00, 0x04]);
        assert_eq!(exchange(&mut slave, &mut link, &mut registers), 2);
        assert_eq!(link.tx[1], with_crc(&[0x01, 0x83, 0x02]));

        link.receive(&[0x01, 0x10, 0x00, 0x08, 0x00, 0x02, 0x02, 0x00, 0x08]);
        assert_eq!(exchange(&mut slave, &mut link, &mut registers), 3);
        assert_eq!(link.tx[2], with_crc(&[0x01, 0x90, 0x03]));
        assert_eq!(registers[8], 0);
    }

    #[test]
    fn corrupt_and_short_frames_are_counted() {
        let mut registers = [0u16; 58];
        let mut slave = slave();
        let mut link = ScriptedLink::default();

        link.rx.extend([0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(exchange(&mut slave, &mut link, &mut registers), 1);

        link.rx.extend([0x01, 0x03, 0x00]);
        assert_eq!(exchange(&mut slave, &mut link, &mut registers), 2);
        assert!(link.tx.is_empty());
    }

    #[test]
    fn reconfigure_changes_address_and_reopens() {
        let mut registers = [0u16; 58];
        let mut slave = slave();
        let mut link = ScriptedLink::default();
        let mut settings = defaults::FACTORY.link();
        settings.slave_id = crate::config::SlaveId::from_register(9).unwrap();
        settings.frame_format = FrameFormat::Serial8E1;

        slave.reconfigure(&mut link, &settings);
        assert_eq!(link.reopened, 1);

        link.receive(&[0x09, 0x03, 0x00, 0x01, 0x00, 0x01]);
        registers[1] = 50;
        exchange(&mut slave, &mut link, &mut registers);
        assert_eq!(link.tx, [with_crc(&[0x09, 0x03, 0x02, 0x00, 50])]);
    }

    #[test]
    fn bound_port_serves_the_exchange() {
        let mut registers = [0u16; 58];
        let mut slave = slave();
        let mut link = ScriptedLink::default();
        link.receive(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);
        {
            let mut port = slave.bind(&mut link);
            port.poll(&mut registers, 0);
            port.poll(&mut registers, 3_000);
        }
        assert_eq!(link.tx.len(), 1);
    }
}
