// Paced differential capture of one scan window.

// Detailed Operation:
// ADC2 converts the photodiode pair PA6/PA7 in differential mode. Every TIM6
// update raises TRGO, which starts exactly one conversion; DMA1 channel 1 moves
// the results into `CAPTURE_BUF`. After `WINDOW_LEN` transfers the DMA raises
// transfer complete and the interrupt calls `finish`, which stops the pacer and
// converts the 12-bit differential codes (2048 = 0 V) into signed 8-bit-scale
// readings. The three gain select lines are set before the pacer starts.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

use core::ptr::addr_of_mut;

use hal::{
    adc::{Adc, AdcDevice, Align, InputType, SampleTime, Trigger, TriggerEdge},
    clocks::Clocks,
    dma::{self, ChannelCfg, Dma, DmaChannel, DmaInput, DmaPeriph},
    gpio::Pin,
    pac::{ADC2, DMA1, TIM6},
    timer::{MasterModeSelection, Timer},
};

use hmdscan_algo::acquisition::{SampleCapture, SAMPLE_RATE_HZ, WINDOW_LEN};
use hmdscan_algo::config::Gain;

use crate::pinout;

/// ADC2_IN3, paired with IN4 as negative input.
const PHOTO_CHANNEL: u8 = 3;
const SEQUENCE: [u8; 1] = [PHOTO_CHANNEL];
/// Differential code of a 0 V input.
const DIFF_ZERO: i16 = 2048;
/// 12-bit differential codes down to the 8-bit magnitude scale.
const DIFF_SHIFT: u32 = 3;

/// DMA target, owned by `AdcCapture`.
static mut CAPTURE_BUF: [u16; WINDOW_LEN] = [0; WINDOW_LEN];

pub struct AdcCapture {
    adc: Adc<ADC2>,
    dma: Dma<DMA1>,
    pacer: Timer<TIM6>,
    gain_pins: [Pin; 3],
    reading: [i16; WINDOW_LEN],
}

impl AdcCapture {
    pub fn new(adc2: ADC2, dma1: DMA1, tim6: TIM6, clock_cfg: &Clocks) -> Self {
        pinout::sensor::PHOTO_P.init();
        pinout::sensor::PHOTO_N.init();
        let gain_pins = [
            pinout::sensor::GAIN_A0.init(),
            pinout::sensor::GAIN_A1.init(),
            pinout::sensor::GAIN_A2.init(),
        ];

        let mut adc = Adc::new_adc2(adc2, AdcDevice::Two, Default::default(), clock_cfg.systick());
        adc.calibrate(InputType::Differential, clock_cfg.systick());
        adc.set_input_type(PHOTO_CHANNEL, InputType::Differential);
        adc.set_sample_time(PHOTO_CHANNEL, SampleTime::T2);
        adc.set_sequence(PHOTO_CHANNEL, 1);
        adc.set_sequence_len(1);
        adc.set_align(Align::Right);
        adc.set_trigger(Trigger::Tim6Trgo, TriggerEdge::HardwareRising);

        let dma = Dma::new(dma1);
        dma::enable_mux1();
        dma::mux(DmaPeriph::Dma1, DmaChannel::C1, DmaInput::Adc2);

        let mut pacer = Timer::new_tim6(tim6, SAMPLE_RATE_HZ as f32, Default::default(), clock_cfg);
        pacer.set_mastermode(MasterModeSelection::Update);

        AdcCapture {
            adc,
            dma,
            pacer,
            gain_pins,
            reading: [0; WINDOW_LEN],
        }
    }

    fn select_gain(&mut self, gain: Gain) {
        let code = gain.select_code();
        for (bit, pin) in self.gain_pins.iter_mut().enumerate() {
            if code & (1 << bit) != 0 {
                pin.set_high();
            } else {
                pin.set_low();
            }
        }
    }
}

impl SampleCapture for AdcCapture {
    fn begin(&mut self, gain: Gain) {
        self.select_gain(gain);

        // Stale words must not survive a short capture
        let buf = unsafe { &mut *addr_of_mut!(CAPTURE_BUF) };
        buf.fill(DIFF_ZERO as u16);

        self.pacer.disable();
        self.pacer.reset_count();
        unsafe {
            self.adc.read_dma(
                buf,
                &SEQUENCE,
                DmaChannel::C1,
                ChannelCfg::default(),
                DmaPeriph::Dma1,
            );
        }
        self.pacer.enable();
    }

    fn finish(&mut self) -> &[i16; WINDOW_LEN] {
        self.pacer.disable();
        self.dma.stop(DmaChannel::C1);

        let buf = unsafe { &*addr_of_mut!(CAPTURE_BUF) };
        for (dst, &raw) in self.reading.iter_mut().zip(buf.iter()) {
            *dst = (raw as i16 - DIFF_ZERO) >> DIFF_SHIFT;
        }
        &self.reading
    }
}
