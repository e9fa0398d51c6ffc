// Rotation trigger scheduler: turns mirror facet pulses into phase-locked
// acquisition triggers and supervises the rotation period.

// Key Features:
// - Counts facet pulses, every `PULSES_PER_ROTATION`-th closes one rotation
// - Measures the rotation period and raises / clears the motor fault
// - Arms the one-shot trigger with a delay compensating the pulse latency

// Detailed Operation:
// The motor is driven by a 1 kHz clock whose rising edges are the sub-pulse
// instants. A facet pulse arrives some µs after the last sub-pulse; that latency
// is subtracted from the configured phase (`positionOffset mod 1000`) and the
// result, wrapped into [0, 1000), is the one-shot delay. Every facet is armed
// while the last measured rotation is inside tolerance, so each of the six mirror
// faces produces one acquisition. Runs in interrupt context and never blocks.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

use crate::config::PositionOffset;

pub const PULSES_PER_ROTATION: u8 = 6;
/// Nominal time of one mechanical rotation, µs.
pub const NOMINAL_ROTATION_US: u32 = 6000;
/// Allowed deviation from the nominal rotation time (exclusive), µs.
pub const ROTATION_TOLERANCE_US: u32 = 50;
/// Period of the motor drive clock, µs.
pub const SUB_PULSE_PERIOD_US: u32 = 1000;

/// One-shot timer that starts an acquisition after a delay.
pub trait TriggerSource {
    fn arm(&mut self, delay_us: u16);
}

/// Edge of the facet pulse that marks a facet.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PulseEdge {
    Falling,
    Rising,
}

impl PulseEdge {
    /// Offsets below 1000 µs use the falling edge, the upper half the rising edge.
    pub const fn from_offset(offset: PositionOffset) -> Self {
        if offset.to_register() < 1000 {
            PulseEdge::Falling
        } else {
            PulseEdge::Rising
        }
    }
}

/// True when a rotation time is inside the tolerance band.
pub const fn within_tolerance(rotation_us: u32) -> bool {
    rotation_us.abs_diff(NOMINAL_ROTATION_US) < ROTATION_TOLERANCE_US
}

/// Delay from now to the configured phase of the current sub-pulse period.
pub const fn trigger_delay(offset: PositionOffset, since_sub_pulse_us: u32) -> u16 {
    let phase = offset.phase_us() as i64;
    (phase - since_sub_pulse_us as i64).rem_euclid(SUB_PULSE_PERIOD_US as i64) as u16
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PulseOutcome {
    Armed { delay_us: u16 },
    /// Motor fault active, no acquisition for this facet.
    Suppressed,
}

pub struct RotationScheduler {
    offset: PositionOffset,
    pulse_index: u8,
    last_rotation_us: Option<u32>,
    rotation_us: u32,
    latency_us: u32,
    delay_us: u16,
    fault: bool,
}

impl RotationScheduler {
    /// Starts in motor fault until the first in-tolerance rotation is measured.
    pub fn new(offset: PositionOffset) -> Self {
        Self {
            offset,
            pulse_index: 0,
            last_rotation_us: None,
            rotation_us: 0,
            latency_us: 0,
            delay_us: 0,
            fault: true,
        }
    }

    pub fn set_offset(&mut self, offset: PositionOffset) {
        self.offset = offset;
    }

    /// Handles one facet pulse.
    ///
    /// # Arguments
    /// * `trigger` - One-shot armed on success
    /// * `now_us` - Free-running µs clock at the pulse
    /// * `last_sub_pulse_us` - Clock value of the last motor clock rising edge
    pub fn on_pulse<T: TriggerSource>(
        &mut self,
        trigger: &mut T,
        now_us: u32,
        last_sub_pulse_us: u32,
    ) -> PulseOutcome {
        self.pulse_index += 1;
        if self.pulse_index >= PULSES_PER_ROTATION {
            self.pulse_index = 0;
            self.complete_rotation(now_us);
        }

        if self.fault {
            return PulseOutcome::Suppressed;
        }

        self.latency_us = now_us.wrapping_sub(last_sub_pulse_us);
        self.delay_us = trigger_delay(self.offset, self.latency_us);
        trigger.arm(self.delay_us);
        PulseOutcome::Armed {
            delay_us: self.delay_us,
        }
    }

    fn complete_rotation(&mut self, now_us: u32) {
        if let Some(last) = self.last_rotation_us {
            self.rotation_us = now_us.wrapping_sub(last);
        }
        self.last_rotation_us = Some(now_us);

        let fault = !within_tolerance(self.rotation_us);
        if fault != self.fault {
            if fault {
                warn!("TRIGGER: motor fault, rotation {}us", self.rotation_us);
            } else {
                info!("TRIGGER: rotation locked at {}us", self.rotation_us);
            }
            self.fault = fault;
        }
    }

    /// Facet index 0..5 inside the current rotation.
    #[inline(always)]
    pub fn pulse_index(&self) -> u8 {
        self.pulse_index
    }

    /// Last measured rotation time, µs.
    #[inline(always)]
    pub fn rotation_us(&self) -> u32 {
        self.rotation_us
    }

    /// Time between the last sub-pulse and the last armed facet pulse, µs.
    #[inline(always)]
    pub fn latency_us(&self) -> u32 {
        self.latency_us
    }

    #[inline(always)]
    pub fn delay_us(&self) -> u16 {
        self.delay_us
    }

    #[inline(always)]
    pub fn motor_fault(&self) -> bool {
        self.fault
    }
}
