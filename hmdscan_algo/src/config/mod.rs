// Runtime configuration of the sensor: strongly typed tunables with their
// register validators, factory defaults and the gain/threshold set selection.

// Key Features:
// - One domain type per tunable, each with `from_register` (validate) and `to_register`
// - `ConfigParameters` aggregates the tunables and maps them onto holding registers
// - Set selection (`active_set`) picks gain/threshold pair 1 or 2

// Detailed Operation:
// Every value that arrives from the register file or the nonvolatile store goes
// through `from_register`, which returns `None` for out-of-range words. Rejected
// words never reach `ConfigParameters`, so the struct only ever holds valid values.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

pub mod defaults;
pub mod store;

use crate::registers::Register;

/// Declares a `u16`-backed tunable accepting an inclusive range of register words.
macro_rules! ranged_word {
    ($(#[$meta:meta])* $name:ident, $min:expr, $max:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Debug)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        pub struct $name(u16);

        impl $name {
            pub const MIN: u16 = $min;
            pub const MAX: u16 = $max;

            /// Validates a register word.
            #[allow(unused_comparisons)]
            pub const fn from_register(value: u16) -> Option<Self> {
                if value >= Self::MIN && value <= Self::MAX {
                    Some(Self(value))
                } else {
                    None
                }
            }

            #[inline(always)]
            pub const fn to_register(self) -> u16 {
                self.0
            }
        }
    };
}

ranged_word!(
    /// Modbus slave address.
    SlaveId, 1, 247
);
ranged_word!(
    /// Detection threshold in percent of full scale.
    Threshold, 20, 80
);
ranged_word!(
    /// Start of the evaluation window in percent of the scan.
    WindowBegin, 5, 45
);
ranged_word!(
    /// End of the evaluation window in percent of the scan.
    WindowEnd, 55, 95
);
ranged_word!(
    /// Phase offset of the acquisition trigger in µs. Values of 1000 and above select the rising pulse edge.
    PositionOffset, 0, 2000
);
ranged_word!(
    /// Filter length or debounce interval (cycles or ms).
    FilterWindow, 0, 9999
);

impl Threshold {
    /// Base detection level on the 0..255 sample scale: round(thre * 256 / 100) - 1.
    pub const fn base_level(self) -> i32 {
        (self.0 as i32 * 256 + 50) / 100 - 1
    }
}

impl WindowBegin {
    /// First sample index of the evaluation window.
    pub const fn first_sample(self) -> usize {
        self.0 as usize * 2
    }

    /// Lower clamp of the position timestamp (sample index * 5).
    pub const fn position_floor(self) -> i32 {
        self.0 as i32 * 10
    }
}

impl WindowEnd {
    /// Last sample index (exclusive) of the evaluation window.
    pub const fn last_sample(self) -> usize {
        self.0 as usize * 2
    }

    /// Upper clamp of the position timestamp.
    pub const fn position_ceiling(self) -> i32 {
        self.0 as i32 * 10
    }
}

impl PositionOffset {
    /// Phase delay inside one sub-pulse period.
    pub const fn phase_us(self) -> u16 {
        self.0 % 1000
    }
}

impl FilterWindow {
    #[inline(always)]
    pub const fn get(self) -> u16 {
        self.0
    }
}

/// Programmable gain of the input amplifier.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum Gain {
    X1 = 1,
    X2 = 2,
    X4 = 4,
    X8 = 8,
    X16 = 16,
    X32 = 32,
    X64 = 64,
}

impl Gain {
    pub const fn from_register(value: u16) -> Option<Self> {
        match value {
            1 => Some(Gain::X1),
            2 => Some(Gain::X2),
            4 => Some(Gain::X4),
            8 => Some(Gain::X8),
            16 => Some(Gain::X16),
            32 => Some(Gain::X32),
            64 => Some(Gain::X64),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn to_register(self) -> u16 {
        self as u16
    }

    /// Binary code of the gain-select lines (log2 of the gain).
    pub const fn select_code(self) -> u8 {
        (self as u16).trailing_zeros() as u8
    }
}

/// Which feature of the scan is reported as position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PositionMode {
    /// Running peak first exceeds the threshold.
    Hmd = 0,
    RisingEdge = 1,
    FallingEdge = 2,
    /// Running peak jumps by more than the peak step.
    Peak = 3,
}

impl PositionMode {
    pub const fn from_register(value: u16) -> Option<Self> {
        match value {
            0 => Some(PositionMode::Hmd),
            1 => Some(PositionMode::RisingEdge),
            2 => Some(PositionMode::FallingEdge),
            3 => Some(PositionMode::Peak),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn to_register(self) -> u16 {
        self as u16
    }
}

/// Routing of the intensity and position codes onto the two analog channels.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AnalogOutMode {
    /// Intensity on channel 1, position on channel 2.
    IntensityPosition = 0,
    /// Position on channel 1, intensity on channel 2.
    PositionIntensity = 1,
    IntensityBoth = 2,
    PositionBoth = 3,
}

impl AnalogOutMode {
    pub const fn from_register(value: u16) -> Option<Self> {
        match value {
            0 => Some(AnalogOutMode::IntensityPosition),
            1 => Some(AnalogOutMode::PositionIntensity),
            2 => Some(AnalogOutMode::IntensityBoth),
            3 => Some(AnalogOutMode::PositionBoth),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn to_register(self) -> u16 {
        self as u16
    }

    /// Returns `(channel1, channel2)` for the given intensity and position codes.
    pub const fn route(self, intensity: u16, position: u16) -> (u16, u16) {
        match self {
            AnalogOutMode::IntensityPosition => (intensity, position),
            AnalogOutMode::PositionIntensity => (position, intensity),
            AnalogOutMode::IntensityBoth => (intensity, intensity),
            AnalogOutMode::PositionBoth => (position, position),
        }
    }
}

/// Serial line speed; the register holds baud / 100.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BaudRate {
    B300 = 3,
    B600 = 6,
    B1200 = 12,
    B2400 = 24,
    B4800 = 48,
    B9600 = 96,
    B14400 = 144,
    B19200 = 192,
    B28800 = 288,
    B38400 = 384,
    B57600 = 576,
    B115200 = 1152,
}

impl BaudRate {
    pub const fn from_register(value: u16) -> Option<Self> {
        match value {
            3 => Some(BaudRate::B300),
            6 => Some(BaudRate::B600),
            12 => Some(BaudRate::B1200),
            24 => Some(BaudRate::B2400),
            48 => Some(BaudRate::B4800),
            96 => Some(BaudRate::B9600),
            144 => Some(BaudRate::B14400),
            192 => Some(BaudRate::B19200),
            288 => Some(BaudRate::B28800),
            384 => Some(BaudRate::B38400),
            576 => Some(BaudRate::B57600),
            1152 => Some(BaudRate::B115200),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn to_register(self) -> u16 {
        self as u16
    }

    #[inline(always)]
    pub const fn bits_per_second(self) -> u32 {
        self as u32 * 100
    }
}

/// Character framing of the serial line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameFormat {
    Serial8N1 = 0,
    Serial8N2 = 4,
    Serial8E1 = 6,
    Serial8O1 = 7,
}

impl FrameFormat {
    pub const fn from_register(value: u16) -> Option<Self> {
        match value {
            0 => Some(FrameFormat::Serial8N1),
            4 => Some(FrameFormat::Serial8N2),
            6 => Some(FrameFormat::Serial8E1),
            7 => Some(FrameFormat::Serial8O1),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn to_register(self) -> u16 {
        self as u16
    }
}

/// Selection of the gain/threshold pair.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetMode {
    /// Follow the set input: high selects pair 1, low pair 2.
    Auto = 0,
    Set1 = 1,
    Set2 = 2,
}

impl SetMode {
    pub const fn from_register(value: u16) -> Option<Self> {
        match value {
            0 => Some(SetMode::Auto),
            1 => Some(SetMode::Set1),
            2 => Some(SetMode::Set2),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn to_register(self) -> u16 {
        self as u16
    }
}

/// Serial link parameters, restarted together whenever one of them changes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkSettings {
    pub slave_id: SlaveId,
    pub baud_rate: BaudRate,
    pub frame_format: FrameFormat,
}

/// Gain and threshold currently applied to acquisition and detection.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActiveSet {
    pub gain: Gain,
    pub threshold: Threshold,
}

/// Every persisted tunable of the sensor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigParameters {
    pub slave_id: SlaveId,
    pub baud_rate: BaudRate,
    pub frame_format: FrameFormat,
    pub set_mode: SetMode,
    pub gain1: Gain,
    pub threshold1: Threshold,
    pub gain2: Gain,
    pub threshold2: Threshold,
    pub window_begin: WindowBegin,
    pub window_end: WindowEnd,
    pub position_mode: PositionMode,
    pub analog_out_mode: AnalogOutMode,
    pub position_offset: PositionOffset,
    pub filter_position: FilterWindow,
    pub filter_on: FilterWindow,
    pub filter_off: FilterWindow,
}

impl Default for ConfigParameters {
    fn default() -> Self {
        defaults::FACTORY
    }
}

impl ConfigParameters {
    /// Picks the gain/threshold pair from the set mode and, in automatic mode, the set input.
    pub fn active_set(&self, set_input_high: bool) -> ActiveSet {
        let first = match self.set_mode {
            SetMode::Auto => set_input_high,
            SetMode::Set1 => true,
            SetMode::Set2 => false,
        };
        if first {
            ActiveSet {
                gain: self.gain1,
                threshold: self.threshold1,
            }
        } else {
            ActiveSet {
                gain: self.gain2,
                threshold: self.threshold2,
            }
        }
    }

    pub fn link(&self) -> LinkSettings {
        LinkSettings {
            slave_id: self.slave_id,
            baud_rate: self.baud_rate,
            frame_format: self.frame_format,
        }
    }

    /// Current word of a writable configuration register, `None` for any other register.
    pub fn register_value(&self, register: Register) -> Option<u16> {
        let value = match register {
            Register::SlaveId => self.slave_id.to_register(),
            Register::BaudRate => self.baud_rate.to_register(),
            Register::FrameFormat => self.frame_format.to_register(),
            Register::SetMode => self.set_mode.to_register(),
            Register::GainSet1 => self.gain1.to_register(),
            Register::ThresholdSet1 => self.threshold1.to_register(),
            Register::GainSet2 => self.gain2.to_register(),
            Register::ThresholdSet2 => self.threshold2.to_register(),
            Register::WindowBegin => self.window_begin.to_register(),
            Register::WindowEnd => self.window_end.to_register(),
            Register::PositionMode => self.position_mode.to_register(),
            Register::AnalogOutMode => self.analog_out_mode.to_register(),
            Register::PositionOffset => self.position_offset.to_register(),
            Register::FilterPosition => self.filter_position.to_register(),
            Register::FilterOn => self.filter_on.to_register(),
            Register::FilterOff => self.filter_off.to_register(),
            _ => return None,
        };
        Some(value)
    }

    /// Validates `value` and adopts it into the field behind `register`.
    ///
    /// Returns `false` when the register is not a configuration register or the
    /// word is out of range; the parameters are left untouched in that case.
    pub fn apply_register(&mut self, register: Register, value: u16) -> bool {
        fn adopt<T>(field: &mut T, value: Option<T>) -> bool {
            match value {
                Some(v) => {
                    *field = v;
                    true
                }
                None => false,
            }
        }

        match register {
            Register::SlaveId => adopt(&mut self.slave_id, SlaveId::from_register(value)),
            Register::BaudRate => adopt(&mut self.baud_rate, BaudRate::from_register(value)),
            Register::FrameFormat => {
                adopt(&mut self.frame_format, FrameFormat::from_register(value))
            }
            Register::SetMode => adopt(&mut self.set_mode, SetMode::from_register(value)),
            Register::GainSet1 => adopt(&mut self.gain1, Gain::from_register(value)),
            Register::ThresholdSet1 => adopt(&mut self.threshold1, Threshold::from_register(value)),
            Register::GainSet2 => adopt(&mut self.gain2, Gain::from_register(value)),
            Register::ThresholdSet2 => adopt(&mut self.threshold2, Threshold::from_register(value)),
            Register::WindowBegin => {
                adopt(&mut self.window_begin, WindowBegin::from_register(value))
            }
            Register::WindowEnd => adopt(&mut self.window_end, WindowEnd::from_register(value)),
            Register::PositionMode => {
                adopt(&mut self.position_mode, PositionMode::from_register(value))
            }
            Register::AnalogOutMode => {
                adopt(&mut self.analog_out_mode, AnalogOutMode::from_register(value))
            }
            Register::PositionOffset => {
                adopt(&mut self.position_offset, PositionOffset::from_register(value))
            }
            Register::FilterPosition => {
                adopt(&mut self.filter_position, FilterWindow::from_register(value))
            }
            Register::FilterOn => adopt(&mut self.filter_on, FilterWindow::from_register(value)),
            Register::FilterOff => adopt(&mut self.filter_off, FilterWindow::from_register(value)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_base_level_rounds() {
        assert_eq!(Threshold::from_register(50).unwrap().base_level(), 127);
        assert_eq!(Threshold::from_register(20).unwrap().base_level(), 50);
        assert_eq!(Threshold::from_register(80).unwrap().base_level(), 204);
    }

    #[test]
    fn ranged_words_reject_out_of_range() {
        assert!(Threshold::from_register(19).is_none());
        assert!(Threshold::from_register(81).is_none());
        assert!(WindowBegin::from_register(4).is_none());
        assert!(WindowEnd::from_register(96).is_none());
        assert!(PositionOffset::from_register(2001).is_none());
        assert!(FilterWindow::from_register(10000).is_none());
        assert!(SlaveId::from_register(0).is_none());
        assert!(SlaveId::from_register(248).is_none());
        assert_eq!(FilterWindow::from_register(9999).map(|f| f.get()), Some(9999));
    }

    #[test]
    fn gain_accepts_powers_of_two_only() {
        assert_eq!(Gain::from_register(16), Some(Gain::X16));
        assert!(Gain::from_register(3).is_none());
        assert!(Gain::from_register(128).is_none());
        assert_eq!(Gain::X1.select_code(), 0);
        assert_eq!(Gain::X64.select_code(), 6);
    }

    #[test]
    fn set_selection_follows_mode_and_input() {
        let mut config = ConfigParameters::default();
        config.set_mode = SetMode::Auto;
        assert_eq!(config.active_set(true).gain, config.gain1);
        assert_eq!(config.active_set(false).gain, config.gain2);

        config.set_mode = SetMode::Set1;
        assert_eq!(config.active_set(false).gain, config.gain1);

        config.set_mode = SetMode::Set2;
        assert_eq!(config.active_set(true).gain, config.gain2);
    }

    #[test]
    fn apply_register_ignores_invalid_words() {
        let mut config = ConfigParameters::default();
        assert!(!config.apply_register(Register::GainSet1, 3));
        assert_eq!(config.gain1, Gain::X16);

        assert!(config.apply_register(Register::GainSet1, 8));
        assert_eq!(config.register_value(Register::GainSet1), Some(8));

        assert!(!config.apply_register(Register::PeakValue, 1));
        assert_eq!(config.register_value(Register::PeakValue), None);
    }

    #[test]
    fn analog_routing() {
        assert_eq!(AnalogOutMode::IntensityPosition.route(1, 2), (1, 2));
        assert_eq!(AnalogOutMode::PositionIntensity.route(1, 2), (2, 1));
        assert_eq!(AnalogOutMode::IntensityBoth.route(1, 2), (1, 1));
        assert_eq!(AnalogOutMode::PositionBoth.route(1, 2), (2, 2));
    }
}
