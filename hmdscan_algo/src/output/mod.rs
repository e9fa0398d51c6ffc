// Maps filtered features onto display values and 16-bit DAC codes.

use crate::config::{AnalogOutMode, WindowBegin, WindowEnd};
use crate::math_integer::normalization::{constrain, remap};

/// Full scale of the DAC codes.
pub const DAC_FULL_SCALE: i32 = 0xFFFF;
/// Full scale of the position display value.
pub const POSITION_DISPLAY_MAX: i32 = 1000;
/// Full scale of the peak display value, percent.
pub const PEAK_DISPLAY_MAX: i32 = 100;
/// Full scale of a window sample.
pub const PEAK_MAX: i32 = 255;

/// Fixed outputs while test mode is active.
pub const TEST_POSITION_CODE: u16 = 0x7FFF;
pub const TEST_INTENSITY_CODE: u16 = 0xBFFF;
pub const TEST_POSITION_DISPLAY: u16 = 500;
pub const TEST_PEAK_DISPLAY: u16 = 75;

/// Dual-channel analog output; both words are committed in one transfer.
pub trait AnalogOutput {
    type Error;

    fn write_pair(&mut self, channel1: u16, channel2: u16) -> Result<(), Self::Error>;
}

/// DAC codes before channel routing.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AnalogCodes {
    pub intensity: u16,
    pub position: u16,
}

impl AnalogCodes {
    pub const TEST: AnalogCodes = AnalogCodes {
        intensity: TEST_INTENSITY_CODE,
        position: TEST_POSITION_CODE,
    };

    /// Channel words for the configured routing.
    pub fn route(self, mode: AnalogOutMode) -> (u16, u16) {
        mode.route(self.intensity, self.position)
    }
}

/// Values published in the register file.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DisplayValues {
    /// Peak intensity, 0..100.
    pub peak_percent: u16,
    /// Raw position timestamp of the last scan (0 when absent).
    pub position: u16,
    /// Averaged position, 0..1000 across the window.
    pub position_avg: u16,
}

impl DisplayValues {
    pub const TEST: DisplayValues = DisplayValues {
        peak_percent: TEST_PEAK_DISPLAY,
        position: TEST_POSITION_DISPLAY,
        position_avg: TEST_POSITION_DISPLAY,
    };
}

/// Position clamped to the window and scaled: `(display 0..1000, DAC code)`.
pub fn map_position(position: u16, begin: WindowBegin, end: WindowEnd) -> (u16, u16) {
    let floor = begin.position_floor();
    let ceiling = end.position_ceiling();
    let clamped = constrain(position as i32, floor, ceiling);
    (
        remap(clamped, floor, ceiling, 0, POSITION_DISPLAY_MAX) as u16,
        remap(clamped, floor, ceiling, 0, DAC_FULL_SCALE) as u16,
    )
}

/// Peak scaled: `(percent 0..100, DAC code)`.
pub fn map_intensity(peak: u16) -> (u16, u16) {
    let peak = constrain(peak as i32, 0, PEAK_MAX);
    (
        remap(peak, 0, PEAK_MAX, 0, PEAK_DISPLAY_MAX) as u16,
        remap(peak, 0, PEAK_MAX, 0, DAC_FULL_SCALE) as u16,
    )
}
