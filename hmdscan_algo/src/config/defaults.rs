//! Device identity and factory defaults.

use super::{
    AnalogOutMode, BaudRate, ConfigParameters, FilterWindow, FrameFormat, Gain, PositionMode,
    PositionOffset, SetMode, SlaveId, Threshold, WindowBegin, WindowEnd,
};

pub const MODEL_TYPE: u16 = 50;
pub const SERIAL_NUMBER: u16 = 22001;
pub const FIRMWARE_VERSION: u16 = 404;

/// Factory slave address derived from the serial number.
pub const SLAVE_ID: u16 = SERIAL_NUMBER % 1000 % 247;

/// Tunables written on first boot and restored by a factory reset.
pub const FACTORY: ConfigParameters = ConfigParameters {
    slave_id: SlaveId(SLAVE_ID),
    baud_rate: BaudRate::B19200,
    frame_format: FrameFormat::Serial8N1,
    set_mode: SetMode::Auto,
    gain1: Gain::X16,
    threshold1: Threshold(50),
    gain2: Gain::X32,
    threshold2: Threshold(50),
    window_begin: WindowBegin(20),
    window_end: WindowEnd(80),
    position_mode: PositionMode::RisingEdge,
    analog_out_mode: AnalogOutMode::IntensityPosition,
    position_offset: PositionOffset(250),
    filter_position: FilterWindow(6),
    filter_on: FilterWindow(0),
    filter_off: FilterWindow(0),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_slave_id_is_valid() {
        assert_eq!(SLAVE_ID, 1);
        assert!(SlaveId::from_register(SLAVE_ID).is_some());
    }
}
