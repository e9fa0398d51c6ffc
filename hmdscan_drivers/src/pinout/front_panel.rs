use super::PinDef;
use super::{PinMode, Port};

pub const LED_POWER: PinDef = PinDef {
    port: Port::B,
    pin: 5,
    mode: PinMode::Output,
};

pub const LED_SIGNAL: PinDef = PinDef {
    port: Port::B,
    pin: 6,
    mode: PinMode::Output,
};

pub const LED_ALARM: PinDef = PinDef {
    port: Port::B,
    pin: 7,
    mode: PinMode::Output,
};

/// Signal output, active low
pub const OUT_SIGNAL_NEG: PinDef = PinDef {
    port: Port::B,
    pin: 8,
    mode: PinMode::Output,
};

/// Alarm output, active low: 24 V means OK
pub const OUT_ALARM_NEG: PinDef = PinDef {
    port: Port::B,
    pin: 9,
    mode: PinMode::Output,
};

/// External test input, active low with pull-up
pub const TEST_IN: PinDef = PinDef {
    port: Port::C,
    pin: 14,
    mode: PinMode::Input,
};

/// Threshold set select input, active low with pull-up
pub const SET_IN: PinDef = PinDef {
    port: Port::C,
    pin: 15,
    mode: PinMode::Input,
};

pub const BTN_A: PinDef = PinDef {
    port: Port::B,
    pin: 4,
    mode: PinMode::Input,
};

pub const BTN_B: PinDef = PinDef {
    port: Port::B,
    pin: 10,
    mode: PinMode::Input,
};

pub const BTN_C: PinDef = PinDef {
    port: Port::B,
    pin: 11,
    mode: PinMode::Input,
};

pub const BTN_D: PinDef = PinDef {
    port: Port::C,
    pin: 6,
    mode: PinMode::Input,
};
