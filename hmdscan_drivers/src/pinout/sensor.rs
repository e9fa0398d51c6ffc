//! Optical front end and motor pins.
use super::PinDef;
use super::{PinMode, Port};

/// Photodiode amplifier output, ADC2_IN3 (positive input of the differential pair)
pub const PHOTO_P: PinDef = PinDef {
    port: Port::A,
    pin: 6,
    mode: PinMode::Analog,
};

/// Photodiode reference, ADC2_IN4 (negative input of the differential pair)
pub const PHOTO_N: PinDef = PinDef {
    port: Port::A,
    pin: 7,
    mode: PinMode::Analog,
};

/// PGA gain select, binary code bit 0
pub const GAIN_A0: PinDef = PinDef {
    port: Port::B,
    pin: 0,
    mode: PinMode::Output,
};

pub const GAIN_A1: PinDef = PinDef {
    port: Port::B,
    pin: 1,
    mode: PinMode::Output,
};

pub const GAIN_A2: PinDef = PinDef {
    port: Port::B,
    pin: 2,
    mode: PinMode::Output,
};

/// Hall probe pulse, one per mirror facet (EXTI0)
pub const ROTATION_PULSE: PinDef = PinDef {
    port: Port::A,
    pin: 0,
    mode: PinMode::Input,
};

/// Motor speed clock
pub const MOTOR_CLK: PinDef = PinDef {
    port: Port::A,
    pin: 1,
    mode: PinMode::Output,
};

pub const MOTOR_ENABLE: PinDef = PinDef {
    port: Port::A,
    pin: 4,
    mode: PinMode::Output,
};

pub const LASER: PinDef = PinDef {
    port: Port::A,
    pin: 15,
    mode: PinMode::Output,
};

pub const IR_LED: PinDef = PinDef {
    port: Port::B,
    pin: 3,
    mode: PinMode::Output,
};
