use super::PinDef;
use super::{PinMode, Port};

// SPI2 towards the two daisy-chained AD420 current-loop DACs

pub const SPI2_SCK: PinDef = PinDef {
    port: Port::B,
    pin: 13,
    mode: PinMode::Alt(5),
};

pub const SPI2_MISO: PinDef = PinDef {
    port: Port::B,
    pin: 14,
    mode: PinMode::Alt(5),
};

pub const SPI2_MOSI: PinDef = PinDef {
    port: Port::B,
    pin: 15,
    mode: PinMode::Alt(5),
};

/// DAC latch, rising edge loads both DACs
pub const DAC_LATCH: PinDef = PinDef {
    port: Port::B,
    pin: 12,
    mode: PinMode::Output,
};

// USART1 on the RS-485 transceiver

pub const USART1_TX: PinDef = PinDef {
    port: Port::A,
    pin: 9,
    mode: PinMode::Alt(7),
};

pub const USART1_RX: PinDef = PinDef {
    port: Port::A,
    pin: 10,
    mode: PinMode::Alt(7),
};

/// Transceiver driver enable, high while transmitting
pub const RS485_DE: PinDef = PinDef {
    port: Port::A,
    pin: 12,
    mode: PinMode::Output,
};
