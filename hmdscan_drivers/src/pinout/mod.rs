use hal::gpio::{Pin, PinMode, Port};

pub mod bus;
pub mod front_panel;
pub mod sensor;

/// Represents the definition of a GPIO pin.
pub struct PinDef {
    /// The port to which the pin belongs (e.g., Port::A, Port::B).
    port: Port,
    /// The pin number within the port.
    pin: u8,
    /// The mode of the pin (e.g., Output, Input, Alternate function).
    mode: PinMode,
}

impl PinDef {
    pub const fn new(port: Port, pin: u8, mode: PinMode) -> PinDef {
        PinDef { port, pin, mode }
    }

    /// Configures the pin and returns the HAL handle.
    pub fn init(&self) -> Pin {
        Pin::new(self.port, self.pin, self.mode)
    }

    /// EXTI line of the pin, equal to its number.
    #[inline(always)]
    pub const fn exti_line(&self) -> u8 {
        self.pin
    }
}
