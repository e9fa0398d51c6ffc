// Device health: temperature supervision, operating hours, alarm aggregation and
// the digital I/O state word published to the register file.

pub mod snapshot;

/// Temperature above which the thermal alarm trips, °C.
pub const TRIP_CELSIUS: i16 = 55;
/// Temperature at or below which a tripped thermal alarm clears, °C.
pub const CLEAR_CELSIUS: i16 = 50;

/// Runtime is persisted on hours where `hours % 4 == 1`.
const RUNTIME_PERSIST_PERIOD: u16 = 4;

/// Bitmask of the digital inputs and outputs.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IoState(u16);

impl IoState {
    pub const LASER: u16 = 1 << 0;
    pub const IR_LED: u16 = 1 << 1;
    pub const TEST_INPUT: u16 = 1 << 2;
    pub const SET_INPUT: u16 = 1 << 3;
    pub const ALARM_OUTPUT: u16 = 1 << 4;
    pub const SIGNAL_OUTPUT: u16 = 1 << 5;
    pub const LED_ALARM: u16 = 1 << 6;
    pub const LED_SIGNAL: u16 = 1 << 7;
    pub const LED_POWER: u16 = 1 << 8;
    pub const BUTTON_A: u16 = 1 << 9;
    pub const BUTTON_B: u16 = 1 << 10;
    pub const BUTTON_C: u16 = 1 << 11;
    pub const BUTTON_D: u16 = 1 << 12;

    const MASK: u16 = (1 << 13) - 1;

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits & Self::MASK)
    }

    #[inline(always)]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[inline(always)]
    pub const fn contains(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    /// Returns a copy with `flag` set or cleared.
    pub const fn with(self, flag: u16, on: bool) -> Self {
        if on {
            Self::from_bits(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }
}

/// Tracks the die temperature, its persisted maximum and the thermal alarm.
pub struct ThermalMonitor {
    temperature: i16,
    max_temperature: i16,
    fault: bool,
}

impl ThermalMonitor {
    pub fn new(max_temperature: i16) -> Self {
        Self {
            temperature: 0,
            max_temperature,
            fault: false,
        }
    }

    /// Feeds a new reading.
    ///
    /// Returns the new maximum when it rose and has to be persisted.
    pub fn update(&mut self, celsius: i16) -> Option<i16> {
        self.temperature = celsius;

        if !self.fault && celsius > TRIP_CELSIUS {
            warn!("ALARM: over-temperature {}C", celsius);
            self.fault = true;
        } else if self.fault && celsius <= CLEAR_CELSIUS {
            info!("ALARM: temperature back to {}C", celsius);
            self.fault = false;
        }

        if celsius > self.max_temperature {
            self.max_temperature = celsius;
            Some(celsius)
        } else {
            None
        }
    }

    #[inline(always)]
    pub fn temperature(&self) -> i16 {
        self.temperature
    }

    #[inline(always)]
    pub fn max_temperature(&self) -> i16 {
        self.max_temperature
    }

    #[inline(always)]
    pub fn fault(&self) -> bool {
        self.fault
    }
}

/// Operating hours counter.
pub struct RuntimeCounter {
    hours: u16,
}

impl RuntimeCounter {
    pub fn new(hours: u16) -> Self {
        Self { hours }
    }

    /// Counts one elapsed hour; true when the new total has to be persisted.
    pub fn on_hour(&mut self) -> bool {
        self.hours = self.hours.wrapping_add(1);
        self.hours % RUNTIME_PERSIST_PERIOD == 1
    }

    #[inline(always)]
    pub fn hours(&self) -> u16 {
        self.hours
    }
}

/// Highest-priority active alarm cause.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Alarm {
    None,
    MotorFault,
    OverTemperature,
    ExternalTest,
    InternalTest,
}

impl Alarm {
    /// Picks the cause by priority: motor, thermal, external test, internal test.
    pub const fn evaluate(
        motor_fault: bool,
        over_temperature: bool,
        external_test: bool,
        internal_test: bool,
    ) -> Self {
        if motor_fault {
            Alarm::MotorFault
        } else if over_temperature {
            Alarm::OverTemperature
        } else if external_test {
            Alarm::ExternalTest
        } else if internal_test {
            Alarm::InternalTest
        } else {
            Alarm::None
        }
    }

    /// Faults drive the alarm output; test modes only light the LED.
    pub const fn drives_output(self) -> bool {
        matches!(self, Alarm::MotorFault | Alarm::OverTemperature)
    }

    pub const fn lights_led(self) -> bool {
        !matches!(self, Alarm::None)
    }
}

/// Keeps the current alarm and reports changes.
pub struct AlarmMonitor {
    current: Alarm,
}

impl AlarmMonitor {
    pub fn new() -> Self {
        Self {
            current: Alarm::None,
        }
    }

    pub fn update(
        &mut self,
        motor_fault: bool,
        over_temperature: bool,
        external_test: bool,
        internal_test: bool,
    ) -> Alarm {
        let alarm = Alarm::evaluate(motor_fault, over_temperature, external_test, internal_test);
        if alarm != self.current {
            info!("ALARM: {} -> {}", self.current, alarm);
            self.current = alarm;
        }
        alarm
    }

    #[inline(always)]
    pub fn current(&self) -> Alarm {
        self.current
    }
}

impl Default for AlarmMonitor {
    fn default() -> Self {
        Self::new()
    }
}
