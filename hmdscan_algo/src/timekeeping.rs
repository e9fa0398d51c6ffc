// Bookkeeping of the 500 µs tick: motor drive clock, millisecond and hour
// counters, laser and internal test timeouts. Also the motor soft-start ramp.

/// Tick period at full motor speed, µs.
pub const TICK_US: u32 = 500;
/// Laser timeout: 10 min of ticks.
pub const LASER_TIMEOUT_TICKS: u32 = 1_200_000;
/// Internal test timeout: 5 min of ticks.
pub const TEST_TIMEOUT_TICKS: u32 = 600_000;
pub const MS_PER_HOUR: u32 = 3_600_000;

/// What happened during one tick.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickEvents {
    /// New level of the motor drive clock.
    pub motor_clock: bool,
    pub laser_expired: bool,
    pub test_expired: bool,
    pub hour_elapsed: bool,
}

pub struct Ticker {
    motor_clock: bool,
    millis: u32,
    hour_countdown: u32,
    hours_pending: u16,
    laser_ticks: u32,
    test_ticks: u32,
    last_sub_pulse_us: u32,
}

/// Decrements a running timeout, true on the tick it reaches zero.
fn countdown(ticks: &mut u32) -> bool {
    if *ticks == 0 {
        return false;
    }
    *ticks -= 1;
    *ticks == 0
}

impl Ticker {
    pub const fn new() -> Self {
        Self {
            motor_clock: false,
            millis: 0,
            hour_countdown: MS_PER_HOUR,
            hours_pending: 0,
            laser_ticks: 0,
            test_ticks: 0,
            last_sub_pulse_us: 0,
        }
    }

    /// Advances by one tick taken at `now_us`.
    pub fn tick(&mut self, now_us: u32) -> TickEvents {
        self.motor_clock = !self.motor_clock;
        let mut events = TickEvents {
            motor_clock: self.motor_clock,
            laser_expired: countdown(&mut self.laser_ticks),
            test_expired: countdown(&mut self.test_ticks),
            hour_elapsed: false,
        };

        // Rising clock edge: one sub-pulse, one millisecond
        if self.motor_clock {
            self.last_sub_pulse_us = now_us;
            self.millis = self.millis.wrapping_add(1);
            self.hour_countdown -= 1;
            if self.hour_countdown == 0 {
                self.hour_countdown = MS_PER_HOUR;
                self.hours_pending = self.hours_pending.saturating_add(1);
                events.hour_elapsed = true;
            }
        }
        events
    }

    pub fn arm_laser(&mut self) {
        self.laser_ticks = LASER_TIMEOUT_TICKS;
    }

    pub fn cancel_laser(&mut self) {
        self.laser_ticks = 0;
    }

    #[inline(always)]
    pub fn laser_active(&self) -> bool {
        self.laser_ticks > 0
    }

    pub fn arm_internal_test(&mut self) {
        self.test_ticks = TEST_TIMEOUT_TICKS;
    }

    pub fn cancel_internal_test(&mut self) {
        self.test_ticks = 0;
    }

    #[inline(always)]
    pub fn internal_test_active(&self) -> bool {
        self.test_ticks > 0
    }

    /// Hours elapsed since the last call.
    pub fn take_hours(&mut self) -> u16 {
        core::mem::take(&mut self.hours_pending)
    }

    /// Millisecond clock (wrapping).
    #[inline(always)]
    pub fn millis(&self) -> u32 {
        self.millis
    }

    /// µs clock value of the last motor clock rising edge.
    #[inline(always)]
    pub fn last_sub_pulse_us(&self) -> u32 {
        self.last_sub_pulse_us
    }

    #[inline(always)]
    pub fn motor_clock(&self) -> bool {
        self.motor_clock
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

/// Motor speed ramp after power-up, percent.
pub const RAMP_START_PERCENT: u8 = 20;
pub const RAMP_END_PERCENT: u8 = 100;
/// Time between two ramp steps, ms.
pub const RAMP_STEP_MS: u32 = 100;

/// Soft start: yields the tick period for each speed step from 20 % to 100 %.
pub struct MotorRamp {
    speed: u8,
}

impl MotorRamp {
    pub const fn new() -> Self {
        Self {
            speed: RAMP_START_PERCENT,
        }
    }

    /// Tick period at `speed` percent, µs.
    pub const fn period_us(speed: u8) -> u32 {
        TICK_US * 100 / speed as u32
    }
}

impl Default for MotorRamp {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for MotorRamp {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.speed > RAMP_END_PERCENT {
            return None;
        }
        let period = Self::period_us(self.speed);
        self.speed += 1;
        Some(period)
    }
}
