// Timer roles:
// - TIM2: free-running 32-bit µs clock, read from any priority
// - TIM7: one-shot trigger delay after a facet pulse
// - TIM3: 500 µs bookkeeping tick, period stretched by the motor ramp
// All of them run with a 1 MHz counter clock so reload values are µs.

use hal::{
    clocks::Clocks,
    pac::{self, TIM2, TIM3, TIM7},
    timer::{
        Alignment, CaptureCompareDma, CountDir, Timer, TimerConfig, TimerInterrupt, UpdateReqSrc,
    },
};

use hmdscan_algo::rotation::TriggerSource;
use hmdscan_algo::timekeeping::TICK_US;

const COUNTER_HZ: u32 = 1_000_000;

fn config(one_pulse_mode: bool) -> TimerConfig {
    TimerConfig {
        one_pulse_mode,
        update_request_source: UpdateReqSrc::OverUnderFlow,
        auto_reload_preload: !one_pulse_mode,
        alignment: Alignment::Edge,
        capture_compare_dma: CaptureCompareDma::Update,
        direction: CountDir::Up,
    }
}

/// Prescaler giving a 1 MHz counter on APB1 timers.
fn us_prescaler(clock_cfg: &Clocks) -> u16 {
    (clock_cfg.apb1_timer() / COUNTER_HZ - 1) as u16
}

/// Free-running µs clock on the 32-bit TIM2.
pub struct MicrosClock {
    tim: Timer<TIM2>,
}

impl MicrosClock {
    pub fn new(tim2: TIM2, clock_cfg: &Clocks) -> Self {
        let mut tim = Timer::new_tim2(tim2, 1., config(false), clock_cfg);
        tim.set_prescaler(us_prescaler(clock_cfg));
        tim.set_auto_reload(u32::MAX);
        tim.reset_count();
        tim.enable();
        MicrosClock { tim }
    }

    #[inline(always)]
    pub fn now_us(&self) -> u32 {
        self.tim.read_count()
    }
}

/// Current µs clock value.
///
/// Reads the TIM2 counter register directly so every task can timestamp
/// without sharing `MicrosClock`. Only valid after `MicrosClock::new`.
#[inline(always)]
pub fn now_us() -> u32 {
    // Read-only access to a free-running counter
    unsafe { (*pac::TIM2::ptr()).cnt.read().bits() }
}

/// One-shot delay timer that starts an acquisition when it expires.
pub struct OneShotTrigger {
    tim: Timer<TIM7>,
}

impl OneShotTrigger {
    pub fn new(tim7: TIM7, clock_cfg: &Clocks) -> Self {
        let mut tim = Timer::new_tim7(tim7, 1_000., config(true), clock_cfg);
        tim.set_prescaler(us_prescaler(clock_cfg));
        tim.enable_interrupt(TimerInterrupt::Update);
        OneShotTrigger { tim }
    }

    /// Clears the expiry flag, called first in the interrupt.
    pub fn acknowledge(&mut self) {
        self.tim.clear_interrupt(TimerInterrupt::Update);
    }
}

impl TriggerSource for OneShotTrigger {
    fn arm(&mut self, delay_us: u16) {
        self.tim.disable();
        // A zero reload never overflows, fire after 1 µs instead
        self.tim.set_auto_reload((delay_us as u32).max(1));
        self.tim.reset_count();
        self.tim.enable();
    }
}

/// Periodic bookkeeping tick.
pub struct TickTimer {
    tim: Timer<TIM3>,
}

impl TickTimer {
    pub fn new(tim3: TIM3, clock_cfg: &Clocks) -> Self {
        let mut tim = Timer::new_tim3(tim3, 2_000., config(false), clock_cfg);
        tim.set_prescaler(us_prescaler(clock_cfg));
        tim.set_auto_reload(TICK_US - 1);
        tim.enable_interrupt(TimerInterrupt::Update);
        tim.enable();
        TickTimer { tim }
    }

    pub fn acknowledge(&mut self) {
        self.tim.clear_interrupt(TimerInterrupt::Update);
    }

    /// Changes the tick period, applied from the next update event.
    pub fn set_period_us(&mut self, period_us: u32) {
        self.tim.set_auto_reload(period_us.max(1) - 1);
    }
}
