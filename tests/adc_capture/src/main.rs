#![no_main]
#![no_std]

// Bring-up of the paced photodiode capture: a free-running timer requests a
// window twice a second, the transfer-complete interrupt prints the clamped
// samples and the feature extraction result.

use defmt_rtt as _;
use panic_probe as _;

use hal::{
    self,
    clocks::Clocks,
    dma::{self, DmaChannel, DmaInterrupt, DmaPeriph},
    pac,
    pac::TIM3,
    timer::{Timer, TimerInterrupt},
};

use hmdscan_algo::{
    acquisition::{Acquisition, StartOutcome},
    config::{ConfigParameters, Gain},
    detection::{self, DetectionParams},
};
use hmdscan_drivers::{capture::AdcCapture, timers};

const GAIN: Gain = Gain::X16;

#[rtic::app(device = pac, peripherals = true)]
mod app {
    use super::*;
    use rtic::mutex_prelude::*;

    #[shared]
    struct Shared {
        acq: Acquisition,
        capture: AdcCapture,
    }

    #[local]
    struct Local {
        timer: Timer<TIM3>,
        config: ConfigParameters,
    }

    #[init]
    fn init(ctx: init::Context) -> (Shared, Local) {
        let dp = ctx.device;
        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();

        let _clock = timers::MicrosClock::new(dp.TIM2, &clock_cfg);
        let capture = AdcCapture::new(dp.ADC2, dp.DMA1, dp.TIM6, &clock_cfg);

        let mut timer = Timer::new_tim3(dp.TIM3, 2., Default::default(), &clock_cfg);
        timer.enable_interrupt(TimerInterrupt::Update);
        timer.enable();

        (
            Shared {
                acq: Acquisition::new(),
                capture,
            },
            Local {
                timer,
                config: ConfigParameters::default(),
            },
        )
    }

    #[task(binds = DMA1_CH1, shared = [acq, capture], local = [config], priority = 2)]
    fn on_capture_complete(cx: on_capture_complete::Context) {
        dma::clear_interrupt(
            DmaPeriph::Dma1,
            DmaChannel::C1,
            DmaInterrupt::TransferComplete,
        );
        let now = timers::now_us();

        (cx.shared.acq, cx.shared.capture).lock(|acq, capture| {
            let window = acq.complete(capture, now);
            defmt::println!("ACQ: {} us, samples {:?}", acq.capture_us(), window.samples());

            let config = cx.local.config;
            let params = DetectionParams {
                base_level: config.threshold1.base_level(),
                window_begin: config.window_begin,
                window_end: config.window_end,
                mode: config.position_mode,
            };
            let features = detection::extract(&window, &params, false);
            defmt::println!("ACQ: {}", features);
        });
    }

    #[task(binds = TIM3, local = [timer], shared = [acq, capture], priority = 1)]
    fn on_timer(cx: on_timer::Context) {
        cx.local.timer.clear_interrupt(TimerInterrupt::Update);
        let now = timers::now_us();

        (cx.shared.acq, cx.shared.capture).lock(|acq, capture| {
            if let StartOutcome::Skipped { busy_us } = acq.start(capture, GAIN, now) {
                defmt::println!("ACQ: still busy after {} us", busy_us);
            }
        });
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
