#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use hal::{
    self,
    clocks::Clocks,
    dma::{self, DmaChannel, DmaInterrupt, DmaPeriph},
    gpio::{self, Edge, Pin},
    pac,
};
use heapless::spsc::{Consumer, Producer, Queue};
use rtic_monotonics::systick::prelude::*;

use hmdscan_algo::{
    acquisition::{Acquisition, AcquisitionWindow, StartOutcome},
    config::{
        store::{ConfigStore, Lifetime},
        ConfigParameters, Gain,
    },
    diagnostics::{snapshot::SnapshotBuffer, AlarmMonitor, RuntimeCounter, ThermalMonitor},
    math_integer::filters::debounce::Edge as SignalEdge,
    registers::{rtu::RtuSlave, RegisterExchange, Telemetry},
    rotation::{PulseEdge, RotationScheduler},
    timekeeping::{MotorRamp, Ticker, RAMP_STEP_MS},
    SensorController,
};
use hmdscan_drivers::{
    capture::AdcCapture,
    dac::SpiDac,
    flash_store::FlashStore,
    io::SensorIo,
    pinout,
    rs485::{LinkPort, Rs485Link, RX_QUEUE_LEN},
    temperature::TemperatureSensor,
    timers::{self, MicrosClock, OneShotTrigger, TickTimer},
};

systick_monotonic!(Mono, 1_000);

/// Capture state shared by the trigger and transfer-complete interrupts.
pub struct Frontend {
    acq: Acquisition,
    capture: AdcCapture,
    facet: u8, // Facet index of the running capture
}

fn exti_edge(edge: PulseEdge) -> Edge {
    match edge {
        PulseEdge::Falling => Edge::Falling,
        PulseEdge::Rising => Edge::Rising,
    }
}

fn saturate(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}

#[rtic::app(device = pac, peripherals = true, dispatchers = [USART2, USART3])]
mod app {
    use super::*;
    use rtic::mutex_prelude::*;

    #[shared]
    struct Shared {
        frontend: Frontend,
        trigger: OneShotTrigger,
        scheduler: RotationScheduler,
        ticker: Ticker,
        tick_timer: TickTimer,
        sensor: SensorController,
        gain: Gain,
        snapshot: SnapshotBuffer,
        io: SensorIo,
        exec_time: u32,
    }

    #[local]
    struct Local {
        clock: MicrosClock,
        motor_clk: Pin,
        pulse_pin: Pin,
        pulse_edge: PulseEdge,
        dac: SpiDac,
        rx_producer: Producer<'static, u8, RX_QUEUE_LEN>,
        rx_consumer: Consumer<'static, u8, RX_QUEUE_LEN>,
        link: Rs485Link,
        rtu: RtuSlave,
        exchange: RegisterExchange,
        store: ConfigStore<FlashStore>,
        config: ConfigParameters,
        temp_sensor: TemperatureSensor,
        thermal: ThermalMonitor,
        runtime: RuntimeCounter,
        alarm: AlarmMonitor,
    }

    #[init(local = [rx_queue: Queue<u8, RX_QUEUE_LEN> = Queue::new()])]
    fn init(cx: init::Context) -> (Shared, Local) {
        let dp = cx.device;
        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();

        let sysclk_freq = clock_cfg.sysclk(); // System clock frequency in Hz
        defmt::debug!("SYSTEM: Clock frequency is {} MHz", sysclk_freq / 1_000_000);
        Mono::start(cx.core.SYST, sysclk_freq);
        let clock = MicrosClock::new(dp.TIM2, &clock_cfg);

        let io = SensorIo::new();
        let inputs = io.read_inputs();

        let mut store = ConfigStore::new(FlashStore::new(dp.FLASH));
        let (mut config, lifetime) = match store.init() {
            Ok(loaded) => loaded,
            Err(e) => {
                defmt::error!("CONFIG: store unavailable ({}), running on defaults", e);
                (ConfigParameters::default(), Lifetime::default())
            }
        };

        // Buttons A and D held at power-up restore the factory settings
        if inputs.buttons[0] && inputs.buttons[3] {
            match store.factory_reset() {
                Ok(restored) => config = restored,
                Err(e) => defmt::error!("CONFIG: factory reset failed ({})", e),
            }
        }
        defmt::info!("CONFIG: {}", config);

        let mut motor_enable = pinout::sensor::MOTOR_ENABLE.init();
        motor_enable.set_high();
        let mut motor_clk = pinout::sensor::MOTOR_CLK.init();
        motor_clk.set_low();

        let mut pulse_pin = pinout::sensor::ROTATION_PULSE.init();
        let pulse_edge = PulseEdge::from_offset(config.position_offset);
        pulse_pin.enable_interrupt(exti_edge(pulse_edge));

        let temp_sensor = TemperatureSensor::new(dp.ADC1, &clock_cfg);
        let frontend = Frontend {
            acq: Acquisition::new(),
            capture: AdcCapture::new(dp.ADC2, dp.DMA1, dp.TIM6, &clock_cfg),
            facet: 0,
        };
        let trigger = OneShotTrigger::new(dp.TIM7, &clock_cfg);
        let tick_timer = TickTimer::new(dp.TIM3, &clock_cfg);
        let dac = SpiDac::new(dp.SPI2);

        let link_settings = config.link();
        let link = Rs485Link::new(dp.USART1, &link_settings, &clock_cfg);
        let (rx_producer, rx_consumer) = cx.local.rx_queue.split();

        let sensor = SensorController::new(config);
        let gain = sensor.gain();

        motor_ramp::spawn().ok();
        defmt::info!("SYSTEM: started at {} us", clock.now_us());

        (
            Shared {
                frontend,
                trigger,
                scheduler: RotationScheduler::new(config.position_offset),
                ticker: Ticker::new(),
                tick_timer,
                sensor,
                gain,
                snapshot: SnapshotBuffer::new(),
                io,
                exec_time: 0,
            },
            Local {
                clock,
                motor_clk,
                pulse_pin,
                pulse_edge,
                dac,
                rx_producer,
                rx_consumer,
                link,
                rtu: RtuSlave::new(&link_settings),
                exchange: RegisterExchange::new(),
                store,
                config,
                temp_sensor,
                thermal: ThermalMonitor::new(lifetime.max_temperature),
                runtime: RuntimeCounter::new(lifetime.total_runtime),
                alarm: AlarmMonitor::new(),
            },
        )
    }

    // Facet pulse from the hall probe: schedule the acquisition of this facet
    #[task(binds = EXTI0, shared = [scheduler, trigger, ticker], priority = 3)]
    fn on_rotation_pulse(cx: on_rotation_pulse::Context) {
        gpio::clear_exti_interrupt(pinout::sensor::ROTATION_PULSE.exti_line());
        let now = timers::now_us();

        (cx.shared.scheduler, cx.shared.trigger, cx.shared.ticker).lock(
            |scheduler, trigger, ticker| {
                scheduler.on_pulse(trigger, now, ticker.last_sub_pulse_us());
            },
        );
    }

    // Trigger delay expired: start the paced capture
    #[task(binds = TIM7, shared = [trigger, frontend, scheduler, gain, exec_time], priority = 3)]
    fn on_trigger(mut cx: on_trigger::Context) {
        cx.shared.trigger.lock(|trigger| trigger.acknowledge());
        let now = timers::now_us();
        let gain = cx.shared.gain.lock(|gain| *gain);
        let facet = cx.shared.scheduler.lock(|scheduler| scheduler.pulse_index());

        let outcome = cx.shared.frontend.lock(|f| {
            let outcome = f.acq.start(&mut f.capture, gain, now);
            if outcome == StartOutcome::Started {
                f.facet = facet;
            }
            outcome
        });
        if let StartOutcome::Skipped { busy_us } = outcome {
            cx.shared.exec_time.lock(|exec_time| *exec_time = busy_us);
        }
    }

    // Capture finished: hand the window to the processing task
    #[task(binds = DMA1_CH1, shared = [frontend], priority = 4)]
    fn on_capture_complete(mut cx: on_capture_complete::Context) {
        dma::clear_interrupt(
            DmaPeriph::Dma1,
            DmaChannel::C1,
            DmaInterrupt::TransferComplete,
        );
        let now = timers::now_us();

        let (window, facet) = cx
            .shared
            .frontend
            .lock(|f| (f.acq.complete(&mut f.capture, now), f.facet));
        // Still busy with the previous window: this one is dropped
        if process::spawn(window, facet).is_err() {
            cx.shared.frontend.lock(|f| f.acq.record_dropped());
        }
    }

    #[task(priority = 1, shared = [sensor, snapshot, io, ticker, exec_time], local = [dac])]
    async fn process(mut cx: process::Context, window: AcquisitionWindow, facet: u8) {
        let started = timers::now_us();
        let now_ms = cx.shared.ticker.lock(|ticker| ticker.millis());

        let (edge, present, filter_position) = cx.shared.sensor.lock(|sensor| {
            let edge = sensor.tick(&window, now_ms);
            if sensor.commit(cx.local.dac).is_err() {
                defmt::warn!("OUTPUT: DAC write failed");
            }
            (edge, sensor.signal_present(), sensor.config().filter_position)
        });

        if edge != SignalEdge::None {
            cx.shared.io.lock(|io| io.set_signal(present));
        }
        cx.shared
            .snapshot
            .lock(|snapshot| snapshot.offer(facet, filter_position, &window));

        let elapsed = timers::now_us().wrapping_sub(started);
        cx.shared.exec_time.lock(|exec_time| *exec_time = elapsed);
    }

    // 500 µs bookkeeping tick, also the motor drive clock
    #[task(binds = TIM3, shared = [ticker, tick_timer], local = [motor_clk], priority = 2)]
    fn on_tick(mut cx: on_tick::Context) {
        cx.shared.tick_timer.lock(|tick_timer| tick_timer.acknowledge());
        let now = timers::now_us();
        let events = cx.shared.ticker.lock(|ticker| ticker.tick(now));

        if events.motor_clock {
            cx.local.motor_clk.set_high();
        } else {
            cx.local.motor_clk.set_low();
        }
        if events.laser_expired {
            defmt::info!("IO: laser timeout");
        }
        if events.test_expired {
            defmt::info!("IO: internal test timeout");
        }
    }

    #[task(binds = USART1, local = [rx_producer], priority = 2)]
    fn on_usart_rx(cx: on_usart_rx::Context) {
        Rs485Link::on_receive(cx.local.rx_producer);
    }

    // Motor soft start
    #[task(priority = 1, shared = [tick_timer])]
    async fn motor_ramp(mut cx: motor_ramp::Context) {
        for period in MotorRamp::new() {
            cx.shared.tick_timer.lock(|tick_timer| tick_timer.set_period_us(period));
            Mono::delay(RAMP_STEP_MS.millis()).await;
        }
        defmt::info!("MOTOR: full speed");
    }

    #[idle(
        shared = [frontend, scheduler, ticker, sensor, gain, snapshot, io, exec_time],
        local = [clock, pulse_pin, pulse_edge, lost_windows: u32 = 0, rx_consumer, link, rtu, exchange, store, config, temp_sensor, thermal, runtime, alarm]
    )]
    fn idle(mut cx: idle::Context) -> ! {
        loop {
            // Inputs and test mode
            let inputs = cx.shared.io.lock(|io| io.read_inputs());
            let (internal_test, laser_on) = cx
                .shared
                .ticker
                .lock(|ticker| (ticker.internal_test_active(), ticker.laser_active()));
            let test_mode = inputs.test || internal_test;

            let gain = cx.shared.sensor.lock(|sensor| {
                sensor.select_set(inputs.set);
                sensor.set_test_mode(test_mode);
                sensor.gain()
            });
            cx.shared.gain.lock(|g| *g = gain);

            // Temperature and operating hours
            let celsius = cx.local.temp_sensor.read_celsius();
            if let Some(max) = cx.local.thermal.update(celsius) {
                if let Err(e) = cx.local.store.persist_max_temperature(max) {
                    defmt::warn!("CONFIG: persist failed: {}", e);
                }
            }
            let hours = cx.shared.ticker.lock(|ticker| ticker.take_hours());
            for _ in 0..hours {
                if cx.local.runtime.on_hour() {
                    if let Err(e) = cx.local.store.persist_runtime(cx.local.runtime.hours()) {
                        defmt::warn!("CONFIG: persist failed: {}", e);
                    }
                }
            }

            // Alarm and outputs
            let (motor_fault, rotation_us, latency_us, delay_us) =
                cx.shared.scheduler.lock(|scheduler| {
                    (
                        scheduler.motor_fault(),
                        scheduler.rotation_us(),
                        scheduler.latency_us(),
                        scheduler.delay_us(),
                    )
                });
            let alarm = cx.local.alarm.update(
                motor_fault,
                cx.local.thermal.fault(),
                inputs.test,
                internal_test,
            );
            let io_state = cx.shared.io.lock(|io| {
                io.set_alarm(alarm);
                io.set_laser(laser_on);
                io.set_ir_led(test_mode);
                io.state(&inputs)
            });

            // Register exchange
            let display = cx.shared.sensor.lock(|sensor| sensor.display());
            let (capture_us, lost) = cx
                .shared
                .frontend
                .lock(|f| (f.acq.capture_us(), f.acq.skipped()));
            if lost != *cx.local.lost_windows {
                defmt::warn!("ACQ: {} windows lost", lost.wrapping_sub(*cx.local.lost_windows));
                *cx.local.lost_windows = lost;
            }
            let exec_time = cx.shared.exec_time.lock(|exec_time| *exec_time);
            let telemetry = Telemetry {
                temperature: cx.local.thermal.temperature(),
                max_temperature: cx.local.thermal.max_temperature(),
                total_runtime: cx.local.runtime.hours(),
                io_state,
                peak_percent: display.peak_percent,
                position: display.position,
                position_avg: display.position_avg,
                motor_time_diff: saturate(rotation_us),
                exec_time_adc: saturate(capture_us),
                exec_time: saturate(exec_time),
                exec_time_trigger: saturate(latency_us),
                offset_delay: delay_us,
            };
            let snapshot = cx.shared.snapshot.lock(|snapshot| snapshot.take());

            let outcome = {
                let mut port = LinkPort {
                    link: &mut *cx.local.link,
                    rx: &mut *cx.local.rx_consumer,
                };
                let mut transport = cx.local.rtu.bind(&mut port);
                cx.local.exchange.cycle(
                    cx.local.config,
                    &telemetry,
                    snapshot.as_ref(),
                    &mut transport,
                    cx.local.store,
                    cx.local.clock.now_us(),
                )
            };

            if outcome.config_changed {
                let config = *cx.local.config;
                cx.shared.sensor.lock(|sensor| sensor.apply_config(config));
                cx.shared
                    .scheduler
                    .lock(|scheduler| scheduler.set_offset(config.position_offset));

                let edge = PulseEdge::from_offset(config.position_offset);
                if edge != *cx.local.pulse_edge {
                    defmt::info!("ROTATION: facet pulse edge now {}", edge);
                    cx.local.pulse_pin.enable_interrupt(exti_edge(edge));
                    *cx.local.pulse_edge = edge;
                }
            }
            if outcome.link_changed {
                let mut port = LinkPort {
                    link: &mut *cx.local.link,
                    rx: &mut *cx.local.rx_consumer,
                };
                cx.local.rtu.reconfigure(&mut port, &cx.local.config.link());
            }
            if let Some(request) = outcome.io_request {
                defmt::info!("IO: master request {}", request);
                cx.shared.ticker.lock(|ticker| {
                    if request.laser {
                        ticker.arm_laser();
                    } else {
                        ticker.cancel_laser();
                    }
                    if request.ir_led {
                        ticker.arm_internal_test();
                    } else {
                        ticker.cancel_internal_test();
                    }
                });
            }
        }
    }
}

#[defmt::panic_handler]
fn panic() -> ! {
    cortex_m::asm::udf()
}
