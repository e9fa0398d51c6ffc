//! Hardware-independent core of the rotating-mirror HMD sensor.
//!
//! Everything between the converter and the DAC lives here: trigger scheduling,
//! acquisition bookkeeping, feature extraction, filtering and output mapping,
//! the Modbus register exchange and the configuration store logic. Hardware is
//! reached only through the traits `TriggerSource`, `SampleCapture`,
//! `AnalogOutput`, `NonvolatileStore` and `SerialLink`, implemented per target.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod acquisition;
pub mod config;
pub mod detection;
pub mod diagnostics;
pub mod math_integer;
pub mod output;
pub mod registers;
pub mod rotation;
pub mod timekeeping;

use acquisition::AcquisitionWindow;
use config::{ActiveSet, ConfigParameters, Gain};
use detection::{DetectionParams, SignalFeatures};
use math_integer::filters::debounce::{Edge, FilterDebounce};
use math_integer::filters::moving_average::FilterMovingAverage;
use output::{AnalogCodes, AnalogOutput, DisplayValues};

/// Per-scan signal chain: extraction, presence debounce, position average and output codes.
pub struct SensorController {
    config: ConfigParameters,
    active: ActiveSet,     // Gain/threshold pair in use
    set_input_high: bool,  // Last level of the set input
    test_mode: bool,       // External or internal test forces fixed outputs
    raw_present: bool,     // Presence of the previous scan, drives hysteresis

    presence: FilterDebounce,
    position: FilterMovingAverage,

    features: SignalFeatures,
    display: DisplayValues,
    codes: AnalogCodes,
}

impl SensorController {
    /// Create a new SensorController from the loaded configuration.
    pub fn new(config: ConfigParameters) -> Self {
        Self {
            config,
            active: config.active_set(false),
            set_input_high: false,
            test_mode: false,
            raw_present: false,

            presence: FilterDebounce::new(config.filter_on.get(), config.filter_off.get()),
            position: FilterMovingAverage::new(config.filter_position.get()),

            features: SignalFeatures::default(),
            display: DisplayValues::default(),
            codes: AnalogCodes::default(),
        }
    }

    #[inline(always)]
    pub fn config(&self) -> &ConfigParameters {
        &self.config
    }

    /// Adopts a changed configuration without dropping filter state.
    pub fn apply_config(&mut self, config: ConfigParameters) {
        self.config = config;
        self.active = config.active_set(self.set_input_high);
        self.presence
            .set_intervals(config.filter_on.get(), config.filter_off.get());
        self.position.set_period(config.filter_position.get());
    }

    /// Re-evaluates the gain/threshold pair from the set input level.
    pub fn select_set(&mut self, set_input_high: bool) {
        self.set_input_high = set_input_high;
        let active = self.config.active_set(set_input_high);
        if active != self.active {
            debug!("SIGNAL: gain x{} threshold {}%", active.gain.to_register(), active.threshold.to_register());
            self.active = active;
        }
    }

    pub fn set_test_mode(&mut self, on: bool) {
        self.test_mode = on;
    }

    /// Gain for the next acquisition.
    #[inline(always)]
    pub fn gain(&self) -> Gain {
        self.active.gain
    }

    /// Main update method, called once per completed acquisition window.
    ///
    /// # Arguments
    /// * `window` - Last completed acquisition
    /// * `now_ms` - Millisecond clock for the presence debounce
    ///
    /// Returns the presence edge so the caller can drive the signal output.
    pub fn tick(&mut self, window: &AcquisitionWindow, now_ms: u32) -> Edge {
        let params = DetectionParams {
            base_level: self.active.threshold.base_level(),
            window_begin: self.config.window_begin,
            window_end: self.config.window_end,
            mode: self.config.position_mode,
        };
        self.features = detection::extract(window, &params, self.raw_present);
        self.raw_present = self.features.present || self.test_mode;

        let edge = if self.test_mode {
            self.presence.force(true, now_ms)
        } else {
            self.presence.tick(self.raw_present, now_ms)
        };
        match edge {
            Edge::Rose => debug!("SIGNAL: target present"),
            Edge::Fell => debug!("SIGNAL: target lost"),
            Edge::None => {}
        }

        let present = self.presence.state();
        let position = if present {
            self.features.timestamp.unwrap_or(0)
        } else {
            0
        };
        let position_avg = if present {
            self.position.tick(position)
        } else {
            self.position.reset(); // Next present scan restarts the average
            0
        };

        if self.test_mode {
            self.display = DisplayValues::TEST;
            self.codes = AnalogCodes::TEST;
        } else {
            let (position_display, position_code) =
                output::map_position(position_avg, self.config.window_begin, self.config.window_end);
            let (peak_percent, peak_code) = output::map_intensity(self.features.peak);
            self.display = DisplayValues {
                peak_percent,
                position,
                position_avg: position_display,
            };
            self.codes = AnalogCodes {
                intensity: peak_code,
                position: position_code,
            };
        }
        edge
    }

    /// Writes the current codes to the DAC, routed by the analog output mode.
    pub fn commit<O: AnalogOutput>(&self, output: &mut O) -> Result<(), O::Error> {
        let (channel1, channel2) = self.codes.route(self.config.analog_out_mode);
        output.write_pair(channel1, channel2)
    }

    /// Debounced target presence.
    #[inline(always)]
    pub fn signal_present(&self) -> bool {
        self.presence.state()
    }

    #[inline(always)]
    pub fn features(&self) -> SignalFeatures {
        self.features
    }

    #[inline(always)]
    pub fn display(&self) -> DisplayValues {
        self.display
    }

    #[inline(always)]
    pub fn codes(&self) -> AnalogCodes {
        self.codes
    }
}
