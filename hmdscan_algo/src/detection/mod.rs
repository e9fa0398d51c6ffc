// Extracts peak intensity and position from one acquisition window.

// Key Features:
// - Threshold and evaluation window with hysteresis on the previous presence
// - Running peak over the window
// - Four position modes: HMD, rising edge, falling edge, peak
// - Pure function: all state (previous presence) is passed in

// Detailed Operation:
// Without a target the threshold sits `THRESHOLD_HYSTERESIS` above the base level
// and the window spans [begin*2, end*2). With a target present the threshold drops
// by the same amount below the base level and the window widens by
// `WINDOW_WIDENING` samples on both sides, so a target hovering at the threshold
// or at the window edge does not flicker. The running peak `peak[i]` is the
// maximum of the window samples up to i and starts empty, so a step on the very
// first window sample is still an edge. The first index that satisfies the
// mode's condition while the running peak is above the threshold gives the
// timestamp `index * SAMPLE_SPACING`.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

use crate::acquisition::{AcquisitionWindow, WINDOW_LEN};
use crate::config::{PositionMode, WindowBegin, WindowEnd};

/// Distance of the on/off thresholds from the base level.
pub const THRESHOLD_HYSTERESIS: i32 = 13;
/// Samples added on each side of the window while a target is present.
pub const WINDOW_WIDENING: usize = 5;
/// Minimum running-peak increase detected in peak mode (exclusive).
pub const PEAK_JUMP: i32 = 5;
/// Timestamp units per sample.
pub const SAMPLE_SPACING: u16 = 5;

/// Inputs of one extraction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DetectionParams {
    /// Base level on the sample scale (`Threshold::base_level`).
    pub base_level: i32,
    pub window_begin: WindowBegin,
    pub window_end: WindowEnd,
    pub mode: PositionMode,
}

/// Features of one scan.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalFeatures {
    /// Highest sample inside the window (0..255).
    pub peak: u16,
    /// Detected position as `index * SAMPLE_SPACING`.
    pub timestamp: Option<u16>,
    /// Raw (undebounced) target presence.
    pub present: bool,
}

/// Evaluates one window.
///
/// # Arguments
/// * `window` - Completed acquisition
/// * `params` - Threshold, window bounds and position mode
/// * `present` - Raw presence of the previous scan (selects the hysteresis side)
pub fn extract(window: &AcquisitionWindow, params: &DetectionParams, present: bool) -> SignalFeatures {
    let base = params.base_level;
    let (threshold, first, last) = if present {
        (
            base - THRESHOLD_HYSTERESIS,
            params.window_begin.first_sample().saturating_sub(WINDOW_WIDENING),
            params.window_end.last_sample() + WINDOW_WIDENING,
        )
    } else {
        (
            base + THRESHOLD_HYSTERESIS,
            params.window_begin.first_sample(),
            params.window_end.last_sample(),
        )
    };
    let last = last.min(WINDOW_LEN);
    let samples = &window.samples()[first..last];

    let mut peak: i32 = 0;
    let mut prev_peak: i32 = 0; // peak[i - 1]
    let mut index: Option<usize> = None;

    for (offset, &sample) in samples.iter().enumerate() {
        let sample = sample as i32;
        if sample > peak {
            peak = sample;
        }

        if index.is_none() && peak > threshold {
            let hit = match params.mode {
                PositionMode::Hmd => true,
                PositionMode::RisingEdge => prev_peak <= threshold,
                PositionMode::FallingEdge => sample < base - THRESHOLD_HYSTERESIS,
                PositionMode::Peak => prev_peak + PEAK_JUMP < peak,
            };
            if hit {
                index = Some(first + offset);
            }
        }
        prev_peak = peak;
    }

    let present = index.is_some() && peak >= base - THRESHOLD_HYSTERESIS;
    SignalFeatures {
        peak: peak as u16,
        timestamp: index.map(|i| i as u16 * SAMPLE_SPACING),
        present,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Threshold;

    fn params(mode: PositionMode) -> DetectionParams {
        DetectionParams {
            base_level: Threshold::from_register(50).unwrap().base_level(),
            window_begin: WindowBegin::from_register(20).unwrap(),
            window_end: WindowEnd::from_register(80).unwrap(),
            mode,
        }
    }

    /// Rectangular pulse of `level` on [rise, fall).
    fn pulse(rise: usize, fall: usize, level: u16) -> AcquisitionWindow {
        let mut samples = [10u16; WINDOW_LEN];
        for s in &mut samples[rise..fall] {
            *s = level;
        }
        AcquisitionWindow::from_samples(samples)
    }

    #[test]
    fn step_gives_index_times_five() {
        let window = pulse(90, 200, 220);
        for mode in [PositionMode::Hmd, PositionMode::RisingEdge, PositionMode::Peak] {
            let features = extract(&window, &params(mode), false);
            assert_eq!(features.timestamp, Some(450));
            assert_eq!(features.peak, 220);
            assert!(features.present);
        }
    }

    #[test]
    fn falling_edge_reports_drop() {
        let window = pulse(90, 120, 220);
        let features = extract(&window, &params(PositionMode::FallingEdge), false);
        assert_eq!(features.timestamp, Some(600));
        assert!(features.present);

        let stays_high = pulse(90, 200, 220);
        let features = extract(&stays_high, &params(PositionMode::FallingEdge), false);
        assert_eq!(features.timestamp, None);
        assert!(!features.present);
    }

    #[test]
    fn peak_mode_needs_a_jump() {
        // Slow ramp: never more than 5 per sample
        let mut samples = [0u16; WINDOW_LEN];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = (i as u16 * 2).min(250);
        }
        let window = AcquisitionWindow::from_samples(samples);
        let features = extract(&window, &params(PositionMode::Peak), false);
        assert_eq!(features.timestamp, None);

        let features = extract(&window, &params(PositionMode::Hmd), false);
        assert_eq!(features.timestamp, Some(71 * 5));
    }

    #[test]
    fn hysteresis_keeps_weak_target() {
        // 130 sits between base-13 (114) and base+13 (140)
        let window = pulse(60, 150, 130);
        let absent = extract(&window, &params(PositionMode::Hmd), false);
        assert!(!absent.present);
        assert_eq!(absent.peak, 130);

        let held = extract(&window, &params(PositionMode::Hmd), true);
        assert!(held.present);
        assert_eq!(held.timestamp, Some(300));
    }

    #[test]
    fn window_widens_while_present() {
        // Target just before the nominal window start (sample 40)
        let window = pulse(37, 39, 200);
        let absent = extract(&window, &params(PositionMode::RisingEdge), false);
        assert_eq!(absent.timestamp, None);

        let held = extract(&window, &params(PositionMode::RisingEdge), true);
        assert_eq!(held.timestamp, Some(37 * 5));
    }

    #[test]
    fn step_on_first_window_sample() {
        let window = pulse(40, 200, 200);
        for mode in [PositionMode::Hmd, PositionMode::RisingEdge, PositionMode::Peak] {
            assert_eq!(extract(&window, &params(mode), false).timestamp, Some(200));
        }
    }

    #[test]
    fn empty_window_reports_nothing() {
        let features = extract(&AcquisitionWindow::new(), &params(PositionMode::Hmd), false);
        assert_eq!(features, SignalFeatures::default());
    }
}
