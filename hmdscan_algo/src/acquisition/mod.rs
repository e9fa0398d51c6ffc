// Captures one window of differential light samples per trigger.

// Key Features:
// - `SampleCapture` trait for the hardware-paced, DMA-completed converter
// - Busy tracking: a trigger arriving during a capture is skipped and timed
// - Lost-window counter covering skipped triggers and windows dropped downstream
// - Completion copies the signed readings into the window, clamping negatives to 0

// Detailed Operation:
// `start` is called from the trigger expiry, `complete` from the transfer-complete
// interrupt. Between them the converter runs on its own pacing source. `complete`
// hands the window out by value, so processing of rotation N-1 overlaps the
// capture of rotation N and the bookkeeping stays readable meanwhile.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

use crate::config::Gain;

/// Samples per acquisition window.
pub const WINDOW_LEN: usize = 200;
/// Converter pacing rate.
pub const SAMPLE_RATE_HZ: u32 = 400_000;

/// Non-negative sample magnitudes of one scan.
#[derive(Clone)]
pub struct AcquisitionWindow {
    samples: [u16; WINDOW_LEN],
}

impl AcquisitionWindow {
    pub const fn new() -> Self {
        Self {
            samples: [0; WINDOW_LEN],
        }
    }

    pub const fn from_samples(samples: [u16; WINDOW_LEN]) -> Self {
        Self { samples }
    }

    /// Overwrites the window from signed readings, negatives become 0.
    pub fn fill_clamped(&mut self, raw: &[i16; WINDOW_LEN]) {
        for (dst, &src) in self.samples.iter_mut().zip(raw.iter()) {
            *dst = src.max(0) as u16;
        }
    }

    #[inline(always)]
    pub fn samples(&self) -> &[u16; WINDOW_LEN] {
        &self.samples
    }
}

impl Default for AcquisitionWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Differential converter paced by a hardware source, completed by interrupt.
pub trait SampleCapture {
    /// Clears the buffer, applies `gain` and starts a paced capture of `WINDOW_LEN` samples.
    fn begin(&mut self, gain: Gain);

    /// Stops pacing and transfer, returns the signed readings of the finished capture.
    fn finish(&mut self) -> &[i16; WINDOW_LEN];
}

/// Result of a start request.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartOutcome {
    Started,
    /// The previous capture was still running for `busy_us`.
    Skipped { busy_us: u32 },
}

pub struct Acquisition {
    busy: bool,
    started_us: u32,
    capture_us: u32,
    skipped: u32,
}

impl Acquisition {
    pub const fn new() -> Self {
        Self {
            busy: false,
            started_us: 0,
            capture_us: 0,
            skipped: 0,
        }
    }

    /// Starts a capture unless one is running.
    ///
    /// # Arguments
    /// * `capture` - Converter to start
    /// * `gain` - Gain of the active set
    /// * `now_us` - Free-running µs clock
    pub fn start<C: SampleCapture>(&mut self, capture: &mut C, gain: Gain, now_us: u32) -> StartOutcome {
        if self.busy {
            self.skipped = self.skipped.wrapping_add(1);
            return StartOutcome::Skipped {
                busy_us: now_us.wrapping_sub(self.started_us),
            };
        }
        self.busy = true;
        self.started_us = now_us;
        capture.begin(gain);
        StartOutcome::Started
    }

    /// Finishes the running capture and returns its window.
    pub fn complete<C: SampleCapture>(&mut self, capture: &mut C, now_us: u32) -> AcquisitionWindow {
        let mut window = AcquisitionWindow::new();
        window.fill_clamped(capture.finish());
        self.busy = false;
        self.capture_us = now_us.wrapping_sub(self.started_us);
        window
    }

    /// Counts a completed window that processing could not take.
    pub fn record_dropped(&mut self) {
        self.skipped = self.skipped.wrapping_add(1);
    }

    #[inline(always)]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Duration of the last completed capture, µs.
    #[inline(always)]
    pub fn capture_us(&self) -> u32 {
        self.capture_us
    }

    /// Windows lost so far: triggers skipped while a capture was running plus
    /// completed windows dropped by `record_dropped`.
    #[inline(always)]
    pub fn skipped(&self) -> u32 {
        self.skipped
    }
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Converter fake returning a preset reading.
    pub struct FakeCapture {
        pub reading: [i16; WINDOW_LEN],
        pub gains: std::vec::Vec<Gain>,
        pub running: bool,
    }

    impl FakeCapture {
        pub fn new(reading: [i16; WINDOW_LEN]) -> Self {
            Self {
                reading,
                gains: std::vec::Vec::new(),
                running: false,
            }
        }
    }

    impl SampleCapture for FakeCapture {
        fn begin(&mut self, gain: Gain) {
            self.gains.push(gain);
            self.running = true;
        }

        fn finish(&mut self) -> &[i16; WINDOW_LEN] {
            self.running = false;
            &self.reading
        }
    }

    #[test]
    fn negative_readings_are_clamped() {
        let mut reading = [0i16; WINDOW_LEN];
        reading[0] = -40;
        reading[1] = 17;
        reading[199] = 255;
        let mut capture = FakeCapture::new(reading);
        let mut acq = Acquisition::new();

        assert_eq!(acq.start(&mut capture, Gain::X16, 100), StartOutcome::Started);
        let window = acq.complete(&mut capture, 600);
        assert_eq!(window.samples()[0], 0);
        assert_eq!(window.samples()[1], 17);
        assert_eq!(window.samples()[199], 255);
        assert_eq!(acq.capture_us(), 500);
        assert!(!acq.is_busy());
    }

    #[test]
    fn trigger_while_busy_is_skipped() {
        let mut capture = FakeCapture::new([0; WINDOW_LEN]);
        let mut acq = Acquisition::new();
        acq.start(&mut capture, Gain::X2, 1_000);

        assert_eq!(
            acq.start(&mut capture, Gain::X2, 1_300),
            StartOutcome::Skipped { busy_us: 300 }
        );
        assert_eq!(acq.skipped(), 1);
        assert_eq!(capture.gains.len(), 1);

        acq.complete(&mut capture, 1_500);
        assert_eq!(acq.start(&mut capture, Gain::X64, 7_000), StartOutcome::Started);
        assert_eq!(capture.gains, [Gain::X2, Gain::X64]);
    }

    #[test]
    fn window_stays_usable_next_to_bookkeeping() {
        let mut reading = [0i16; WINDOW_LEN];
        reading[10] = 90;
        let mut capture = FakeCapture::new(reading);
        let mut acq = Acquisition::new();

        acq.start(&mut capture, Gain::X4, 2_000);
        let window = acq.complete(&mut capture, 2_450);
        // Reading the timing while the window is still in use
        assert_eq!(acq.capture_us(), 450);
        assert_eq!(window.samples()[10], 90);

        acq.start(&mut capture, Gain::X4, 3_000);
        assert!(acq.is_busy());
        assert_eq!(window.samples()[10], 90);
    }

    #[test]
    fn dropped_windows_are_counted() {
        let mut capture = FakeCapture::new([0; WINDOW_LEN]);
        let mut acq = Acquisition::new();
        acq.start(&mut capture, Gain::X1, 0);
        acq.start(&mut capture, Gain::X1, 100);
        acq.complete(&mut capture, 500);
        acq.record_dropped();

        assert_eq!(acq.skipped(), 2);
        assert!(!acq.is_busy());
    }
}
