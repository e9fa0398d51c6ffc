// Hands a packed excerpt of one raw acquisition window from the processing
// interrupt to the main loop, which copies it into the register file.

// Detailed Operation:
// Two buffers alternate. The processing side packs a window into the buffer being
// updated only while nothing is pending, then flips the buffers and marks the
// result pending. The main loop copies the ready buffer out and clears the flag,
// which re-enables the next capture. Only the mirror facet selected by
// `filterPosition % 6` is sampled, so repeated snapshots show the same facet.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

use crate::acquisition::AcquisitionWindow;
use crate::config::FilterWindow;
use crate::registers::SNAPSHOT_WORDS;
use crate::rotation::PULSES_PER_ROTATION;

/// Sample stride between two packed words.
const STRIDE: usize = 8;
/// Offset of the high byte sample inside one stride.
const HIGH_OFFSET: usize = 4;

/// Packs 25 words: `window[8k + 4] << 8 | window[8k]`.
pub fn pack(window: &AcquisitionWindow) -> [u16; SNAPSHOT_WORDS] {
    let samples = window.samples();
    core::array::from_fn(|k| {
        let low = samples[k * STRIDE].min(0xFF);
        let high = samples[k * STRIDE + HIGH_OFFSET].min(0xFF);
        (high << 8) | low
    })
}

/// Double buffer for snapshots.
pub struct SnapshotBuffer {
    /// One buffer being updated, one ready for reading.
    buffers: [[u16; SNAPSHOT_WORDS]; 2],

    /// Index of the buffer written next.
    idx2update: usize,

    /// A snapshot waits for the main loop.
    pending: bool,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self {
            buffers: [[0; SNAPSHOT_WORDS]; 2],
            idx2update: 0,
            pending: false,
        }
    }

    /// Gets the opposite buffer index (if idx=0 return 1, if idx=1 return 0).
    #[inline(always)]
    fn get_opposite(idx: usize) -> usize {
        1 - idx
    }

    /// True when the facet is the selected one and the previous snapshot was taken.
    pub fn wants(&self, facet: u8, filter_position: FilterWindow) -> bool {
        !self.pending && facet as u16 == filter_position.get() % PULSES_PER_ROTATION as u16
    }

    /// Captures `window` if [`wants`](Self::wants) allows it. Returns true when captured.
    pub fn offer(&mut self, facet: u8, filter_position: FilterWindow, window: &AcquisitionWindow) -> bool {
        if !self.wants(facet, filter_position) {
            return false;
        }
        let idx = self.idx2update;
        self.buffers[idx] = pack(window);
        self.idx2update = Self::get_opposite(idx); // Next capture goes to the other buffer
        self.pending = true;
        true
    }

    /// Copies out the pending snapshot and re-arms capturing.
    pub fn take(&mut self) -> Option<[u16; SNAPSHOT_WORDS]> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        Some(self.buffers[Self::get_opposite(self.idx2update)])
    }

    #[inline(always)]
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::WINDOW_LEN;

    fn ramp() -> AcquisitionWindow {
        let mut samples = [0u16; WINDOW_LEN];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = i as u16;
        }
        AcquisitionWindow::from_samples(samples)
    }

    #[test]
    fn packs_two_samples_per_word() {
        let words = pack(&ramp());
        assert_eq!(words[0], 4 << 8);
        assert_eq!(words[1], (12 << 8) | 8);
        assert_eq!(words[24], (196 << 8) | 192);
    }

    #[test]
    fn only_selected_facet_is_captured() {
        let mut buffer = SnapshotBuffer::new();
        let filter = FilterWindow::from_register(8).unwrap();
        assert!(!buffer.offer(0, filter, &ramp()));
        assert!(buffer.offer(2, filter, &ramp()));
        assert!(buffer.is_pending());
    }

    #[test]
    fn next_capture_waits_for_take() {
        let mut buffer = SnapshotBuffer::new();
        let filter = FilterWindow::from_register(0).unwrap();
        assert!(buffer.offer(0, filter, &ramp()));
        assert!(!buffer.offer(0, filter, &AcquisitionWindow::new()));

        assert_eq!(buffer.take().map(|w| w[1]), Some((12 << 8) | 8));
        assert_eq!(buffer.take(), None);

        assert!(buffer.offer(0, filter, &AcquisitionWindow::new()));
        assert_eq!(buffer.take(), Some([0; SNAPSHOT_WORDS]));
    }
}
