// Debounce of a boolean input with separate on and off intervals.

// Detailed Operation:
// The instant the raw input last changed is remembered. The output follows the
// input once the input has stayed at the new level for at least the interval
// of that direction (`on_ms` to switch on, `off_ms` to switch off). A zero
// interval switches in the same call.

// Licensed under the Apache License, Version 2.0
// Copyright 2026 hmdscan contributors

/// Output change reported by one filter update.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    None,
    Rose,
    Fell,
}

pub struct FilterDebounce {
    on_ms: u16,
    off_ms: u16,
    state: bool,     // Debounced output
    candidate: bool, // Last raw input
    since_ms: u32,   // Time of the last raw input change
}

impl FilterDebounce {
    pub fn new(on_ms: u16, off_ms: u16) -> Self {
        Self {
            on_ms,
            off_ms,
            state: false,
            candidate: false,
            since_ms: 0,
        }
    }

    /// Feeds the raw input sampled at `now_ms` (wrapping millisecond clock).
    pub fn tick(&mut self, input: bool, now_ms: u32) -> Edge {
        if input != self.candidate {
            self.candidate = input;
            self.since_ms = now_ms;
        }

        if self.candidate == self.state {
            return Edge::None;
        }

        let interval = if self.candidate { self.on_ms } else { self.off_ms };
        if now_ms.wrapping_sub(self.since_ms) >= interval as u32 {
            self.set(self.candidate)
        } else {
            Edge::None
        }
    }

    /// Sets the output directly, bypassing the intervals.
    pub fn force(&mut self, state: bool, now_ms: u32) -> Edge {
        self.candidate = state;
        self.since_ms = now_ms;
        self.set(state)
    }

    fn set(&mut self, state: bool) -> Edge {
        if state == self.state {
            return Edge::None;
        }
        self.state = state;
        if state {
            Edge::Rose
        } else {
            Edge::Fell
        }
    }

    pub fn set_intervals(&mut self, on_ms: u16, off_ms: u16) {
        self.on_ms = on_ms;
        self.off_ms = off_ms;
    }

    #[inline(always)]
    pub fn state(&self) -> bool {
        self.state
    }
}
