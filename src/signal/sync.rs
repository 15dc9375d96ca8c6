//! Two-stage input synchronizer.
//!
//! Every external line is sampled into a 2-bit history once per step:
//! bit 1 holds the previous sample, bit 0 the current one. Edge detection
//! downstream compares the whole history against a fixed pattern, so a
//! raw transition becomes visible to the decoder two steps after it
//! happens.

use serde::{Serialize, Deserialize};

/// Width mask for a 2-deep history.
const HISTORY_MASK: u8 = 0b11;

/// Edge classification of a synchronized history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edge {
    /// Previous low, current high (`0b01`).
    Rising,
    /// Previous high, current low (`0b10`).
    Falling,
    /// Both samples equal.
    Stable,
}

/// The two most recent samples of one external line.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncedSignal {
    history: u8,
}

impl SyncedSignal {
    /// Pattern of a rising edge: previous 0, current 1.
    pub const RISING: u8 = 0b01;
    /// Pattern of a falling edge: previous 1, current 0.
    pub const FALLING: u8 = 0b10;

    /// A history with both samples low.
    pub const fn zero() -> Self {
        Self { history: 0 }
    }

    /// Build from a raw history value, truncated to 2 bits.
    pub const fn from_bits(history: u8) -> Self {
        Self { history: history & HISTORY_MASK }
    }

    /// Shift in a new raw sample, dropping the oldest.
    #[inline]
    pub const fn shifted(self, raw: bool) -> Self {
        Self::from_bits((self.history << 1) | raw as u8)
    }

    /// Raw 2-bit history (bit 1 = previous, bit 0 = current).
    #[inline]
    pub const fn bits(self) -> u8 {
        self.history
    }

    /// The older of the two samples.
    #[inline]
    pub const fn previous(self) -> bool {
        self.history & 0b10 != 0
    }

    /// The newer of the two samples.
    #[inline]
    pub const fn current(self) -> bool {
        self.history & 0b01 != 0
    }

    #[inline]
    pub const fn is_rising(self) -> bool {
        self.history == Self::RISING
    }

    #[inline]
    pub const fn is_falling(self) -> bool {
        self.history == Self::FALLING
    }

    pub fn edge(self) -> Edge {
        match self.history {
            Self::RISING => Edge::Rising,
            Self::FALLING => Edge::Falling,
            _ => Edge::Stable,
        }
    }
}

impl std::fmt::Debug for SyncedSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02b}", self.history)
    }
}

/// Synchronized histories for the three serial lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Synchronizer {
    /// Serial data (COPI).
    pub data: SyncedSignal,
    /// Active-low chip-select (nCS).
    pub select: SyncedSignal,
    /// Serial clock (SCLK).
    pub clock: SyncedSignal,
}

impl Synchronizer {
    pub const fn new() -> Self {
        Self {
            data: SyncedSignal::zero(),
            select: SyncedSignal::zero(),
            clock: SyncedSignal::zero(),
        }
    }

    /// Next histories after sampling one set of raw levels.
    ///
    /// This is the only place raw pin levels are read.
    pub const fn sampled(self, data: bool, select: bool, clock: bool) -> Self {
        Self {
            data: self.data.shifted(data),
            select: self.select.shifted(select),
            clock: self.clock.shifted(clock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_shifts_and_truncates() {
        let s = SyncedSignal::zero().shifted(true);
        assert_eq!(s.bits(), 0b01);
        let s = s.shifted(true);
        assert_eq!(s.bits(), 0b11);
        let s = s.shifted(false);
        assert_eq!(s.bits(), 0b10);
        assert!(s.previous());
        assert!(!s.current());
    }

    #[test]
    fn test_edge_patterns() {
        assert_eq!(SyncedSignal::from_bits(0b01).edge(), Edge::Rising);
        assert_eq!(SyncedSignal::from_bits(0b10).edge(), Edge::Falling);
        assert_eq!(SyncedSignal::from_bits(0b00).edge(), Edge::Stable);
        assert_eq!(SyncedSignal::from_bits(0b11).edge(), Edge::Stable);
        assert_eq!(SyncedSignal::from_bits(0b110).bits(), 0b10);
    }

    #[test]
    fn test_two_step_latency() {
        // A single high pulse shows up as rising then falling.
        let mut sync = Synchronizer::new();
        sync = sync.sampled(false, false, true);
        assert!(sync.clock.is_rising());
        sync = sync.sampled(false, false, false);
        assert!(sync.clock.is_falling());
        sync = sync.sampled(false, false, false);
        assert_eq!(sync.clock.edge(), Edge::Stable);
    }
}
