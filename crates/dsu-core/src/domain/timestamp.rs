//! Reconstruction of a 64-bit motion timestamp from a wrapping hardware
//! counter.
//!
//! Motion sensors report `MSC_TIMESTAMP` as a 32-bit microsecond counter that
//! overflows roughly every 71 minutes, and its value is delivered through a
//! signed 32-bit field, so half-way through the range it also appears to go
//! negative.  Clients expect a monotonic 64-bit microsecond timestamp.
//!
//! The accumulator therefore works in units of 2^31: whenever the low 31 bits
//! of a new sample are numerically behind the low 31 bits seen last time, one
//! wrap unit has passed.  Because 2^32 is a multiple of 2^31, both the
//! sign flip and the real overflow are caught.  The only assumption is that
//! samples arrive more often than once every 2^31 µs (about 35 minutes),
//! which any streaming sensor satisfies.

/// One wrap unit of the low-bit window.
pub const WRAP_UNIT: u64 = 1 << 31;

const LOW_MASK: u64 = WRAP_UNIT - 1;

/// Monotonic 64-bit timestamp rebuilt from 32-bit samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WrappingTimestamp {
    value: u64,
}

impl WrappingTimestamp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current reconstructed value in microseconds.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Forgets all history, e.g. when a new device is bound.
    pub fn reset(&mut self) {
        self.value = 0;
    }

    /// Overwrites the value with an externally derived timestamp.
    ///
    /// Used when the device has no hardware counter and the wall-clock time of
    /// the sync event stands in for it.
    pub fn set(&mut self, value: u64) {
        self.value = value;
    }

    /// Merges a new hardware sample and returns the reconstructed value.
    pub fn merge(&mut self, sample: u32) -> u64 {
        let sample_low = u64::from(sample) & LOW_MASK;
        if sample_low < self.value & LOW_MASK {
            self.value += WRAP_UNIT;
        }

        self.value = if self.value < WRAP_UNIT {
            // Still inside the first window: the raw sample is exact.
            u64::from(sample)
        } else {
            (self.value & !LOW_MASK) | sample_low
        };
        self.value
    }
}
