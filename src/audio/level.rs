//! Input level metering.
//!
//! The passthrough loop publishes the RMS of every captured chunk into a
//! `LevelMeter`; queries read it without locking.

use std::sync::atomic::{AtomicU32, Ordering};

/// Level reported while monitoring with metering disabled.
pub const UNMETERED_LEVEL: f32 = 0.5;

/// Level reported while idle.
pub const SILENT_LEVEL: f32 = 0.0;

/// Lock-free holder of the most recent level (f32 bits).
#[derive(Debug)]
pub struct LevelMeter {
    bits: AtomicU32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(SILENT_LEVEL.to_bits()),
        }
    }

    /// Record the level of a captured chunk.
    pub fn observe(&self, samples: &[i16]) {
        self.bits
            .store(rms_level(samples).to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.bits.store(SILENT_LEVEL.to_bits(), Ordering::Relaxed);
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// RMS of 16-bit samples normalised to `[0.0, 1.0]`.
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return SILENT_LEVEL;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / 32768.0;
            v * v
        })
        .sum();

    ((sum_squares / samples.len() as f64).sqrt() as f32).clamp(0.0, 1.0)
}
