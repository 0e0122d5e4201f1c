//! End-to-end latency estimate.
//!
//! The estimate is the capture buffer duration plus the playback buffer
//! duration plus a fixed processing overhead, all in milliseconds. It is a
//! model of the chosen configuration, not a measurement.

use serde::{Deserialize, Serialize};

/// Latency reported while no session is active.
pub const NOT_MONITORING_MS: f64 = 0.0;

/// Per-stage breakdown of the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyEstimate {
    pub input_ms: f64,
    pub output_ms: f64,
    pub overhead_ms: f64,
    pub total_ms: f64,
}

impl LatencyEstimate {
    /// Build an estimate from the buffer sizes in effect.
    ///
    /// # Arguments
    /// * `sample_rate_hz` - Session sample rate (must be non-zero)
    /// * `input_frames` - Capture buffer size in frames
    /// * `output_frames` - Playback buffer size in frames
    /// * `overhead_ms` - Fixed processing overhead
    pub fn from_frames(
        sample_rate_hz: u32,
        input_frames: usize,
        output_frames: usize,
        overhead_ms: f64,
    ) -> Self {
        let input_ms = frames_to_ms(input_frames, sample_rate_hz);
        let output_ms = frames_to_ms(output_frames, sample_rate_hz);
        Self {
            input_ms,
            output_ms,
            overhead_ms,
            total_ms: input_ms + output_ms + overhead_ms,
        }
    }
}

/// Duration of `frames` at `sample_rate_hz`, in milliseconds.
pub fn frames_to_ms(frames: usize, sample_rate_hz: u32) -> f64 {
    if sample_rate_hz == 0 {
        return 0.0;
    }
    frames as f64 * 1000.0 / sample_rate_hz as f64
}
