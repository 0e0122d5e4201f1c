//! Configuration ladder and selection.
//!
//! Hardware limits on buffer size are discovered by trying candidates in a
//! fixed order, lowest latency first, and keeping the first one whose
//! capture and playback streams both open and start.

use serde::{Deserialize, Serialize};

use crate::engine::backend::StreamBackend;
use crate::error::{log_audio_error, AudioError, ErrorCode};
use crate::telemetry::{MetricEvent, TelemetryCollector};

use super::session::{Session, SessionSettings, StreamPlan};

/// Latency/robustness trade-off of a ladder candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LatencyTier {
    UltraLow,
    Low,
    Standard,
    Conservative,
}

impl LatencyTier {
    pub fn label(&self) -> &'static str {
        match self {
            LatencyTier::UltraLow => "ultra-low",
            LatencyTier::Low => "low",
            LatencyTier::Standard => "standard",
            LatencyTier::Conservative => "conservative",
        }
    }
}

impl std::fmt::Display for LatencyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One candidate configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate_hz: u32,
    pub tier: LatencyTier,
    /// Divides the platform minimum buffer size; always at least 1.
    pub buffer_divisor: usize,
}

impl AudioConfig {
    pub const fn new(sample_rate_hz: u32, tier: LatencyTier, buffer_divisor: usize) -> Self {
        Self {
            sample_rate_hz,
            tier,
            buffer_divisor,
        }
    }

    /// `max(platform_min / divisor, floor)`; never below `floor_frames`.
    pub fn buffer_frames(&self, platform_min_frames: usize, floor_frames: usize) -> usize {
        (platform_min_frames / self.buffer_divisor.max(1)).max(floor_frames)
    }
}

const STANDARD_LADDER: [AudioConfig; 4] = [
    AudioConfig::new(48000, LatencyTier::UltraLow, 4),
    AudioConfig::new(48000, LatencyTier::Low, 2),
    AudioConfig::new(44100, LatencyTier::Standard, 1),
    AudioConfig::new(44100, LatencyTier::Conservative, 1),
];

/// Ordered, immutable candidate list, highest preference first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationLadder {
    candidates: &'static [AudioConfig],
}

impl ConfigurationLadder {
    /// 48 kHz ultra-low → 48 kHz low → 44.1 kHz standard → 44.1 kHz conservative.
    pub const fn standard() -> Self {
        Self {
            candidates: &STANDARD_LADDER,
        }
    }

    pub fn candidates(&self) -> &'static [AudioConfig] {
        self.candidates
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static AudioConfig> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl Default for ConfigurationLadder {
    fn default() -> Self {
        Self::standard()
    }
}

/// Walk the ladder and return the first session that opens.
///
/// Each rejected candidate has already released its streams inside
/// `Session::open`, so nothing is held when this returns an error.
///
/// # Errors
/// `NoValidConfiguration` when every candidate fails.
pub fn select_configuration(
    ladder: &ConfigurationLadder,
    backend: &dyn StreamBackend,
    settings: &SessionSettings,
    telemetry: &TelemetryCollector,
) -> Result<Session, AudioError> {
    let mut attempts = 0;

    for config in ladder.iter() {
        attempts += 1;

        let attempt = StreamPlan::resolve(backend, config, settings.floor_frames).and_then(
            |plan| Session::open(backend, *config, &plan, settings).map(|s| (plan, s)),
        );

        match attempt {
            Ok((plan, session)) => {
                log::info!(
                    "[Ladder] Selected {} @ {} Hz (input {} frames, output {} frames)",
                    config.tier,
                    config.sample_rate_hz,
                    session.input_frames(),
                    session.output_frames()
                );
                telemetry.publish(MetricEvent::ConfigurationAttempt {
                    tier: config.tier,
                    sample_rate_hz: config.sample_rate_hz,
                    buffer_frames: plan.input.buffer_frames,
                    accepted: true,
                    reason: None,
                });
                return Ok(session);
            }
            Err(err) => {
                log::warn!(
                    "[Ladder] {} @ {} Hz rejected ({}): {}",
                    config.tier,
                    config.sample_rate_hz,
                    err.code(),
                    err
                );
                let buffer_frames = backend
                    .min_input_buffer_frames(config.sample_rate_hz)
                    .map(|min| config.buffer_frames(min, settings.floor_frames))
                    .unwrap_or(0);
                telemetry.publish(MetricEvent::ConfigurationAttempt {
                    tier: config.tier,
                    sample_rate_hz: config.sample_rate_hz,
                    buffer_frames,
                    accepted: false,
                    reason: Some(err.to_string()),
                });
            }
        }
    }

    let err = AudioError::NoValidConfiguration { attempts };
    log_audio_error(&err, "select_configuration");
    Err(err)
}
