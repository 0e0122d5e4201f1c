//! Core telemetry event types describing engine activity exposed to the
//! CLI and flutter_rust_bridge streams.

use serde::{Deserialize, Serialize};

use crate::audio::LatencyTier;

/// High-level lifecycle stages reported by engine instrumentation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    PermissionsGranted,
    PermissionsDenied,
    EngineAttached,
    EngineDetached,
}

/// Why a monitoring session ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Requested,
    Detached,
    StreamFault,
}

/// Metric events covering ladder negotiation, session lifecycle and errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    ConfigurationAttempt {
        tier: LatencyTier,
        sample_rate_hz: u32,
        buffer_frames: usize,
        accepted: bool,
        reason: Option<String>,
    },
    MonitoringStarted {
        tier: LatencyTier,
        sample_rate_hz: u32,
        input_frames: usize,
        output_frames: usize,
        latency_ms: f64,
    },
    MonitoringStopped {
        reason: StopReason,
    },
    VolumeChanged {
        volume: f32,
    },
    Lifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
    Error {
        code: i32,
        context: String,
    },
}
