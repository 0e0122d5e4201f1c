// Public API for flutter_rust_bridge integration
// This module provides the FFI surface through which Flutter drives the
// monitoring engine

#![allow(dead_code)] // FFI functions are called from Dart, not detected by Rust analyzer

pub mod dispatch;

use anyhow::Result;
use flutter_rust_bridge::frb;
use futures::Stream;

use crate::engine::EngineHandle;
use crate::error::AudioError;
use crate::telemetry::MetricEvent;

// Re-export error code constants for FFI exposure
pub use crate::error::AudioErrorCodes;
pub use dispatch::MethodResponse;

/// Audio monitoring engine owned by one hosting view.
///
/// Create one per view/activity and call `detach` (or drop it) when the
/// view goes away; no audio resource outlives this object.
#[frb(opaque)]
pub struct AudioMonitoring {
    engine: EngineHandle,
}

impl AudioMonitoring {
    /// Create an engine with the platform backend and configuration.
    #[frb(sync)]
    pub fn new() -> Self {
        crate::init_logging();
        Self {
            engine: EngineHandle::new(),
        }
    }

    /// Start microphone-to-speaker monitoring
    ///
    /// # Returns
    /// * `Ok(true)` - Monitoring is running (also when it already was)
    ///
    /// # Errors
    /// - `PermissionDenied` - RECORD_AUDIO not granted; no stream was opened
    /// - `NoValidConfiguration` - every ladder candidate failed to open
    pub fn start_monitoring(&self) -> Result<bool, AudioError> {
        self.engine.start().map(|_| true)
    }

    /// Stop monitoring. Always succeeds; cleanup errors are only logged.
    pub fn stop_monitoring(&self) -> Result<bool, AudioError> {
        self.engine.stop();
        Ok(true)
    }

    #[frb(sync)]
    pub fn is_monitoring(&self) -> bool {
        self.engine.is_monitoring()
    }

    /// Set output volume; any finite value is accepted and clamped to 0.0–1.0.
    ///
    /// # Errors
    /// - `InvalidArguments` - volume is NaN
    #[frb(sync)]
    pub fn set_monitoring_volume(&self, volume: f64) -> Result<bool, AudioError> {
        self.engine.set_volume(volume).map(|_| true)
    }

    /// Current input level (0.0–1.0); 0.0 when not monitoring.
    #[frb(sync)]
    pub fn get_audio_level(&self) -> f64 {
        self.engine.audio_level()
    }

    /// Estimated end-to-end latency in milliseconds; 0.0 when not monitoring.
    #[frb(sync)]
    pub fn get_latency(&self) -> f64 {
        self.engine.latency_ms()
    }

    /// Forced teardown for the lifecycle owner.
    pub fn detach(&self) {
        self.engine.detach();
    }

    /// Method-channel entry point: `arguments_json` is a JSON object (or
    /// empty), the result is a JSON `MethodResponse`.
    #[frb(sync)]
    pub fn handle_method_call(&self, method: String, arguments_json: String) -> String {
        dispatch::dispatch_json(&self.engine, &method, &arguments_json).to_json()
    }

    /// Recent telemetry as JSON for debug overlays.
    #[frb(sync)]
    pub fn telemetry_snapshot_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.engine.telemetry_snapshot())?)
    }

    /// Telemetry events published from now on.
    #[frb(ignore)]
    pub fn telemetry_stream(&self) -> impl Stream<Item = MetricEvent> {
        self.engine.telemetry_stream()
    }

    #[frb(ignore)]
    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }
}

/// Get the version of the audio monitoring engine
#[frb(sync)]
pub fn get_version() -> Result<String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

/// Get AudioErrorCodes as a structured object with all error code constants
#[frb(sync)]
pub fn get_audio_error_codes() -> AudioErrorCodes {
    AudioErrorCodes {}
}
