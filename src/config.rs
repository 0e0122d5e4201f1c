//! Configuration management for engine tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration without recompilation. Buffer floors, latency
//! overhead and teardown timeouts can be adjusted via the config file.
//! Every field has a default, so partial files are accepted.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitor: MonitorConfig,
    pub telemetry: TelemetryConfig,
}

/// Monitoring engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Minimum buffer size in frames regardless of ladder divisor
    pub floor_frames: usize,
    /// Fixed scheduling/transfer overhead added to latency estimates
    pub processing_overhead_ms: f64,
    /// Upper bound on a single blocking input read
    pub read_timeout_ms: u64,
    /// Upper bound on waiting for the passthrough thread during stop
    pub stop_timeout_ms: u64,
    /// Volume applied to a new session when none was requested yet
    pub initial_volume: f32,
    /// Compute RMS level from captured chunks
    pub level_metering: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            floor_frames: 1024,
            processing_overhead_ms: 2.0,
            read_timeout_ms: 20,
            stop_timeout_ms: 500,
            initial_volume: 1.0,
            level_metering: true,
        }
    }
}

impl MonitorConfig {
    /// Profile for the iOS direct path: the audio session runs a 5 ms IO
    /// buffer, so requests only need to stay above 256 frames and the fixed
    /// overhead is 1 ms.
    pub fn ios_direct_path() -> Self {
        Self {
            floor_frames: 256,
            processing_overhead_ms: 1.0,
            ..Self::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Telemetry channel sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Broadcast channel capacity (lagging subscribers drop events)
    pub channel_capacity: usize,
    /// Number of recent events retained for snapshots
    pub history_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            history_capacity: 64,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// Loaded configuration, or the defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration on Android
    ///
    /// Flutter assets live inside the APK and are only reachable through the
    /// AssetManager, so the defaults are used.
    #[cfg(target_os = "android")]
    pub fn load_android() -> Self {
        log::info!("[Config] Using default configuration on Android");
        Self::default()
    }

    /// Load configuration on iOS
    ///
    /// Like Android, assets are bundled with the app; the direct-path
    /// profile is used.
    #[cfg(target_os = "ios")]
    pub fn load_ios() -> Self {
        log::info!("[Config] Using iOS direct-path configuration");
        Self {
            monitor: MonitorConfig::ios_direct_path(),
            ..Self::default()
        }
    }

    /// Load configuration for desktop platforms
    #[cfg(not(any(target_os = "android", target_os = "ios")))]
    pub fn load() -> Self {
        Self::load_from_file("assets/monitor_config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.monitor.floor_frames, 1024);
        assert_eq!(config.monitor.processing_overhead_ms, 2.0);
        assert_eq!(config.monitor.stop_timeout(), Duration::from_millis(500));
        assert_eq!(config.telemetry.history_capacity, 64);
    }

    #[test]
    fn test_ios_profile_lowers_floor() {
        let monitor = MonitorConfig::ios_direct_path();
        assert_eq!(monitor.floor_frames, 256);
        assert_eq!(monitor.processing_overhead_ms, 1.0);
        assert_eq!(monitor.stop_timeout_ms, 500);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "monitor": { "floor_frames": 256 } }"#).unwrap();

        assert_eq!(parsed.monitor.floor_frames, 256);
        assert_eq!(parsed.monitor.read_timeout_ms, 20);
        assert!(parsed.monitor.level_metering);
        assert_eq!(parsed.telemetry.channel_capacity, 64);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from_file("/nonexistent/monitor_config.json");
        assert_eq!(config.monitor.floor_frames, 1024);
    }

    #[test]
    fn test_invalid_json_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!(
            "monitor-config-invalid-{}.json",
            std::process::id()
        ));
        fs::write(&path, "{ not json").unwrap();

        let config = AppConfig::load_from_file(&path);
        assert_eq!(config.monitor.stop_timeout_ms, 500);

        let _ = fs::remove_file(&path);
    }
}
