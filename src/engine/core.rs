//! EngineHandle: explicitly owned monitoring engine.
//!
//! One handle is created per hosting view and passed by reference to the
//! command-dispatch glue. It wires the platform backend, the permission
//! provider, the `MonitorManager` state machine and the telemetry collector.
//! Dropping the handle detaches it, releasing any open streams.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::Stream;

use crate::audio::{AudioConfig, LatencyEstimate};
use crate::config::AppConfig;
use crate::engine::backend::{
    default_backend, default_permissions, PermissionProvider, PermissionStatus, StreamBackend,
};
use crate::error::{log_audio_error, AudioError};
use crate::managers::{EngineState, MonitorManager};
use crate::telemetry::{LifecyclePhase, MetricEvent, TelemetryCollector, TelemetrySnapshot};

pub struct EngineHandle {
    config: AppConfig,
    permissions: Arc<dyn PermissionProvider>,
    manager: MonitorManager,
    telemetry: Arc<TelemetryCollector>,
}

impl EngineHandle {
    /// Create an engine with the platform config, backend and permissions.
    pub fn new() -> Self {
        Self::with_backend(
            Self::load_platform_config(),
            default_backend(),
            default_permissions(),
        )
    }

    /// Create an engine around explicit collaborators (tests, CLI).
    pub fn with_backend(
        config: AppConfig,
        backend: Arc<dyn StreamBackend>,
        permissions: Arc<dyn PermissionProvider>,
    ) -> Self {
        let telemetry = Arc::new(TelemetryCollector::from_config(&config.telemetry));
        let manager = MonitorManager::new(backend, config.monitor.clone(), Arc::clone(&telemetry));
        telemetry.record_lifecycle(LifecyclePhase::EngineAttached);

        Self {
            config,
            permissions,
            manager,
            telemetry,
        }
    }

    fn load_platform_config() -> AppConfig {
        #[cfg(target_os = "android")]
        {
            AppConfig::load_android()
        }

        #[cfg(target_os = "ios")]
        {
            AppConfig::load_ios()
        }

        #[cfg(not(any(target_os = "android", target_os = "ios")))]
        {
            AppConfig::load()
        }
    }

    /// Start monitoring.
    ///
    /// Already monitoring is a success without side effects. The
    /// microphone permission is checked before the ladder is touched.
    ///
    /// # Errors
    /// - `PermissionDenied` when the microphone permission is not granted
    /// - `NoValidConfiguration` when no ladder candidate opens
    /// - JNI/context errors from the permission query on Android
    pub fn start(&self) -> Result<(), AudioError> {
        if self.manager.is_monitoring() {
            return Ok(());
        }

        match self.permissions.record_permission() {
            Ok(PermissionStatus::Granted) => {
                self.telemetry
                    .record_lifecycle(LifecyclePhase::PermissionsGranted);
            }
            Ok(PermissionStatus::Denied) => {
                let err = AudioError::PermissionDenied;
                log_audio_error(&err, "start");
                self.telemetry
                    .record_lifecycle(LifecyclePhase::PermissionsDenied);
                self.telemetry.record_error(&err, "start");
                return Err(err);
            }
            Err(err) => {
                log_audio_error(&err, "record_permission");
                self.telemetry.record_error(&err, "record_permission");
                return Err(err);
            }
        }

        self.manager.start()
    }

    /// Stop monitoring; a no-op when idle.
    pub fn stop(&self) {
        self.manager.stop();
    }

    /// Forced teardown by the lifecycle owner. The engine stays usable.
    pub fn detach(&self) {
        self.manager.detach();
        self.telemetry
            .record_lifecycle(LifecyclePhase::EngineDetached);
    }

    pub fn is_monitoring(&self) -> bool {
        self.manager.is_monitoring()
    }

    /// # Errors
    /// `InvalidArguments` for NaN
    pub fn set_volume(&self, volume: f64) -> Result<f64, AudioError> {
        self.manager
            .set_volume(volume as f32)
            .map(f64::from)
    }

    pub fn volume(&self) -> f64 {
        f64::from(self.manager.volume())
    }

    pub fn audio_level(&self) -> f64 {
        f64::from(self.manager.level())
    }

    pub fn latency_ms(&self) -> f64 {
        self.manager.latency_ms()
    }

    pub fn latency_estimate(&self) -> Option<LatencyEstimate> {
        self.manager.latency_estimate()
    }

    pub fn state(&self) -> EngineState {
        self.manager.state()
    }

    pub fn active_config(&self) -> Option<AudioConfig> {
        self.manager.active_config()
    }

    pub fn config_snapshot(&self) -> AppConfig {
        self.config.clone()
    }

    pub fn telemetry(&self) -> Arc<TelemetryCollector> {
        Arc::clone(&self.telemetry)
    }

    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<MetricEvent> {
        self.telemetry.subscribe()
    }

    pub fn telemetry_stream(&self) -> impl Stream<Item = MetricEvent> {
        self.telemetry.stream()
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.manager.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::{MockBackend, MockPermissions};

    fn engine(backend: &MockBackend, permissions: MockPermissions) -> EngineHandle {
        EngineHandle::with_backend(
            AppConfig::default(),
            Arc::new(backend.clone()),
            Arc::new(permissions),
        )
    }

    #[test]
    fn test_permission_denied_skips_ladder() {
        let backend = MockBackend::new();
        let engine = engine(&backend, MockPermissions::denied());

        assert_eq!(engine.start(), Err(AudioError::PermissionDenied));
        assert_eq!(backend.attempts(), 0);
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_start_while_monitoring_skips_permission_check() {
        let backend = MockBackend::new();
        let permissions = Arc::new(MockPermissions::granted());
        let engine = EngineHandle::with_backend(
            AppConfig::default(),
            Arc::new(backend.clone()),
            Arc::clone(&permissions) as Arc<dyn PermissionProvider>,
        );

        engine.start().unwrap();
        engine.start().unwrap();
        assert_eq!(permissions.checks(), 1);
        assert_eq!(backend.attempts(), 1);
    }

    #[test]
    fn test_drop_releases_streams() {
        let backend = MockBackend::new();
        {
            let engine = engine(&backend, MockPermissions::granted());
            engine.start().unwrap();
            assert_eq!(backend.open_handles(), 2);
        }
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_detach_keeps_engine_reusable() {
        let backend = MockBackend::new();
        let engine = engine(&backend, MockPermissions::granted());

        engine.start().unwrap();
        engine.detach();
        assert!(!engine.is_monitoring());
        assert_eq!(backend.open_handles(), 0);

        engine.start().unwrap();
        assert!(engine.is_monitoring());
    }

    #[test]
    fn test_lifecycle_events_recorded() {
        let backend = MockBackend::new();
        let engine = engine(&backend, MockPermissions::granted());
        engine.start().unwrap();
        engine.stop();

        let phases: Vec<LifecyclePhase> = engine
            .telemetry_snapshot()
            .recent
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::Lifecycle { phase, .. } => Some(phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                LifecyclePhase::EngineAttached,
                LifecyclePhase::PermissionsGranted
            ]
        );
    }
}
