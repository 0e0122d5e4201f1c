// MonitorManager: engine controller state machine
//
// Single Responsibility: owns the one permitted Session and sequences
// start/stop/detach transitions around it. Control calls serialize on one
// mutex; the passthrough thread never takes it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::audio::{
    select_configuration, AudioConfig, ConfigurationLadder, LatencyEstimate, LoopOutcome,
    Session, SessionSettings, NOT_MONITORING_MS, SILENT_LEVEL,
};
use crate::config::MonitorConfig;
use crate::engine::backend::StreamBackend;
use crate::error::{log_audio_error, AudioError};
use crate::telemetry::{MetricEvent, StopReason, TelemetryCollector};

/// Controller states. A session exists iff `Monitoring` or `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Starting,
    Monitoring,
    Stopping,
}

struct MonitorState {
    state: EngineState,
    session: Option<Session>,
    /// A stopped session whose loop outlived the stop timeout. It still owns
    /// its stream pair, so no new session may open until it is settled.
    draining: Option<Session>,
    /// Remembered across sessions; applied when the next one opens.
    volume: f32,
}

/// Manages the monitoring session lifecycle
///
/// This manager handles:
/// - Ladder selection on start (idempotent while monitoring)
/// - Unconditional teardown on stop and detach
/// - Reaping sessions whose passthrough loop faulted
/// - Volume, level and latency queries against the live session
pub struct MonitorManager {
    inner: Mutex<MonitorState>,
    backend: Arc<dyn StreamBackend>,
    ladder: ConfigurationLadder,
    config: MonitorConfig,
    telemetry: Arc<TelemetryCollector>,
}

impl MonitorManager {
    pub fn new(
        backend: Arc<dyn StreamBackend>,
        config: MonitorConfig,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        Self::with_ladder(backend, ConfigurationLadder::standard(), config, telemetry)
    }

    pub fn with_ladder(
        backend: Arc<dyn StreamBackend>,
        ladder: ConfigurationLadder,
        config: MonitorConfig,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        let volume = clamp_volume(config.initial_volume);
        Self {
            inner: Mutex::new(MonitorState {
                state: EngineState::Idle,
                session: None,
                draining: None,
                volume,
            }),
            backend,
            ladder,
            config,
            telemetry,
        }
    }

    /// Start monitoring on the first ladder candidate that opens.
    ///
    /// A start while already monitoring succeeds without reopening anything.
    ///
    /// # Errors
    /// - `NoValidConfiguration` when every candidate fails (state returns to Idle)
    /// - `StreamFailure` when the previous session still holds its streams
    /// - `LockPoisoned` when a previous control call panicked
    pub fn start(&self) -> Result<(), AudioError> {
        let mut guard = self.lock_state()?;
        self.reap_faulted(&mut guard);

        if guard.session.is_some() {
            log::debug!("[MonitorManager] Start ignored, already monitoring");
            return Ok(());
        }

        if let Err(err) = self.settle_draining(&mut guard) {
            self.telemetry.record_error(&err, "start");
            return Err(err);
        }

        guard.state = EngineState::Starting;
        let settings = SessionSettings::from_config(&self.config, guard.volume);

        match select_configuration(
            &self.ladder,
            self.backend.as_ref(),
            &settings,
            &self.telemetry,
        ) {
            Ok(session) => {
                let config = session.config();
                let latency = session.latency(self.config.processing_overhead_ms);
                self.telemetry.publish(MetricEvent::MonitoringStarted {
                    tier: config.tier,
                    sample_rate_hz: config.sample_rate_hz,
                    input_frames: session.input_frames(),
                    output_frames: session.output_frames(),
                    latency_ms: latency.total_ms,
                });
                log::info!(
                    "[MonitorManager] Monitoring on {} backend, estimated latency {:.2} ms",
                    self.backend.name(),
                    latency.total_ms
                );
                guard.session = Some(session);
                guard.state = EngineState::Monitoring;
                Ok(())
            }
            Err(err) => {
                guard.state = EngineState::Idle;
                self.telemetry.record_error(&err, "start");
                Err(err)
            }
        }
    }

    /// Stop monitoring. A stop while idle is a no-op.
    pub fn stop(&self) {
        self.teardown(StopReason::Requested);
    }

    /// Forced teardown from any state, used when the host view goes away.
    pub fn detach(&self) {
        self.teardown(StopReason::Detached);
    }

    /// Clamp to `[0.0, 1.0]`, remember it and apply it to the live session.
    ///
    /// # Returns
    /// The clamped volume actually stored
    ///
    /// # Errors
    /// `InvalidArguments` for NaN
    pub fn set_volume(&self, volume: f32) -> Result<f32, AudioError> {
        if volume.is_nan() {
            let err = AudioError::InvalidArguments {
                reason: "volume must be a number".to_string(),
            };
            log_audio_error(&err, "set_volume");
            return Err(err);
        }

        let volume = clamp_volume(volume);
        let mut guard = self.lock_state_recovering();
        guard.volume = volume;
        if let Some(session) = guard.session.as_ref() {
            session.set_volume(volume);
        }
        drop(guard);

        self.telemetry
            .publish(MetricEvent::VolumeChanged { volume });
        Ok(volume)
    }

    pub fn volume(&self) -> f32 {
        self.lock_state_recovering().volume
    }

    /// Whether a session is live. Reaps a session whose loop faulted.
    pub fn is_monitoring(&self) -> bool {
        let mut guard = self.lock_state_recovering();
        self.reap_faulted(&mut guard);
        guard
            .session
            .as_ref()
            .is_some_and(|session| session.is_running())
    }

    pub fn state(&self) -> EngineState {
        self.lock_state_recovering().state
    }

    /// Current input level in `[0.0, 1.0]`; 0.0 when not monitoring.
    pub fn level(&self) -> f32 {
        self.with_live_session(|session| session.level())
            .unwrap_or(SILENT_LEVEL)
    }

    pub fn latency_estimate(&self) -> Option<LatencyEstimate> {
        let overhead_ms = self.config.processing_overhead_ms;
        self.with_live_session(|session| session.latency(overhead_ms))
    }

    /// Estimated latency in ms, `NOT_MONITORING_MS` without a session.
    pub fn latency_ms(&self) -> f64 {
        self.latency_estimate()
            .map_or(NOT_MONITORING_MS, |estimate| estimate.total_ms)
    }

    pub fn active_config(&self) -> Option<AudioConfig> {
        self.with_live_session(|session| session.config())
    }

    // ========================================================================
    // PRIVATE HELPER METHODS
    // ========================================================================

    fn with_live_session<T>(&self, f: impl FnOnce(&Session) -> T) -> Option<T> {
        let guard = self.lock_state_recovering();
        guard
            .session
            .as_ref()
            .filter(|session| session.is_running())
            .map(f)
    }

    fn teardown(&self, reason: StopReason) {
        // Teardown must run even after a panic elsewhere.
        let mut guard = self.lock_state_recovering();

        let Some(mut session) = guard.session.take() else {
            guard.state = EngineState::Idle;
            return;
        };

        guard.state = EngineState::Stopping;
        match session.close() {
            Some(LoopOutcome::Faulted(err)) => {
                log_audio_error(&err, "teardown");
            }
            Some(LoopOutcome::Stopped) => {}
            None => {
                log::warn!("[MonitorManager] Passthrough loop still draining after stop");
                guard.draining = Some(session);
            }
        }
        guard.state = EngineState::Idle;
        drop(guard);

        log::info!("[MonitorManager] Monitoring stopped ({:?})", reason);
        self.telemetry
            .publish(MetricEvent::MonitoringStopped { reason });
    }

    /// Give a draining session one more bounded wait to release its streams.
    fn settle_draining(&self, guard: &mut MonitorState) -> Result<(), AudioError> {
        let Some(session) = guard.draining.as_mut() else {
            return Ok(());
        };

        if let Some(LoopOutcome::Faulted(err)) = session.close() {
            log_audio_error(&err, "settle_draining");
        }
        if session.is_draining() {
            return Err(AudioError::StreamFailure {
                reason: "previous session is still releasing its streams".to_string(),
            });
        }

        guard.draining = None;
        log::info!("[MonitorManager] Draining session released");
        Ok(())
    }

    /// Close a session whose loop exited on its own and return to Idle.
    fn reap_faulted(&self, guard: &mut MonitorState) {
        if !guard.session.as_ref().is_some_and(|s| s.is_faulted()) {
            return;
        }

        if let Some(mut session) = guard.session.take() {
            guard.state = EngineState::Stopping;
            if let Some(LoopOutcome::Faulted(err)) = session.close() {
                self.telemetry.record_error(&err, "passthrough_loop");
            }
            guard.state = EngineState::Idle;
            log::warn!("[MonitorManager] Reaped faulted session");
            self.telemetry.publish(MetricEvent::MonitoringStopped {
                reason: StopReason::StreamFault,
            });
        }
    }

    /// Safely acquire lock on controller state
    ///
    /// # Returns
    /// * `Ok(MutexGuard)` - Lock acquired successfully
    /// * `Err(AudioError::LockPoisoned)` - Lock is poisoned
    fn lock_state(&self) -> Result<MutexGuard<'_, MonitorState>, AudioError> {
        self.inner.lock().map_err(|_| {
            let err = AudioError::LockPoisoned {
                component: "monitor_state".to_string(),
            };
            log_audio_error(&err, "lock_state");
            err
        })
    }

    fn lock_state_recovering(&self) -> MutexGuard<'_, MonitorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        1.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::LatencyTier;
    use crate::engine::backend::{FailPoint, MockBackend};
    use std::thread;
    use std::time::{Duration, Instant};

    fn manager(backend: &MockBackend) -> MonitorManager {
        MonitorManager::new(
            Arc::new(backend.clone()),
            MonitorConfig::default(),
            Arc::new(TelemetryCollector::default()),
        )
    }

    #[test]
    fn test_new_manager_is_idle() {
        let manager = manager(&MockBackend::new());
        assert_eq!(manager.state(), EngineState::Idle);
        assert!(!manager.is_monitoring());
        assert_eq!(manager.latency_ms(), NOT_MONITORING_MS);
        assert_eq!(manager.level(), SILENT_LEVEL);
    }

    #[test]
    fn test_start_stop_cycle() {
        let backend = MockBackend::new();
        let manager = manager(&backend);

        manager.start().unwrap();
        assert_eq!(manager.state(), EngineState::Monitoring);
        assert!(manager.is_monitoring());
        assert_eq!(
            manager.active_config().map(|c| c.tier),
            Some(LatencyTier::UltraLow)
        );

        manager.stop();
        assert_eq!(manager.state(), EngineState::Idle);
        assert!(!manager.is_monitoring());
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_start_is_idempotent() {
        let backend = MockBackend::new();
        let manager = manager(&backend);

        manager.start().unwrap();
        manager.start().unwrap();
        assert_eq!(backend.attempts(), 1);
        assert_eq!(backend.open_handles(), 2);
        manager.stop();
    }

    #[test]
    fn test_stop_while_idle_is_noop() {
        let manager = manager(&MockBackend::new());
        manager.stop();
        manager.detach();
        assert_eq!(manager.state(), EngineState::Idle);
    }

    #[test]
    fn test_failed_start_returns_to_idle() {
        let backend = MockBackend::new().failing_always(FailPoint::InputOpen);
        let manager = manager(&backend);

        assert!(matches!(
            manager.start(),
            Err(AudioError::NoValidConfiguration { attempts: 4 })
        ));
        assert_eq!(manager.state(), EngineState::Idle);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_volume_clamped_and_remembered_while_idle() {
        let backend = MockBackend::new();
        let manager = manager(&backend);

        assert_eq!(manager.set_volume(1.5).unwrap(), 1.0);
        assert_eq!(manager.set_volume(0.3).unwrap(), 0.3);
        assert!(manager.set_volume(f32::NAN).is_err());
        assert_eq!(manager.volume(), 0.3);

        manager.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        while backend.applied_volume().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(backend.applied_volume(), Some(0.3));
        manager.stop();
    }

    #[test]
    fn test_latency_reflects_selected_configuration() {
        let backend = MockBackend::with_min_buffer(8192, 8192);
        let manager = manager(&backend);
        manager.start().unwrap();

        // 8192 / 4 = 2048 frames each way at 48 kHz, plus 2 ms.
        let expected = 2048.0 * 2.0 * 1000.0 / 48000.0 + 2.0;
        assert!((manager.latency_ms() - expected).abs() < 1e-9);

        manager.stop();
        assert_eq!(manager.latency_ms(), NOT_MONITORING_MS);
    }

    #[test]
    fn test_restart_waits_for_draining_session() {
        let backend = MockBackend::new().with_read_delay(Duration::from_millis(150));
        let config = MonitorConfig {
            stop_timeout_ms: 10,
            ..MonitorConfig::default()
        };
        let manager = MonitorManager::new(
            Arc::new(backend.clone()),
            config,
            Arc::new(TelemetryCollector::default()),
        );

        manager.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        manager.stop();
        assert_eq!(manager.state(), EngineState::Idle);
        assert!(!manager.is_monitoring());
        assert_eq!(backend.open_handles(), 2);

        // The old pair is still open, so a restart must not add a second one.
        assert!(matches!(
            manager.start(),
            Err(AudioError::StreamFailure { .. })
        ));
        assert_eq!(backend.open_handles(), 2);
        assert_eq!(backend.attempts(), 1);

        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.start().is_err() && Instant::now() < deadline {
            assert!(backend.open_handles() <= 2);
        }
        assert!(manager.is_monitoring());
        assert_eq!(backend.open_handles(), 2);
        assert_eq!(backend.attempts(), 2);
    }

    #[test]
    fn test_faulted_session_is_reaped() {
        let backend = MockBackend::new();
        backend.push_fault();
        let manager = manager(&backend);

        manager.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        while manager.is_monitoring() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        assert!(!manager.is_monitoring());
        assert_eq!(manager.state(), EngineState::Idle);
        assert_eq!(backend.open_handles(), 0);

        manager.start().unwrap();
        assert!(manager.is_monitoring());
        manager.stop();
    }
}
