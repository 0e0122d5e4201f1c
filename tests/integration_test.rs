//! Integration tests for the monitoring engine
//!
//! These tests drive the public `EngineHandle` API against the deterministic
//! mock backend, covering:
//! - Ladder selection and fallback
//! - Idempotent start/stop and forced detach
//! - Volume clamping, latency and level queries
//! - Passthrough ordering and bounded teardown
//! - Permission and stream-fault handling

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use audio_monitor::audio::{ConfigurationLadder, LatencyTier, NOT_MONITORING_MS};
use audio_monitor::config::{AppConfig, MonitorConfig};
use audio_monitor::engine::backend::FailPoint;
use audio_monitor::engine::{EngineHandle, MockBackend, MockPermissions};
use audio_monitor::error::AudioError;
use audio_monitor::managers::EngineState;
use audio_monitor::telemetry::{MetricEvent, StopReason};

fn engine_with(backend: &MockBackend, config: AppConfig) -> EngineHandle {
    EngineHandle::with_backend(
        config,
        Arc::new(backend.clone()),
        Arc::new(MockPermissions::granted()),
    )
}

fn engine(backend: &MockBackend) -> EngineHandle {
    engine_with(backend, AppConfig::default())
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[test]
fn test_buffer_frames_respect_floor_for_every_candidate() {
    for platform_min in [0, 64, 256, 1000, 2048, 4096, 8192, 48000] {
        for floor in [256, 1024] {
            for config in ConfigurationLadder::standard().iter() {
                assert!(
                    config.buffer_frames(platform_min, floor) >= floor,
                    "{:?} with min {} fell below floor {}",
                    config.tier,
                    platform_min,
                    floor
                );
            }
        }
    }
}

#[test]
fn test_start_twice_yields_one_session() {
    let backend = MockBackend::new();
    let engine = engine(&backend);

    assert!(engine.start().is_ok());
    assert!(engine.start().is_ok());

    assert_eq!(backend.attempts(), 1);
    assert_eq!(backend.open_handles(), 2);
    assert_eq!(engine.state(), EngineState::Monitoring);
}

#[test]
fn test_stop_while_idle_succeeds() {
    let backend = MockBackend::new();
    let engine = engine(&backend);

    engine.stop();
    engine.stop();
    assert_eq!(engine.state(), EngineState::Idle);
    assert!(!engine.is_monitoring());
}

#[test]
fn test_third_candidate_selected_after_two_failures() {
    for point in [
        FailPoint::InputOpen,
        FailPoint::OutputOpen,
        FailPoint::InputStart,
        FailPoint::OutputStart,
    ] {
        let backend = MockBackend::new().failing_first(2, point);
        let engine = engine(&backend);

        engine.start().unwrap();
        let active = engine.active_config().unwrap();
        assert_eq!(active.tier, LatencyTier::Standard, "fail point {:?}", point);
        assert_eq!(active.sample_rate_hz, 44100);
        assert_eq!(backend.attempts(), 3);
        // Only the winning session's pair is open.
        assert_eq!(backend.open_handles(), 2);

        engine.stop();
        assert_eq!(backend.open_handles(), 0);
    }
}

#[test]
fn test_exhausted_ladder_leaks_nothing() {
    let backend = MockBackend::new().failing_always(FailPoint::OutputStart);
    let engine = engine(&backend);

    assert_eq!(
        engine.start(),
        Err(AudioError::NoValidConfiguration { attempts: 4 })
    );
    assert!(!engine.is_monitoring());
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn test_volume_clamped_to_unit_range() {
    let backend = MockBackend::new();
    let engine = engine(&backend);

    assert_eq!(engine.set_volume(-1.0).unwrap(), 0.0);
    assert_eq!(engine.volume(), 0.0);
    assert_eq!(engine.set_volume(2.0).unwrap(), 1.0);
    assert_eq!(engine.volume(), 1.0);

    engine.start().unwrap();
    assert_eq!(engine.set_volume(-1.0).unwrap(), 0.0);
    assert!(wait_until(Duration::from_secs(1), || {
        backend.applied_volume() == Some(0.0)
    }));
}

#[test]
fn test_nan_volume_rejected_without_state_change() {
    let backend = MockBackend::new();
    let engine = engine(&backend);
    engine.set_volume(0.4).unwrap();

    assert!(matches!(
        engine.set_volume(f64::NAN),
        Err(AudioError::InvalidArguments { .. })
    ));
    assert!((engine.volume() - 0.4).abs() < 1e-6);
    assert_eq!(engine.state(), EngineState::Idle);
}

#[test]
fn test_latency_sentinel_and_known_configuration() {
    let backend = MockBackend::with_min_buffer(2048, 2048);
    let config = AppConfig {
        monitor: MonitorConfig {
            floor_frames: 256,
            processing_overhead_ms: 2.0,
            ..MonitorConfig::default()
        },
        ..AppConfig::default()
    };
    let engine = engine_with(&backend, config);

    assert_eq!(engine.latency_ms(), NOT_MONITORING_MS);

    engine.start().unwrap();
    // 2048 / 4 = 512 frames each way at 48 kHz.
    let latency = engine.latency_ms();
    assert!((latency - 23.333).abs() < 0.01, "latency was {}", latency);

    engine.stop();
    assert_eq!(engine.latency_ms(), NOT_MONITORING_MS);
}

#[test]
fn test_captured_chunk_written_unchanged() {
    let backend = MockBackend::new();
    backend.push_capture(vec![1, 2, 3, 4]);
    let engine = engine(&backend);

    engine.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || !backend
        .written()
        .is_empty()));
    engine.stop();

    assert_eq!(backend.written(), vec![vec![1, 2, 3, 4]]);
}

#[test]
fn test_level_tracks_captured_signal() {
    let backend = MockBackend::new().with_noise(16000);
    let engine = engine(&backend);

    assert_eq!(engine.audio_level(), 0.0);
    engine.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || engine.audio_level() > 0.1));
    let level = engine.audio_level();
    assert!(level <= 1.0);

    engine.stop();
    assert_eq!(engine.audio_level(), 0.0);
}

#[test]
fn test_stop_completes_in_bounded_time() {
    let backend = MockBackend::new().with_noise(1000);
    let engine = engine(&backend);
    engine.start().unwrap();
    thread::sleep(Duration::from_millis(30));

    let started = Instant::now();
    engine.stop();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(1), "stop took {:?}", elapsed);
    assert_eq!(backend.open_handles(), 0);
    assert!(!engine.is_monitoring());
}

#[test]
fn test_permission_denied_never_touches_ladder() {
    let backend = MockBackend::new();
    let engine = EngineHandle::with_backend(
        AppConfig::default(),
        Arc::new(backend.clone()),
        Arc::new(MockPermissions::denied()),
    );

    assert_eq!(engine.start(), Err(AudioError::PermissionDenied));
    assert_eq!(backend.attempts(), 0);
    assert_eq!(backend.open_handles(), 0);
    assert!(!engine.is_monitoring());
}

#[test]
fn test_stream_fault_returns_engine_to_idle() {
    let backend = MockBackend::new();
    backend.push_capture(vec![5, 6]);
    backend.push_fault();
    let engine = engine(&backend);

    engine.start().unwrap();
    assert!(wait_until(Duration::from_secs(1), || !engine.is_monitoring()));

    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(backend.open_handles(), 0);
    assert_eq!(engine.latency_ms(), NOT_MONITORING_MS);

    let stopped_by_fault = engine.telemetry_snapshot().recent.iter().any(|event| {
        matches!(
            event,
            MetricEvent::MonitoringStopped {
                reason: StopReason::StreamFault
            }
        )
    });
    assert!(stopped_by_fault);
}

#[test]
fn test_detach_from_any_state() {
    let backend = MockBackend::new();
    let engine = engine(&backend);

    engine.detach();
    assert_eq!(engine.state(), EngineState::Idle);

    engine.start().unwrap();
    engine.detach();
    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn test_dropping_engine_releases_streams() {
    let backend = MockBackend::new();
    let engine = engine(&backend);
    engine.start().unwrap();
    assert_eq!(backend.open_handles(), 2);

    drop(engine);
    assert_eq!(backend.open_handles(), 0);
}

#[test]
fn test_telemetry_stream_delivers_start_event() {
    use futures::StreamExt;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build test runtime");

    let backend = MockBackend::new();
    let engine = engine(&backend);
    let mut stream = Box::pin(engine.telemetry_stream());

    engine.start().unwrap();

    let started = runtime.block_on(async {
        tokio::time::timeout(Duration::from_secs(1), async {
            while let Some(event) = stream.next().await {
                if let MetricEvent::MonitoringStarted { tier, .. } = event {
                    return Some(tier);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    });

    assert_eq!(started, Some(LatencyTier::UltraLow));
    engine.stop();
}

#[test]
fn test_restart_during_slow_stop_never_opens_second_pair() {
    let backend = MockBackend::new().with_read_delay(Duration::from_millis(300));
    let config = AppConfig {
        monitor: MonitorConfig {
            stop_timeout_ms: 20,
            ..MonitorConfig::default()
        },
        ..AppConfig::default()
    };
    let engine = engine_with(&backend, config);

    engine.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    engine.stop();
    assert!(!engine.is_monitoring());

    let deadline = Instant::now() + Duration::from_secs(3);
    let mut peak = backend.open_handles();
    while Instant::now() < deadline {
        let restarted = engine.start();
        peak = peak.max(backend.open_handles());
        if restarted.is_ok() {
            break;
        }
        assert_eq!(
            restarted.unwrap_err().channel_code(),
            "MONITORING_ERROR"
        );
    }

    assert!(engine.is_monitoring());
    assert_eq!(peak, 2);
    assert_eq!(backend.open_handles(), 2);
}
