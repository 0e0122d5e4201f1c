//! Capture/playback session.
//!
//! A session pairs one input and one output stream opened at the same
//! sample rate, plus the passthrough thread moving audio between them. The
//! two streams are always opened, started and released together.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::engine::backend::{InputStream, OutputStream, StreamBackend, StreamRequest};
use crate::error::{log_audio_error, AudioError};

use super::ladder::AudioConfig;
use super::latency::LatencyEstimate;
use super::level::{LevelMeter, UNMETERED_LEVEL};
use super::passthrough::{
    JoinStatus, LoopControls, LoopOutcome, PassthroughLoop, PassthroughWorker,
};

/// Engine settings that shape every session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub floor_frames: usize,
    pub read_timeout: Duration,
    pub stop_timeout: Duration,
    /// Initial output gain in `[0.0, 1.0]`.
    pub volume: f32,
    pub level_metering: bool,
}

impl SessionSettings {
    pub fn from_config(config: &MonitorConfig, volume: f32) -> Self {
        Self {
            floor_frames: config.floor_frames,
            read_timeout: config.read_timeout(),
            stop_timeout: config.stop_timeout(),
            volume: volume.clamp(0.0, 1.0),
            level_metering: config.level_metering,
        }
    }
}

/// Stream requests derived for one ladder candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPlan {
    pub input: StreamRequest,
    pub output: StreamRequest,
}

impl StreamPlan {
    /// Both directions use the candidate's divisor against their own
    /// platform minimum, with the same floor.
    ///
    /// # Errors
    /// Whatever the backend reports for an unsupported sample rate.
    pub fn resolve(
        backend: &dyn StreamBackend,
        config: &AudioConfig,
        floor_frames: usize,
    ) -> Result<Self, AudioError> {
        let rate = config.sample_rate_hz;
        let input_min = backend.min_input_buffer_frames(rate)?;
        let output_min = backend.min_output_buffer_frames(rate)?;

        Ok(Self {
            input: StreamRequest::new(rate, config.buffer_frames(input_min, floor_frames)),
            output: StreamRequest::new(rate, config.buffer_frames(output_min, floor_frames)),
        })
    }
}

/// An open, running capture→playback session.
pub struct Session {
    config: AudioConfig,
    input_frames: usize,
    output_frames: usize,
    running: Arc<AtomicBool>,
    volume: Arc<AtomicU32>,
    level: Option<Arc<LevelMeter>>,
    stop_timeout: Duration,
    worker: Option<PassthroughWorker>,
}

fn release_input(input: &mut Box<dyn InputStream>) {
    if let Err(err) = input.close() {
        log_audio_error(&err, "session_release_input");
    }
}

fn release_output(output: &mut Box<dyn OutputStream>) {
    if let Err(err) = output.close() {
        log_audio_error(&err, "session_release_output");
    }
}

impl Session {
    /// Open and start both streams, then launch the passthrough thread.
    ///
    /// On any failure everything acquired so far is released before the
    /// error is returned, so a rejected candidate never leaks a handle.
    ///
    /// # Errors
    /// The backend's open/start error (`StreamOpenFailed`, `HardwareError`)
    /// or `HardwareError` if the passthrough thread cannot be spawned.
    pub fn open(
        backend: &dyn StreamBackend,
        config: AudioConfig,
        plan: &StreamPlan,
        settings: &SessionSettings,
    ) -> Result<Self, AudioError> {
        let mut input = backend.open_input(&plan.input)?;

        let mut output = match backend.open_output(&plan.output) {
            Ok(output) => output,
            Err(err) => {
                release_input(&mut input);
                return Err(err);
            }
        };

        if let Err(err) = input.start().and_then(|_| output.start()) {
            release_output(&mut output);
            release_input(&mut input);
            return Err(err);
        }

        let input_frames = input.buffer_frames();
        let output_frames = output.buffer_frames();

        let controls = LoopControls {
            running: Arc::new(AtomicBool::new(true)),
            volume: Arc::new(AtomicU32::new(settings.volume.to_bits())),
            level: settings
                .level_metering
                .then(|| Arc::new(LevelMeter::new())),
        };

        let worker = PassthroughWorker::spawn(PassthroughLoop::new(
            input,
            output,
            controls.clone(),
            settings.read_timeout,
        ))?;

        log::info!(
            "[Session] Opened {} @ {} Hz (input {} frames, output {} frames)",
            config.tier,
            config.sample_rate_hz,
            input_frames,
            output_frames
        );

        Ok(Self {
            config,
            input_frames,
            output_frames,
            running: controls.running,
            volume: controls.volume,
            level: controls.level,
            stop_timeout: settings.stop_timeout,
            worker: Some(worker),
        })
    }

    /// Stop the loop, wait for it (bounded) and release both streams.
    ///
    /// Returns `None` once the session is fully closed (later calls do
    /// nothing) or when the loop did not exit within the stop timeout. In the
    /// second case the session is draining: it still owns the stream pair and
    /// a later `close` waits again.
    pub fn close(&mut self) -> Option<LoopOutcome> {
        let worker = self.worker.as_mut()?;

        self.running.store(false, Ordering::Release);

        let mut report = match worker.join(self.stop_timeout) {
            JoinStatus::Finished(report) => report,
            JoinStatus::Pending => return None,
            JoinStatus::Lost => {
                self.worker = None;
                self.reset_level();
                return Some(LoopOutcome::Faulted(AudioError::StreamFailure {
                    reason: "passthrough thread panicked".to_string(),
                }));
            }
        };
        self.worker = None;
        report.release();

        log::info!(
            "[Session] Closed {} @ {} Hz ({} frames passed, {} dropped)",
            self.config.tier,
            self.config.sample_rate_hz,
            report.frames_transferred,
            report.frames_dropped
        );

        self.reset_level();
        Some(report.outcome)
    }

    /// True after a `close` that timed out, until a later one completes.
    pub fn is_draining(&self) -> bool {
        self.worker.is_some() && !self.running.load(Ordering::Acquire)
    }

    fn reset_level(&self) {
        if let Some(level) = &self.level {
            level.reset();
        }
    }

    /// True while the loop is alive and has not been asked to stop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.worker.as_ref().is_some_and(|w| w.is_alive())
    }

    /// True when the loop exited on its own (stream fault).
    pub fn is_faulted(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_alive())
            && self.running.load(Ordering::Acquire)
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Most recent RMS level, or the fixed placeholder without metering.
    pub fn level(&self) -> f32 {
        match &self.level {
            Some(level) => level.level(),
            None => UNMETERED_LEVEL,
        }
    }

    pub fn latency(&self, overhead_ms: f64) -> LatencyEstimate {
        LatencyEstimate::from_frames(
            self.config.sample_rate_hz,
            self.input_frames,
            self.output_frames,
            overhead_ms,
        )
    }

    pub fn config(&self) -> AudioConfig {
        self.config
    }

    pub fn input_frames(&self) -> usize {
        self.input_frames
    }

    pub fn output_frames(&self) -> usize {
        self.output_frames
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
