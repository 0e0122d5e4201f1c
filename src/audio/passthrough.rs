//! Passthrough loop: microphone chunks go straight to the speaker.
//!
//! The loop runs on a dedicated "audio-passthrough" thread that owns both
//! stream handles for its lifetime and hands them back through a
//! `LoopReport` when it exits. Control threads only flip the shared
//! `running` flag and update the volume atomically; they never touch the
//! streams while the loop is alive.
//!
//! Real-time constraints:
//! - one reusable buffer sized to the capture buffer, no queueing
//! - the blocking read is the only suspension point and is bounded
//! - writes never block; frames that do not fit are dropped

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::backend::{InputStream, OutputStream};
use crate::error::{log_audio_error, AudioError};

use super::level::LevelMeter;

/// How the loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// `running` was cleared by the controller.
    Stopped,
    /// The input read (or output write) failed.
    Faulted(AudioError),
}

/// Shared handles the controller uses to steer a running loop.
#[derive(Debug, Clone)]
pub struct LoopControls {
    pub running: Arc<AtomicBool>,
    /// Output gain stored as f32 bits.
    pub volume: Arc<AtomicU32>,
    /// `None` when metering is disabled.
    pub level: Option<Arc<LevelMeter>>,
}

/// Streams and counters handed back when the loop exits.
pub struct LoopReport {
    pub input: Box<dyn InputStream>,
    pub output: Box<dyn OutputStream>,
    pub outcome: LoopOutcome,
    pub frames_transferred: u64,
    pub frames_dropped: u64,
}

impl LoopReport {
    /// Stop and release both streams. Errors are logged, never returned.
    pub fn release(&mut self) {
        if let Err(err) = self.input.close() {
            log_audio_error(&err, "release_input");
        }
        if let Err(err) = self.output.close() {
            log_audio_error(&err, "release_output");
        }
    }
}

pub struct PassthroughLoop {
    input: Box<dyn InputStream>,
    output: Box<dyn OutputStream>,
    buffer: Vec<i16>,
    controls: LoopControls,
    read_timeout: Duration,
}

impl PassthroughLoop {
    pub fn new(
        input: Box<dyn InputStream>,
        output: Box<dyn OutputStream>,
        controls: LoopControls,
        read_timeout: Duration,
    ) -> Self {
        let buffer = vec![0; input.buffer_frames().max(1)];
        Self {
            input,
            output,
            buffer,
            controls,
            read_timeout,
        }
    }

    fn is_running(&self) -> bool {
        self.controls.running.load(Ordering::Acquire)
    }

    /// Run until `running` is cleared or a stream faults.
    pub fn run(mut self) -> LoopReport {
        let mut applied_volume: Option<f32> = None;
        let mut frames_transferred: u64 = 0;
        let mut frames_dropped: u64 = 0;

        let outcome = loop {
            if !self.is_running() {
                break LoopOutcome::Stopped;
            }

            let volume = f32::from_bits(self.controls.volume.load(Ordering::Relaxed));
            if applied_volume != Some(volume) {
                if let Err(err) = self.output.set_volume(volume) {
                    log_audio_error(&err, "passthrough_set_volume");
                }
                applied_volume = Some(volume);
            }

            let frames = match self.input.read(&mut self.buffer, self.read_timeout) {
                Ok(frames) => frames.min(self.buffer.len()),
                Err(err) => break LoopOutcome::Faulted(err),
            };

            if frames == 0 {
                continue;
            }

            // Stop may have been requested while the read was blocked.
            if !self.is_running() {
                break LoopOutcome::Stopped;
            }

            let chunk = &self.buffer[..frames];
            if let Some(level) = &self.controls.level {
                level.observe(chunk);
            }

            match self.output.write_non_blocking(chunk) {
                Ok(written) => {
                    let written = written.min(frames);
                    frames_transferred += written as u64;
                    frames_dropped += (frames - written) as u64;
                }
                Err(err) => break LoopOutcome::Faulted(err),
            }
        };

        match &outcome {
            LoopOutcome::Stopped => log::debug!(
                "[Passthrough] Stopped after {} frames ({} dropped)",
                frames_transferred,
                frames_dropped
            ),
            LoopOutcome::Faulted(err) => log_audio_error(err, "passthrough_loop"),
        }

        LoopReport {
            input: self.input,
            output: self.output,
            outcome,
            frames_transferred,
            frames_dropped,
        }
    }
}

/// Result of waiting on a `PassthroughWorker`.
pub enum JoinStatus {
    /// The loop exited and handed its streams back.
    Finished(LoopReport),
    /// The loop is still inside a read; the worker can be joined again.
    Pending,
    /// The thread died without a report (panic).
    Lost,
}

/// Clears the alive flag when the loop thread exits, including by panic.
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Handle to the thread running a `PassthroughLoop`.
///
/// While the handle exists the thread delivers its report here. Dropping the
/// handle early makes the thread release the streams itself on exit.
pub struct PassthroughWorker {
    handle: Option<JoinHandle<()>>,
    report_rx: mpsc::Receiver<LoopReport>,
    alive: Arc<AtomicBool>,
}

impl PassthroughWorker {
    /// Start the loop on its own thread.
    ///
    /// # Errors
    /// `HardwareError` if the thread cannot be spawned; the streams are
    /// dropped (and thereby released) in that case.
    pub fn spawn(passthrough: PassthroughLoop) -> Result<Self, AudioError> {
        let (report_tx, report_rx) = mpsc::channel();
        let alive = Arc::new(AtomicBool::new(true));
        let thread_alive = Arc::clone(&alive);

        let handle = thread::Builder::new()
            .name("audio-passthrough".to_string())
            .spawn(move || {
                let _alive = AliveGuard(thread_alive);
                let report = passthrough.run();
                // Nobody is waiting for the streams any more.
                if let Err(mpsc::SendError(mut report)) = report_tx.send(report) {
                    log::warn!("[Passthrough] Releasing streams after detached stop");
                    report.release();
                }
            })
            .map_err(|e| AudioError::HardwareError {
                details: format!("Failed to spawn passthrough thread: {}", e),
            })?;

        Ok(Self {
            handle: Some(handle),
            report_rx,
            alive,
        })
    }

    /// False once the loop has exited for any reason.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Wait at most `timeout` for the loop to exit.
    ///
    /// On `Pending` the worker stays usable and a later join picks up the
    /// report. `Finished` and `Lost` are final.
    pub fn join(&mut self, timeout: Duration) -> JoinStatus {
        match self.report_rx.recv_timeout(timeout) {
            Ok(report) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        log::warn!("[Passthrough] Thread panicked after reporting");
                    }
                }
                JoinStatus::Finished(report)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!(
                    "[Passthrough] Loop did not stop within {:?}, still draining",
                    timeout
                );
                JoinStatus::Pending
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                log::error!("[Passthrough] Thread exited without a report");
                JoinStatus::Lost
            }
        }
    }
}

impl Drop for PassthroughWorker {
    fn drop(&mut self) {
        // A report that already arrived would otherwise be dropped unreleased.
        if let Ok(mut report) = self.report_rx.try_recv() {
            report.release();
        }
    }
}
