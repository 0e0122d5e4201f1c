//! Deterministic backend for tests and CLI simulation.
//!
//! The mock simulates the platform without real audio I/O: open failures can
//! be injected for the first N session attempts, capture can be scripted
//! chunk by chunk (or filled with noise), every output write is recorded,
//! and open stream handles are counted so leaks are observable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::error::AudioError;

use super::{
    InputStream, OutputStream, PermissionProvider, PermissionStatus, StreamBackend,
    StreamRequest,
};

/// Where an injected open failure happens within a session attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InputOpen,
    OutputOpen,
    InputStart,
    OutputStart,
}

/// One scripted capture result.
#[derive(Debug, Clone, PartialEq)]
pub enum MockRead {
    Frames(Vec<i16>),
    Fault,
}

#[derive(Debug, Clone, Default)]
struct MockSettings {
    min_input_frames: usize,
    min_output_frames: usize,
    fail_attempts: usize,
    fail_point: Option<FailPoint>,
    output_capacity: Option<usize>,
    noise_amplitude: Option<i16>,
    read_delay: Option<Duration>,
}

#[derive(Default)]
struct MockShared {
    settings: MockSettings,
    attempts: AtomicUsize,
    open_handles: AtomicUsize,
    script: Mutex<VecDeque<MockRead>>,
    written: Mutex<Vec<Vec<i16>>>,
    requests: Mutex<Vec<StreamRequest>>,
    volume: Mutex<Option<f32>>,
}

impl MockShared {
    fn attempt_fails(&self, attempt: usize, point: FailPoint) -> bool {
        self.settings.fail_point == Some(point) && attempt < self.settings.fail_attempts
    }
}

/// Scriptable in-memory backend.
#[derive(Clone)]
pub struct MockBackend {
    shared: Arc<MockShared>,
}

impl MockBackend {
    /// Backend whose platform minimum is 2048 frames for both directions.
    pub fn new() -> Self {
        Self::with_min_buffer(2048, 2048)
    }

    pub fn with_min_buffer(min_input_frames: usize, min_output_frames: usize) -> Self {
        Self::from_settings(MockSettings {
            min_input_frames,
            min_output_frames,
            ..MockSettings::default()
        })
    }

    fn from_settings(settings: MockSettings) -> Self {
        Self {
            shared: Arc::new(MockShared {
                settings,
                ..MockShared::default()
            }),
        }
    }

    // Builder methods start from fresh counters and an empty script.
    fn configure(self, apply: impl FnOnce(&mut MockSettings)) -> Self {
        let mut settings = self.shared.settings.clone();
        apply(&mut settings);
        Self::from_settings(settings)
    }

    /// Fail the first `attempts` session attempts at `point`.
    pub fn failing_first(self, attempts: usize, point: FailPoint) -> Self {
        self.configure(|settings| {
            settings.fail_attempts = attempts;
            settings.fail_point = Some(point);
        })
    }

    /// Fail every session attempt at `point`.
    pub fn failing_always(self, point: FailPoint) -> Self {
        self.failing_first(usize::MAX, point)
    }

    /// Accept at most `frames` per output write, dropping the rest.
    pub fn with_output_capacity(self, frames: usize) -> Self {
        self.configure(|settings| settings.output_capacity = Some(frames))
    }

    /// Fill reads with uniform noise when the script is exhausted.
    pub fn with_noise(self, amplitude: i16) -> Self {
        self.configure(|settings| settings.noise_amplitude = Some(amplitude.saturating_abs()))
    }

    /// Block every read for `delay`, ignoring the caller's read timeout.
    pub fn with_read_delay(self, delay: Duration) -> Self {
        self.configure(|settings| settings.read_delay = Some(delay))
    }

    /// Queue a captured chunk for the next read.
    pub fn push_capture(&self, frames: Vec<i16>) {
        self.lock_script().push_back(MockRead::Frames(frames));
    }

    /// Queue a read error.
    pub fn push_fault(&self) {
        self.lock_script().push_back(MockRead::Fault);
    }

    /// Every accepted output write, in order.
    pub fn written(&self) -> Vec<Vec<i16>> {
        self.shared
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stream requests seen so far (input and output interleaved).
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.shared
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Last volume applied to an output stream.
    pub fn applied_volume(&self) -> Option<f32> {
        *self
            .shared
            .volume
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of session attempts (input opens) so far.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Streams opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.shared.open_handles.load(Ordering::SeqCst)
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<MockRead>> {
        self.shared
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record_request(&self, request: &StreamRequest) {
        self.shared
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*request);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn min_input_buffer_frames(&self, _sample_rate_hz: u32) -> Result<usize, AudioError> {
        Ok(self.shared.settings.min_input_frames)
    }

    fn min_output_buffer_frames(&self, _sample_rate_hz: u32) -> Result<usize, AudioError> {
        Ok(self.shared.settings.min_output_frames)
    }

    fn open_input(&self, request: &StreamRequest) -> Result<Box<dyn InputStream>, AudioError> {
        let attempt = self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        self.record_request(request);

        if self.shared.attempt_fails(attempt, FailPoint::InputOpen) {
            return Err(AudioError::StreamOpenFailed {
                reason: format!("mock input rejected {:?}", request),
            });
        }

        self.shared.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockInput {
            shared: Arc::clone(&self.shared),
            request: *request,
            attempt,
            closed: false,
        }))
    }

    fn open_output(&self, request: &StreamRequest) -> Result<Box<dyn OutputStream>, AudioError> {
        // The input of the same attempt was opened just before.
        let attempt = self.shared.attempts.load(Ordering::SeqCst).saturating_sub(1);
        self.record_request(request);

        if self.shared.attempt_fails(attempt, FailPoint::OutputOpen) {
            return Err(AudioError::StreamOpenFailed {
                reason: format!("mock output rejected {:?}", request),
            });
        }

        self.shared.open_handles.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockOutput {
            shared: Arc::clone(&self.shared),
            request: *request,
            attempt,
            closed: false,
        }))
    }
}

struct MockInput {
    shared: Arc<MockShared>,
    request: StreamRequest,
    attempt: usize,
    closed: bool,
}

impl MockInput {
    fn idle_wait(&self, timeout: Duration) {
        let period = Duration::from_micros(
            self.request.buffer_frames as u64 * 1_000_000
                / u64::from(self.request.sample_rate_hz.max(1)),
        );
        thread::sleep(period.min(timeout).min(Duration::from_millis(5)));
    }
}

impl InputStream for MockInput {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.shared.attempt_fails(self.attempt, FailPoint::InputStart) {
            return Err(AudioError::StreamOpenFailed {
                reason: "mock input failed to start".to_string(),
            });
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [i16], timeout: Duration) -> Result<usize, AudioError> {
        if let Some(delay) = self.shared.settings.read_delay {
            thread::sleep(delay);
        }

        if self.closed {
            return Err(AudioError::StreamFailure {
                reason: "mock input closed".to_string(),
            });
        }

        let next = self
            .shared
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match next {
            Some(MockRead::Frames(frames)) => {
                let n = frames.len().min(buffer.len());
                buffer[..n].copy_from_slice(&frames[..n]);
                if n < frames.len() {
                    self.shared
                        .script
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push_front(MockRead::Frames(frames[n..].to_vec()));
                }
                Ok(n)
            }
            Some(MockRead::Fault) => Err(AudioError::StreamFailure {
                reason: "mock input fault".to_string(),
            }),
            None => {
                self.idle_wait(timeout);
                match self.shared.settings.noise_amplitude {
                    Some(amplitude) => {
                        let mut rng = rand::thread_rng();
                        for sample in buffer.iter_mut() {
                            *sample = rng.gen_range(-amplitude..=amplitude);
                        }
                        Ok(buffer.len())
                    }
                    None => Ok(0),
                }
            }
        }
    }

    fn buffer_frames(&self) -> usize {
        self.request.buffer_frames
    }

    fn close(&mut self) -> Result<(), AudioError> {
        if !self.closed {
            self.closed = true;
            self.shared.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MockInput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct MockOutput {
    shared: Arc<MockShared>,
    request: StreamRequest,
    attempt: usize,
    closed: bool,
}

impl OutputStream for MockOutput {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.shared.attempt_fails(self.attempt, FailPoint::OutputStart) {
            return Err(AudioError::StreamOpenFailed {
                reason: "mock output failed to start".to_string(),
            });
        }
        Ok(())
    }

    fn write_non_blocking(&mut self, frames: &[i16]) -> Result<usize, AudioError> {
        if self.closed {
            return Err(AudioError::StreamFailure {
                reason: "mock output closed".to_string(),
            });
        }

        let accepted = self
            .shared
            .settings
            .output_capacity
            .map_or(frames.len(), |capacity| capacity.min(frames.len()));
        if accepted > 0 {
            self.shared
                .written
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(frames[..accepted].to_vec());
        }
        Ok(accepted)
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        *self
            .shared
            .volume
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(volume);
        Ok(())
    }

    fn buffer_frames(&self) -> usize {
        self.request.buffer_frames
    }

    fn close(&mut self) -> Result<(), AudioError> {
        if !self.closed {
            self.closed = true;
            self.shared.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Permission provider with a switchable answer.
#[derive(Debug)]
pub struct MockPermissions {
    granted: AtomicBool,
    checks: AtomicUsize,
}

impl MockPermissions {
    pub fn granted() -> Self {
        Self {
            granted: AtomicBool::new(true),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn denied() -> Self {
        Self {
            granted: AtomicBool::new(false),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn set_granted(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl PermissionProvider for MockPermissions {
    fn record_permission(&self) -> Result<PermissionStatus, AudioError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.granted.load(Ordering::SeqCst) {
            Ok(PermissionStatus::Granted)
        } else {
            Ok(PermissionStatus::Denied)
        }
    }
}
