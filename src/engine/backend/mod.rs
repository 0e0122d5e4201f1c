//! Platform adapters for capture/playback streams.
//!
//! The engine core only talks to these traits. Each platform provides a
//! `StreamBackend` that knows its minimum buffer sizes and how to open a mono
//! 16-bit input stream and a low-latency voice output stream, plus a
//! `PermissionProvider` answering whether the microphone may be used.

use std::sync::Arc;
use std::time::Duration;

use crate::error::AudioError;

/// Parameters for opening one stream of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub sample_rate_hz: u32,
    pub buffer_frames: usize,
}

impl StreamRequest {
    pub fn new(sample_rate_hz: u32, buffer_frames: usize) -> Self {
        Self {
            sample_rate_hz,
            buffer_frames,
        }
    }
}

/// Microphone capture stream (mono, 16-bit PCM).
pub trait InputStream: Send {
    fn start(&mut self) -> Result<(), AudioError>;

    /// Read up to `buffer.len()` frames, blocking at most `timeout`.
    ///
    /// Returns `Ok(0)` when nothing was captured in time. An error means the
    /// stream faulted and no further reads will succeed.
    fn read(&mut self, buffer: &mut [i16], timeout: Duration) -> Result<usize, AudioError>;

    /// Buffer size actually in effect.
    fn buffer_frames(&self) -> usize;

    /// Stop and release the stream. Safe to call more than once.
    fn close(&mut self) -> Result<(), AudioError>;
}

/// Speaker playback stream (mono, 16-bit PCM, voice-communication usage).
pub trait OutputStream: Send {
    fn start(&mut self) -> Result<(), AudioError>;

    /// Write without blocking. Returns the number of frames accepted; frames
    /// that did not fit are dropped.
    fn write_non_blocking(&mut self, frames: &[i16]) -> Result<usize, AudioError>;

    /// Apply a gain in `[0.0, 1.0]`.
    fn set_volume(&mut self, volume: f32) -> Result<(), AudioError>;

    fn buffer_frames(&self) -> usize;

    /// Stop and release the stream. Safe to call more than once.
    fn close(&mut self) -> Result<(), AudioError>;
}

/// Trait implemented by platform-specific audio backends.
pub trait StreamBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Smallest capture buffer the platform accepts at this rate.
    fn min_input_buffer_frames(&self, sample_rate_hz: u32) -> Result<usize, AudioError>;

    /// Smallest playback buffer the platform accepts at this rate.
    fn min_output_buffer_frames(&self, sample_rate_hz: u32) -> Result<usize, AudioError>;

    fn open_input(&self, request: &StreamRequest) -> Result<Box<dyn InputStream>, AudioError>;

    fn open_output(&self, request: &StreamRequest) -> Result<Box<dyn OutputStream>, AudioError>;
}

mod permissions;
pub use permissions::{AssumeGranted, PermissionProvider, PermissionStatus};
#[cfg(target_os = "android")]
pub use permissions::AndroidPermissions;

pub mod mock;
pub use mock::{FailPoint, MockBackend, MockPermissions};

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        mod oboe;
        pub use self::oboe::OboeBackend;

        /// Backend used by `EngineHandle::new` on this platform.
        pub fn default_backend() -> Arc<dyn StreamBackend> {
            Arc::new(OboeBackend::new())
        }

        pub fn default_permissions() -> Arc<dyn PermissionProvider> {
            Arc::new(AndroidPermissions)
        }
    } else if #[cfg(target_os = "ios")] {
        mod cpal;
        mod ios;
        pub use self::cpal::{BufferMode, CpalBackend};
        pub use self::ios::{configure_session, IosBackend, IosPermissions};

        /// Backend used by `EngineHandle::new` on this platform.
        pub fn default_backend() -> Arc<dyn StreamBackend> {
            Arc::new(IosBackend::new())
        }

        pub fn default_permissions() -> Arc<dyn PermissionProvider> {
            Arc::new(IosPermissions)
        }
    } else {
        mod cpal;
        pub use self::cpal::{BufferMode, CpalBackend};

        /// Backend used by `EngineHandle::new` on this platform.
        pub fn default_backend() -> Arc<dyn StreamBackend> {
            Arc::new(CpalBackend::new())
        }

        pub fn default_permissions() -> Arc<dyn PermissionProvider> {
            Arc::new(AssumeGranted)
        }
    }
}
