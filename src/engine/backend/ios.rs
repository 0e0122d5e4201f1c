//! iOS adapter: AVAudioSession configuration and record permission.
//!
//! Streams are opened through CPAL (RemoteIO underneath). Before the first
//! stream of an attempt opens, the shared AVAudioSession is put into
//! play-and-record / voice-chat mode with a 5 ms preferred IO buffer at the
//! candidate's sample rate. The hardware buffer then follows the session,
//! so buffer sizes reported to the ladder come from the session's IO buffer
//! duration and the direct-path floor keeps requests at 256 frames or more.

use objc2::rc::Retained;
use objc2_avf_audio::{
    AVAudioSession, AVAudioSessionCategoryOptions, AVAudioSessionCategoryPlayAndRecord,
    AVAudioSessionModeVoiceChat, AVAudioSessionRecordPermission,
};
use objc2_foundation::NSError;

use crate::error::AudioError;

use super::cpal::{BufferMode, CpalBackend};
use super::{
    InputStream, OutputStream, PermissionProvider, PermissionStatus, StreamBackend,
    StreamRequest,
};

/// Preferred IO buffer duration requested from the session.
pub const PREFERRED_IO_BUFFER_SECONDS: f64 = 0.005;

/// Smallest buffer the RemoteIO direct path is driven with.
pub const DIRECT_PATH_FLOOR_FRAMES: usize = 256;

fn session_error(action: &str, err: Retained<NSError>) -> AudioError {
    AudioError::StreamOpenFailed {
        reason: format!("AVAudioSession {} failed: {:?}", action, err),
    }
}

fn shared_session() -> Retained<AVAudioSession> {
    unsafe { AVAudioSession::sharedInstance() }
}

/// Frames covered by the session's IO buffer at `sample_rate_hz`.
fn io_buffer_frames(io_buffer_seconds: f64, sample_rate_hz: u32) -> usize {
    let frames = (io_buffer_seconds * f64::from(sample_rate_hz)).round();
    if frames.is_finite() && frames > 0.0 {
        frames as usize
    } else {
        DIRECT_PATH_FLOOR_FRAMES
    }
}

/// Put the shared session into low-latency duplex mode at `sample_rate_hz`.
///
/// # Errors
/// `StreamOpenFailed` when the session rejects the category, buffer
/// duration, sample rate or activation.
pub fn configure_session(sample_rate_hz: u32) -> Result<(), AudioError> {
    let session = shared_session();

    let (category, mode) = unsafe {
        (
            AVAudioSessionCategoryPlayAndRecord,
            AVAudioSessionModeVoiceChat,
        )
    };
    let (Some(category), Some(mode)) = (category, mode) else {
        return Err(AudioError::HardwareError {
            details: "AVAudioSession category constants unavailable".to_string(),
        });
    };

    let options = AVAudioSessionCategoryOptions::DefaultToSpeaker
        | AVAudioSessionCategoryOptions::AllowBluetooth
        | AVAudioSessionCategoryOptions::MixWithOthers;

    unsafe {
        session
            .setCategory_mode_options_error(category, mode, options)
            .map_err(|e| session_error("setCategory", e))?;
        session
            .setPreferredIOBufferDuration_error(PREFERRED_IO_BUFFER_SECONDS)
            .map_err(|e| session_error("setPreferredIOBufferDuration", e))?;
        session
            .setPreferredSampleRate_error(f64::from(sample_rate_hz))
            .map_err(|e| session_error("setPreferredSampleRate", e))?;
        session
            .setActive_error(true)
            .map_err(|e| session_error("setActive", e))?;
    }

    log::info!(
        "[IosSession] Configured play-and-record/voice-chat @ {} Hz",
        sample_rate_hz
    );
    Ok(())
}

/// iOS backend: session configuration in front of CPAL streams.
#[derive(Debug)]
pub struct IosBackend {
    streams: CpalBackend,
}

impl IosBackend {
    pub fn new() -> Self {
        Self {
            streams: CpalBackend::with_buffer_mode(BufferMode::SessionManaged),
        }
    }
}

impl Default for IosBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamBackend for IosBackend {
    fn name(&self) -> &'static str {
        "ios"
    }

    fn min_input_buffer_frames(&self, sample_rate_hz: u32) -> Result<usize, AudioError> {
        configure_session(sample_rate_hz)?;
        let io_seconds = unsafe { shared_session().IOBufferDuration() };
        Ok(io_buffer_frames(io_seconds, sample_rate_hz))
    }

    fn min_output_buffer_frames(&self, sample_rate_hz: u32) -> Result<usize, AudioError> {
        // Input and output share one IO cycle on iOS.
        let io_seconds = unsafe { shared_session().IOBufferDuration() };
        Ok(io_buffer_frames(io_seconds, sample_rate_hz))
    }

    fn open_input(&self, request: &StreamRequest) -> Result<Box<dyn InputStream>, AudioError> {
        configure_session(request.sample_rate_hz)?;
        self.streams.open_input(request)
    }

    fn open_output(&self, request: &StreamRequest) -> Result<Box<dyn OutputStream>, AudioError> {
        self.streams.open_output(request)
    }
}

/// Reads `AVAudioSession.recordPermission`.
///
/// The engine never prompts; an undetermined permission counts as denied
/// until the host app has asked the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct IosPermissions;

fn permission_status(permission: AVAudioSessionRecordPermission) -> PermissionStatus {
    if permission == AVAudioSessionRecordPermission::Granted {
        PermissionStatus::Granted
    } else {
        PermissionStatus::Denied
    }
}

impl PermissionProvider for IosPermissions {
    #[allow(deprecated)]
    fn record_permission(&self) -> Result<PermissionStatus, AudioError> {
        let permission = unsafe { shared_session().recordPermission() };
        Ok(permission_status(permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_buffer_frames_follow_duration() {
        assert_eq!(io_buffer_frames(0.005, 48000), 240);
        assert_eq!(io_buffer_frames(0.005, 44100), 221);
        assert_eq!(io_buffer_frames(0.0, 48000), DIRECT_PATH_FLOOR_FRAMES);
    }

    #[test]
    fn only_granted_permission_opens_streams() {
        assert_eq!(
            permission_status(AVAudioSessionRecordPermission::Granted),
            PermissionStatus::Granted
        );
        assert_eq!(
            permission_status(AVAudioSessionRecordPermission::Denied),
            PermissionStatus::Denied
        );
        assert_eq!(
            permission_status(AVAudioSessionRecordPermission::Undetermined),
            PermissionStatus::Denied
        );
    }
}
