// Audio error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Audio error code constants exposed to Dart via FFI
///
/// These constants provide a single source of truth for error codes
/// shared between Rust and Dart. The flutter_rust_bridge will automatically
/// generate corresponding Dart constants.
///
/// Error code range: 1001-1009
#[frb(unignore)]
pub struct AudioErrorCodes {}

#[frb]
impl AudioErrorCodes {
    /// Every ladder candidate failed to open
    pub const NO_VALID_CONFIGURATION: i32 = 1001;

    /// Microphone permission denied
    pub const PERMISSION_DENIED: i32 = 1002;

    /// Malformed command arguments (e.g. non-numeric volume)
    pub const INVALID_ARGUMENTS: i32 = 1003;

    /// Failed to open or start a capture/playback stream
    pub const STREAM_OPEN_FAILED: i32 = 1004;

    /// Stream faulted while monitoring
    pub const STREAM_FAILURE: i32 = 1005;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1006;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1007;

    /// JNI call failed on Android
    pub const JNI_INIT_FAILED: i32 = 1008;

    /// Android context was not initialized before the engine was used
    pub const CONTEXT_NOT_INITIALIZED: i32 = 1009;

    // Getter methods for FFI exposure (flutter_rust_bridge requires methods not const)

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn no_valid_configuration() -> i32 {
        Self::NO_VALID_CONFIGURATION
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn permission_denied() -> i32 {
        Self::PERMISSION_DENIED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_arguments() -> i32 {
        Self::INVALID_ARGUMENTS
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn stream_open_failed() -> i32 {
        Self::STREAM_OPEN_FAILED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn stream_failure() -> i32 {
        Self::STREAM_FAILURE
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn hardware_error() -> i32 {
        Self::HARDWARE_ERROR
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn lock_poisoned() -> i32 {
        Self::LOCK_POISONED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn jni_init_failed() -> i32 {
        Self::JNI_INIT_FAILED
    }

    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn context_not_initialized() -> i32 {
        Self::CONTEXT_NOT_INITIALIZED
    }
}

/// Log an audio error with structured context
///
/// Logs the numeric code, the component and the human-readable message.
/// Used both for errors returned to the caller and for teardown errors
/// that are swallowed.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioMonitor, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// Only `NoValidConfiguration`, `PermissionDenied` and `InvalidArguments`
/// reach callers of the public operations. `StreamOpenFailed` is produced
/// per ladder candidate and consumed by the ladder itself.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Every candidate on the configuration ladder failed to open
    NoValidConfiguration { attempts: usize },

    /// Microphone permission denied
    PermissionDenied,

    /// Command arguments were malformed
    InvalidArguments { reason: String },

    /// Failed to open or start a stream for one configuration attempt
    StreamOpenFailed { reason: String },

    /// Stream faulted during passthrough
    StreamFailure { reason: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// JNI call failed on Android
    JniInitFailed { reason: String },

    /// Android context was not initialized
    ContextNotInitialized,
}

impl AudioError {
    /// Method-channel error code reported to the UI layer.
    pub fn channel_code(&self) -> &'static str {
        match self {
            AudioError::NoValidConfiguration { .. } => "NO_VALID_CONFIGURATION",
            AudioError::PermissionDenied => "PERMISSION_DENIED",
            AudioError::InvalidArguments { .. } => "INVALID_ARGUMENTS",
            _ => "MONITORING_ERROR",
        }
    }
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::NoValidConfiguration { .. } => AudioErrorCodes::NO_VALID_CONFIGURATION,
            AudioError::PermissionDenied => AudioErrorCodes::PERMISSION_DENIED,
            AudioError::InvalidArguments { .. } => AudioErrorCodes::INVALID_ARGUMENTS,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::StreamFailure { .. } => AudioErrorCodes::STREAM_FAILURE,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::JniInitFailed { .. } => AudioErrorCodes::JNI_INIT_FAILED,
            AudioError::ContextNotInitialized => AudioErrorCodes::CONTEXT_NOT_INITIALIZED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::NoValidConfiguration { attempts } => {
                format!(
                    "Failed to start monitoring: no valid configuration found ({} attempts)",
                    attempts
                )
            }
            AudioError::PermissionDenied => "Microphone permission denied".to_string(),
            AudioError::InvalidArguments { reason } => {
                format!("Invalid arguments: {}", reason)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::StreamFailure { reason } => {
                format!("Audio stream failed: {}", reason)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::JniInitFailed { reason } => {
                format!("JNI call failed: {}", reason)
            }
            AudioError::ContextNotInitialized => {
                "Android context not initialized. Call AudioMonitorContext.init() first.".to_string()
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_codes() {
        assert_eq!(
            AudioError::NoValidConfiguration { attempts: 4 }.code(),
            AudioErrorCodes::NO_VALID_CONFIGURATION
        );
        assert_eq!(
            AudioError::PermissionDenied.code(),
            AudioErrorCodes::PERMISSION_DENIED
        );
        assert_eq!(
            AudioError::InvalidArguments {
                reason: "test".to_string()
            }
            .code(),
            AudioErrorCodes::INVALID_ARGUMENTS
        );
        assert_eq!(
            AudioError::StreamOpenFailed {
                reason: "test".to_string()
            }
            .code(),
            AudioErrorCodes::STREAM_OPEN_FAILED
        );
        assert_eq!(
            AudioError::StreamFailure {
                reason: "test".to_string()
            }
            .code(),
            AudioErrorCodes::STREAM_FAILURE
        );
        assert_eq!(
            AudioError::LockPoisoned {
                component: "test".to_string()
            }
            .code(),
            AudioErrorCodes::LOCK_POISONED
        );
        assert_eq!(
            AudioError::ContextNotInitialized.code(),
            AudioErrorCodes::CONTEXT_NOT_INITIALIZED
        );
    }

    #[test]
    fn test_channel_codes() {
        assert_eq!(
            AudioError::NoValidConfiguration { attempts: 4 }.channel_code(),
            "NO_VALID_CONFIGURATION"
        );
        assert_eq!(AudioError::PermissionDenied.channel_code(), "PERMISSION_DENIED");
        assert_eq!(
            AudioError::InvalidArguments {
                reason: "volume".to_string()
            }
            .channel_code(),
            "INVALID_ARGUMENTS"
        );
        assert_eq!(
            AudioError::HardwareError {
                details: "x".to_string()
            }
            .channel_code(),
            "MONITORING_ERROR"
        );
    }

    #[test]
    fn test_audio_error_messages() {
        let err = AudioError::NoValidConfiguration { attempts: 4 };
        assert!(err.message().contains("no valid configuration"));

        let err = AudioError::PermissionDenied;
        assert!(err.message().contains("permission denied"));

        let err = AudioError::HardwareError {
            details: "test error".to_string(),
        };
        assert_eq!(err.message(), "Hardware error: test error");
    }

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::PermissionDenied;
        let display = format!("{}", err);
        assert!(display.contains("AudioError"));
        assert!(display.contains(&err.code().to_string()));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::other("test io error");
        let audio_err: AudioError = io_err.into();
        match audio_err {
            AudioError::HardwareError { details } => {
                assert!(details.contains("test io error"));
            }
            _ => panic!("Expected HardwareError"),
        }
    }

    #[test]
    fn test_error_code_getters() {
        assert_eq!(AudioErrorCodes::no_valid_configuration(), 1001);
        assert_eq!(AudioErrorCodes::permission_denied(), 1002);
        assert_eq!(AudioErrorCodes::invalid_arguments(), 1003);
        assert_eq!(AudioErrorCodes::stream_open_failed(), 1004);
        assert_eq!(AudioErrorCodes::stream_failure(), 1005);
        assert_eq!(AudioErrorCodes::hardware_error(), 1006);
        assert_eq!(AudioErrorCodes::lock_poisoned(), 1007);
        assert_eq!(AudioErrorCodes::jni_init_failed(), 1008);
        assert_eq!(AudioErrorCodes::context_not_initialized(), 1009);
    }
}
