//! Microphone permission checks.
//!
//! The engine never prompts. The hosting app requests the microphone
//! permission through its own UI flow; the engine only checks the current
//! status before touching the configuration ladder. The iOS provider lives
//! next to the iOS session code.

use crate::error::AudioError;

/// Microphone permission status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

/// Answers whether the microphone may be opened.
pub trait PermissionProvider: Send + Sync {
    fn record_permission(&self) -> Result<PermissionStatus, AudioError>;
}

/// Desktop hosts have no runtime microphone permission model.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeGranted;

impl PermissionProvider for AssumeGranted {
    fn record_permission(&self) -> Result<PermissionStatus, AudioError> {
        Ok(PermissionStatus::Granted)
    }
}

/// Queries `Context.checkSelfPermission(RECORD_AUDIO)` through JNI.
#[cfg(target_os = "android")]
#[derive(Debug, Default, Clone, Copy)]
pub struct AndroidPermissions;

#[cfg(target_os = "android")]
impl PermissionProvider for AndroidPermissions {
    fn record_permission(&self) -> Result<PermissionStatus, AudioError> {
        use jni::objects::JValue;

        const PERMISSION_GRANTED: i32 = 0;

        let result = crate::android::with_env(|env, context| {
            let permission = env.new_string("android.permission.RECORD_AUDIO")?;
            env.call_method(
                context,
                "checkSelfPermission",
                "(Ljava/lang/String;)I",
                &[JValue::Object(&permission)],
            )?
            .i()
        })?;

        if result == PERMISSION_GRANTED {
            Ok(PermissionStatus::Granted)
        } else {
            Ok(PermissionStatus::Denied)
        }
    }
}
