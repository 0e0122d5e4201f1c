//! Android entry points.
//!
//! `JNI_OnLoad` installs logging when the library is loaded. The hosting
//! activity then registers its `Context` once through
//! `AudioMonitorContext.init(context)`, which also initializes `ndk-context`
//! for oboe-rs. `with_env` gives the backends a JNI environment and that
//! context for buffer-size and permission queries.

use std::ffi::c_void;

use jni::objects::{GlobalRef, JClass, JObject};
use jni::sys::{jboolean, jint, JNI_FALSE, JNI_TRUE, JNI_VERSION_1_6};
use jni::{JNIEnv, JavaVM};
use once_cell::sync::OnceCell;

use crate::error::{log_audio_error, AudioError};

struct AndroidContext {
    vm: JavaVM,
    context: GlobalRef,
}

static CONTEXT: OnceCell<AndroidContext> = OnceCell::new();

/// JNI_OnLoad is called when the native library is loaded by Android
#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    crate::init_logging();
    log::info!("[Android] JNI_OnLoad called");
    JNI_VERSION_1_6
}

/// `io.audiomonitor.AudioMonitorContext.init(Context)`
#[no_mangle]
pub extern "system" fn Java_io_audiomonitor_AudioMonitorContext_init(
    mut env: JNIEnv,
    _class: JClass,
    context: JObject,
) -> jboolean {
    match register_context(&mut env, &context) {
        Ok(()) => JNI_TRUE,
        Err(err) => {
            log_audio_error(&err, "register_context");
            JNI_FALSE
        }
    }
}

fn register_context(env: &mut JNIEnv, context: &JObject) -> Result<(), AudioError> {
    if CONTEXT.get().is_some() {
        return Ok(());
    }

    let vm = env.get_java_vm().map_err(jni_err)?;
    let global = env.new_global_ref(context).map_err(jni_err)?;
    let vm_ptr = vm.get_java_vm_pointer() as *mut c_void;
    let context_ptr = global.as_obj().as_raw() as *mut c_void;

    // Only the caller that wins the race hands the pointers to ndk-context.
    if CONTEXT.set(AndroidContext { vm, context: global }).is_ok() {
        // SAFETY: the VM outlives the process and the global reference is
        // kept alive in CONTEXT forever.
        unsafe { ndk_context::initialize_android_context(vm_ptr, context_ptr) };
        log::info!("[Android] Application context registered");
    }
    Ok(())
}

/// Run `f` with an attached JNI environment and the registered context.
///
/// # Errors
/// `ContextNotInitialized` before `AudioMonitorContext.init` ran,
/// `JniInitFailed` for any JNI failure (a pending Java exception is cleared).
pub(crate) fn with_env<T>(
    f: impl FnOnce(&mut JNIEnv, &JObject) -> jni::errors::Result<T>,
) -> Result<T, AudioError> {
    let ctx = CONTEXT.get().ok_or(AudioError::ContextNotInitialized)?;
    let mut guard = ctx.vm.attach_current_thread().map_err(jni_err)?;
    let env: &mut JNIEnv = &mut guard;

    match f(env, ctx.context.as_obj()) {
        Ok(value) => Ok(value),
        Err(err) => {
            if env.exception_check().unwrap_or(false) {
                let _ = env.exception_clear();
            }
            Err(jni_err(err))
        }
    }
}

fn jni_err(err: jni::errors::Error) -> AudioError {
    AudioError::JniInitFailed {
        reason: err.to_string(),
    }
}
