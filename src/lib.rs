// Audio Monitor Core - Rust Audio Engine
// Low-latency microphone-to-speaker passthrough with an adaptive
// configuration ladder

// Module declarations
pub mod api;
pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod managers;
pub mod telemetry;

#[cfg(target_os = "android")]
mod android;

// Re-exports for convenience
pub use api::*;

use std::sync::Once;

static LOGGING: Once = Once::new();

/// Install the tracing subscriber (logcat on Android, stderr elsewhere).
///
/// `log` records are forwarded through tracing-log. Safe to call repeatedly.
pub fn init_logging() {
    LOGGING.call_once(|| {
        #[cfg(target_os = "android")]
        {
            use tracing_subscriber::prelude::*;

            match tracing_android::layer("AudioMonitor") {
                Ok(layer) => {
                    let _ = tracing_subscriber::registry().with(layer).try_init();
                }
                Err(e) => eprintln!("Failed to create android tracing layer: {}", e),
            }
        }

        #[cfg(not(target_os = "android"))]
        {
            let _ = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(std::io::stderr)
                .try_init();
        }
    });
}
