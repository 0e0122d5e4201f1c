// Audio module - configuration ladder, capture/playback sessions and the
// passthrough loop

pub mod ladder;
pub mod latency;
pub mod level;
pub mod passthrough;
pub mod session;

// Re-export commonly used types for convenience
pub use ladder::{select_configuration, AudioConfig, ConfigurationLadder, LatencyTier};
pub use latency::{LatencyEstimate, NOT_MONITORING_MS};
pub use level::{rms_level, LevelMeter, SILENT_LEVEL, UNMETERED_LEVEL};
pub use passthrough::{JoinStatus, LoopOutcome, PassthroughLoop, PassthroughWorker};
pub use session::{Session, SessionSettings, StreamPlan};
