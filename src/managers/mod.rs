// Managers Module
//
// Each manager handles one specific concern:
// - MonitorManager: monitoring session lifecycle, volume and queries

pub mod monitor_manager;

pub use monitor_manager::{EngineState, MonitorManager};
