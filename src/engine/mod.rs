//! Engine module housing the reusable monitoring core.
//!
//! This module exposes trait-based platform backends (`backend`) and the
//! `EngineHandle` orchestration layer (`core`) shared by the FRB API and the
//! CLI.

pub mod backend;
pub mod core;

#[cfg(target_os = "android")]
pub use backend::OboeBackend;
#[cfg(not(target_os = "android"))]
pub use backend::CpalBackend;
#[cfg(target_os = "ios")]
pub use backend::IosBackend;
pub use backend::{
    MockBackend, MockPermissions, PermissionProvider, PermissionStatus, StreamBackend,
};
pub use core::EngineHandle;
