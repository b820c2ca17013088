//! The Target Manager: maps targets to scanners, enforces
//! the per-process scanner cap, persists per-target configuration, and
//! exposes admin operations.

#![forbid(unsafe_code)]

mod admin;
mod error;
mod manager;
mod patch;
mod spawner;

pub use admin::build_admin_router;
pub use error::{TargetError, TargetResult};
pub use manager::TargetManager;
pub use patch::{validate_patch, ConfigPatch};
pub use spawner::{ScannerHandle, ScannerSpawner};
