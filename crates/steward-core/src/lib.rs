//! # Steward Core
//! Shared configuration, error type, and the scheduled-task model used by the
//! gateway, scheduler and join-request crates.

pub mod catalog;
pub mod config;
pub mod error;
pub mod task;

pub use catalog::TaskCatalog;
pub use config::StewardConfig;
pub use error::{Result, StewardError};
pub use task::{ScheduledTask, TargetKind, TaskAction, TaskKind, VerificationPolicy, VerifyMode};
