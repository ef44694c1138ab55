//! # Steward Scheduler
//!
//! Cron-driven execution of scheduled chat actions.
//!
//! ## Architecture
//! ```text
//! Scheduler (one tokio timer per task)
//!   └── on fire → TaskExecutor::on_fire(name)
//!                   ├── global spacing guard (skip if too soon)
//!                   ├── dispatch::plan(task) → gateway commands
//!                   ├── send, retrying the whole plan on error
//!                   └── RecordStore: <records>/<task>/<id>.json
//! ```

pub mod cron;
pub mod dispatch;
pub mod engine;
pub mod executor;
pub mod records;

pub use dispatch::{PlannedAction, format_duration, plan};
pub use engine::{ScheduledEntry, Scheduler};
pub use executor::{FireOutcome, RetryPolicy, TaskExecutor};
pub use records::{ExecutionRecord, RecordStore};
