//! App - application layer.
//!
//! Wires the ports together:
//! - **MergerConfig**: scheduler tuning knobs
//! - **MergerBuilder / Merger**: fail-fast wiring plus the submission,
//!   inspection, and administration surface
//! - **Scheduler**: the due-key poll loop and batch dispatch
//! - **PendingCounts**: status view for CLIs and dashboards

pub mod builder;
pub mod config;
pub mod scheduler;
pub mod status;

pub use self::builder::{BuildError, Merger, MergerBuilder};
pub use self::config::MergerConfig;
pub use self::scheduler::{Scheduler, SchedulerHandle};
pub use self::status::PendingCounts;
