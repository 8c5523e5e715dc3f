//! The reconciliation daemon.
//!
//! Provides:
//! - Heartbeat-based singleton leadership
//! - The bounded cycle loop
//! - The ordered, budget-aware maintenance phases
//! - Per-cycle reporting

pub mod budget;
pub mod cursor;
pub mod leader;
pub mod phases;
pub mod report;
pub mod run;
pub mod scheduler;

pub use budget::{Budget, CycleBudget};
pub use cursor::ResumePoint;
pub use leader::{LeaderError, LeaderGuard};
pub use report::{CycleReport, PhaseStats};
pub use run::run_daemon;
pub use scheduler::{CycleScheduler, ExitReason};
