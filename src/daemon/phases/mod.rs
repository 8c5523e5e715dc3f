//! Ordered, budget-aware units of maintenance work.
//!
//! Every phase is idempotent and interruptible: it checks the shared budget
//! between discrete units of work and leaves anything unvisited eligible
//! for the next cycle. The stale queue and the out-of-date predicates are
//! their own cursors; only the filter scan persists one.

use crate::daemon::budget::Budget;
use crate::daemon::report::CycleReport;
use crate::lock::AdvisoryLocks;
use crate::renderer::Renderer;
use crate::store::Store;

pub mod chain_repair;
pub mod filter_refresh;
pub mod old_warmup;
pub mod stale_warmup;

pub use chain_repair::ChainRepair;
pub use filter_refresh::{FILTER_CURSOR_KEY, FilterCacheRefresh};
pub use old_warmup::OldCacheWarmup;
pub use stale_warmup::StaleCacheWarmup;

/// Everything a phase may touch during one cycle.
pub struct CycleContext<'a> {
    pub store: &'a dyn Store,
    pub renderer: &'a dyn Renderer,
    pub locks: &'a mut AdvisoryLocks,
    pub budget: &'a mut dyn Budget,
    pub report: &'a mut CycleReport,
}

pub trait Phase {
    fn name(&self) -> &'static str;

    /// Run one bounded pass. Per-item errors are recorded in the report and
    /// never abort the pass; an `Err` here means the phase could not run at
    /// all (for example its batch query failed) and the scheduler records
    /// it and moves on.
    fn run(&mut self, cx: &mut CycleContext<'_>) -> crate::Result<()>;
}
