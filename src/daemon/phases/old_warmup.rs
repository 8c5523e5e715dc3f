//! Lowest-priority re-warm of aged cache entries.
//!
//! Runs last and yields to the rest of the cycle: rows already fixed by
//! chain repair this cycle are deducted from its quota.

use std::time::Duration;

use super::{CycleContext, Phase};
use crate::daemon::report::PhaseStats;

pub struct OldCacheWarmup {
    quota: usize,
    max_age: Duration,
}

impl OldCacheWarmup {
    pub fn new(quota: usize, max_age: Duration) -> Self {
        Self { quota, max_age }
    }
}

impl Phase for OldCacheWarmup {
    fn name(&self) -> &'static str {
        "old-cache-warmup"
    }

    fn run(&mut self, cx: &mut CycleContext<'_>) -> crate::Result<()> {
        let mut stats = PhaseStats::default();
        let remaining = self
            .quota
            .saturating_sub(cx.report.chain_affected() as usize);

        let mut interrupted = false;
        if remaining > 0 {
            let slugs = cx.store.old_cache_slugs(self.max_age, remaining)?;
            for slug in &slugs {
                if cx.budget.running_late() {
                    interrupted = true;
                    break;
                }
                match cx.renderer.warm_element(slug) {
                    Ok(()) => stats.processed += 1,
                    Err(err) => {
                        stats.failed += 1;
                        cx.report.record_error(self.name(), err.to_string());
                    }
                }
            }
        }

        if !interrupted {
            match cx.store.dedup_search_index() {
                Ok(n) => stats.deduped += n,
                Err(err) => cx.report.record_error(self.name(), err.to_string()),
            }
        }

        cx.report.merge(self.name(), stats);
        Ok(())
    }
}
