//! Stale-queue drain: re-render elements flagged stale by mutation code.

use std::collections::HashSet;

use super::{CycleContext, Phase};
use crate::daemon::report::PhaseStats;

pub struct StaleCacheWarmup {
    batch_limit: usize,
}

impl StaleCacheWarmup {
    pub fn new(batch_limit: usize) -> Self {
        Self { batch_limit }
    }
}

impl Phase for StaleCacheWarmup {
    fn name(&self) -> &'static str {
        "stale-cache-warmup"
    }

    /// Queue rows are removed once visited, success or failure; re-flagging
    /// is the retry path. The queue itself is the cursor: aborting on a
    /// tight budget leaves unvisited rows eligible next cycle.
    fn run(&mut self, cx: &mut CycleContext<'_>) -> crate::Result<()> {
        let mut stats = PhaseStats::default();
        let entries = cx.store.stale_entries(self.batch_limit)?;

        let mut seen = HashSet::new();
        let mut interrupted = false;
        for entry in &entries {
            if cx.budget.running_late() {
                interrupted = true;
                break;
            }

            let first_occurrence = seen.insert(entry.slug.clone());
            if first_occurrence && entry.in_cache {
                match cx.renderer.warm_element(&entry.slug) {
                    Ok(()) => stats.processed += 1,
                    Err(err) => {
                        stats.failed += 1;
                        cx.report.record_error(self.name(), err.to_string());
                    }
                }
            } else {
                // Duplicate slug, or the element is not cached at all and
                // will render lazily on the next real request.
                stats.skipped += 1;
            }

            if let Err(err) = cx.store.remove_stale_entry(&entry.slug, &entry.instance_id) {
                cx.report.record_error(self.name(), err.to_string());
            }
        }

        if !interrupted {
            match cx.store.dedup_cache() {
                Ok(n) => stats.deduped += n,
                Err(err) => cx.report.record_error(self.name(), err.to_string()),
            }
        }

        cx.report.merge(self.name(), stats);
        Ok(())
    }
}
