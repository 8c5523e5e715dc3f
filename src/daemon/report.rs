//! Per-cycle accumulated counters and errors, flushed once per cycle.

use std::time::Duration;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PhaseStats {
    /// Items whose derived state was regenerated.
    pub processed: u64,
    /// Items visited but intentionally left alone (not in cache, duplicate
    /// slug, fresh file, lock contention).
    pub skipped: u64,
    /// Items whose regeneration failed; never retried within the cycle.
    pub failed: u64,
    /// Rows changed by bulk updates.
    pub affected: u64,
    /// Rows collapsed by dedup passes.
    pub deduped: u64,
}

impl PhaseStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Everything one cycle accumulates before the scheduler flushes it.
///
/// Non-fatal errors land here instead of aborting phases; the scheduler
/// emits them in one batch at the cycle boundary.
#[derive(Debug, Default)]
pub struct CycleReport {
    cycle: u64,
    phases: Vec<(&'static str, PhaseStats)>,
    errors: Vec<String>,
    chain_affected: u64,
}

impl CycleReport {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            ..Self::default()
        }
    }

    pub fn merge(&mut self, phase: &'static str, stats: PhaseStats) {
        self.phases.push((phase, stats));
    }

    pub fn record_error(&mut self, phase: &str, message: impl Into<String>) {
        self.errors.push(format!("{phase}: {}", message.into()));
    }

    /// Rows fixed by chain repair this cycle; drives the old-cache warmup
    /// fairness quota.
    pub fn add_chain_affected(&mut self, affected: u64) {
        self.chain_affected += affected;
    }

    pub fn chain_affected(&self) -> u64 {
        self.chain_affected
    }

    pub fn stats(&self, phase: &str) -> Option<PhaseStats> {
        self.phases
            .iter()
            .find(|(name, _)| *name == phase)
            .map(|(_, stats)| *stats)
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Emit the accumulated output for this cycle and consume the report.
    pub fn flush(self, elapsed: Duration, over_budget: bool) {
        for error in &self.errors {
            tracing::warn!(cycle = self.cycle, "{error}");
        }
        for (phase, stats) in &self.phases {
            if stats.is_empty() {
                continue;
            }
            tracing::debug!(
                cycle = self.cycle,
                phase,
                processed = stats.processed,
                skipped = stats.skipped,
                failed = stats.failed,
                affected = stats.affected,
                deduped = stats.deduped,
                "phase finished"
            );
        }
        if over_budget {
            tracing::warn!(
                cycle = self.cycle,
                elapsed_ms = elapsed.as_millis() as u64,
                errors = self.errors.len(),
                "cycle exceeded budget"
            );
        } else {
            tracing::info!(
                cycle = self.cycle,
                elapsed_ms = elapsed.as_millis() as u64,
                errors = self.errors.len(),
                "cycle complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_lookup_by_phase_name() {
        let mut report = CycleReport::new(3);
        let stats = PhaseStats {
            processed: 2,
            ..PhaseStats::default()
        };
        report.merge("stale-cache-warmup", stats);
        assert_eq!(report.stats("stale-cache-warmup"), Some(stats));
        assert_eq!(report.stats("chain-repair"), None);
    }

    #[test]
    fn chain_affected_accumulates() {
        let mut report = CycleReport::new(0);
        report.add_chain_affected(7);
        report.add_chain_affected(3);
        assert_eq!(report.chain_affected(), 10);
    }
}
