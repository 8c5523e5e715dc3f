//! Denormalized-hierarchy repair: re-propagate parent fields to children.
//!
//! Two ordered sub-tasks: serie → product `brand_id`, then product →
//! variant `brand_id`/`serie_id`. The out-of-date predicate itself is the
//! resumable state; abandoned candidates stay detectable next cycle, so no
//! cursor is persisted.

use std::collections::HashSet;

use super::{CycleContext, Phase};
use crate::daemon::report::PhaseStats;
use crate::store::ParentRow;

pub struct ChainRepair {
    batch_limit: usize,
}

impl ChainRepair {
    pub fn new(batch_limit: usize) -> Self {
        Self { batch_limit }
    }

    fn repair_product_brands(
        &self,
        cx: &mut CycleContext<'_>,
        stats: &mut PhaseStats,
    ) -> crate::Result<bool> {
        let candidates = cx.store.products_with_stale_brand(self.batch_limit)?;
        let mut seen_parents = HashSet::new();

        for candidate in &candidates {
            if cx.budget.running_late() {
                return Ok(true);
            }
            if !seen_parents.insert(candidate.parent_id) {
                continue;
            }

            let parent = match cx.store.parent_row(candidate.parent_id) {
                Ok(Some(parent)) => parent,
                Ok(None) => {
                    // Serie deleted since the candidate query ran.
                    stats.skipped += 1;
                    continue;
                }
                Err(err) => {
                    stats.failed += 1;
                    cx.report.record_error(self.name(), err.to_string());
                    continue;
                }
            };

            match cx.store.set_children_brand(parent.id, parent.brand_id) {
                Ok(affected) => {
                    stats.processed += 1;
                    stats.affected += affected;
                }
                Err(err) => {
                    stats.failed += 1;
                    cx.report.record_error(self.name(), err.to_string());
                }
            }
        }
        Ok(false)
    }

    fn repair_variant_chains(
        &self,
        cx: &mut CycleContext<'_>,
        stats: &mut PhaseStats,
    ) -> crate::Result<bool> {
        let candidates = cx.store.variants_with_stale_chain(self.batch_limit)?;
        // One-slot cache: consecutive rows under the same product avoid a
        // refetch.
        let mut last_parent: Option<ParentRow> = None;

        for candidate in &candidates {
            if cx.budget.running_late() {
                return Ok(true);
            }

            let parent = match &last_parent {
                Some(parent) if parent.id == candidate.parent_id => parent.clone(),
                _ => match cx.store.parent_row(candidate.parent_id) {
                    Ok(Some(parent)) => {
                        last_parent = Some(parent.clone());
                        parent
                    }
                    Ok(None) => {
                        stats.skipped += 1;
                        continue;
                    }
                    Err(err) => {
                        stats.failed += 1;
                        cx.report.record_error(self.name(), err.to_string());
                        continue;
                    }
                },
            };

            match cx
                .store
                .set_children_chain(parent.id, parent.brand_id, parent.serie_id)
            {
                Ok(affected) => {
                    stats.processed += 1;
                    stats.affected += affected;
                }
                Err(err) => {
                    stats.failed += 1;
                    cx.report.record_error(self.name(), err.to_string());
                }
            }
        }
        Ok(false)
    }
}

impl Phase for ChainRepair {
    fn name(&self) -> &'static str {
        "chain-repair"
    }

    fn run(&mut self, cx: &mut CycleContext<'_>) -> crate::Result<()> {
        let mut stats = PhaseStats::default();

        let interrupted = self.repair_product_brands(cx, &mut stats)?;
        if !interrupted {
            self.repair_variant_chains(cx, &mut stats)?;
        }

        cx.report.add_chain_affected(stats.affected);
        cx.report.merge(self.name(), stats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::report::CycleReport;
    use crate::lock::AdvisoryLocks;
    use crate::session::SessionContext;
    use crate::store::ChainCandidate;
    use crate::test_harness::{MemoryStore, NeverLate, ScriptedRenderer, TripBudget};

    fn candidate(id: i64, parent_id: i64) -> ChainCandidate {
        ChainCandidate {
            id,
            parent_id,
            brand_id: None,
            serie_id: None,
        }
    }

    fn run_phase(store: &MemoryStore, budget: &mut dyn crate::daemon::budget::Budget) -> CycleReport {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = SessionContext::new(dir.path());
        let mut locks = AdvisoryLocks::new(&session);
        let renderer = ScriptedRenderer::new();
        let mut report = CycleReport::new(0);
        ChainRepair::new(500)
            .run(&mut CycleContext {
                store,
                renderer: &renderer,
                locks: &mut locks,
                budget,
                report: &mut report,
            })
            .expect("phase run");
        report
    }

    #[test]
    fn each_distinct_serie_is_fetched_and_repaired_once() {
        let store = MemoryStore::new();
        store.push_parent(10, Some(1), None);
        store.push_parent(20, Some(2), None);
        {
            let mut state = store.state();
            state.product_candidates.push(candidate(1, 10));
            state.product_candidates.push(candidate(2, 10));
            state.product_candidates.push(candidate(3, 20));
        }

        let report = run_phase(&store, &mut NeverLate);

        let state = store.state();
        assert_eq!(state.parent_fetches.get(&10), Some(&1));
        assert_eq!(state.parent_fetches.get(&20), Some(&1));
        assert_eq!(state.brand_updates, vec![(10, Some(1)), (20, Some(2))]);
        assert!(state.product_candidates.is_empty());
        assert_eq!(report.chain_affected(), 3);
    }

    #[test]
    fn variant_repair_reuses_the_last_fetched_parent() {
        let store = MemoryStore::new();
        store.push_parent(7, Some(1), Some(4));
        store.push_parent(8, Some(2), Some(5));
        {
            let mut state = store.state();
            // Consecutive rows under parent 7, then one under 8.
            state.variant_candidates.push(candidate(1, 7));
            state.variant_candidates.push(candidate(2, 7));
            state.variant_candidates.push(candidate(3, 8));
        }

        run_phase(&store, &mut NeverLate);

        let state = store.state();
        assert_eq!(state.parent_fetches.get(&7), Some(&1));
        assert_eq!(state.parent_fetches.get(&8), Some(&1));
        assert_eq!(state.chain_updates[0], (7, Some(1), Some(4)));
        assert_eq!(*state.chain_updates.last().expect("updates"), (8, Some(2), Some(5)));
        assert!(state.variant_candidates.is_empty());
    }

    #[test]
    fn deleted_parent_is_skipped_not_fatal() {
        let store = MemoryStore::new();
        store.push_parent(20, Some(2), None);
        {
            let mut state = store.state();
            state.product_candidates.push(candidate(1, 99));
            state.product_candidates.push(candidate(2, 20));
        }

        let report = run_phase(&store, &mut NeverLate);

        let stats = report.stats("chain-repair").expect("stats");
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.state().brand_updates, vec![(20, Some(2))]);
    }

    #[test]
    fn tight_budget_abandons_remaining_candidates() {
        let store = MemoryStore::new();
        for id in 1..=4 {
            store.push_parent(id * 10, Some(id), None);
            store.state().product_candidates.push(candidate(id, id * 10));
        }

        run_phase(&store, &mut TripBudget::after(2));

        let state = store.state();
        assert_eq!(state.brand_updates.len(), 2);
        // Abandoned rows remain detectable by the predicate next cycle.
        assert_eq!(state.product_candidates.len(), 2);
        assert!(state.chain_updates.is_empty());
    }

    #[test]
    fn affected_totals_flow_into_the_report() {
        let store = MemoryStore::new();
        store.push_parent(10, Some(1), None);
        store.push_parent(7, Some(1), Some(4));
        {
            let mut state = store.state();
            state.product_candidates.push(candidate(1, 10));
            state.variant_candidates.push(candidate(2, 7));
            state.variant_candidates.push(candidate(3, 7));
        }

        let report = run_phase(&store, &mut NeverLate);
        assert_eq!(report.chain_affected(), 3);
        let stats = report.stats("chain-repair").expect("stats");
        assert_eq!(stats.affected, 3);
    }
}
