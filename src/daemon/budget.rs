//! Cooperative per-cycle time budget.

use std::time::{Duration, Instant};

/// Preemption check handed to every phase.
///
/// Phases call `running_late` between discrete units of work, never
/// mid-unit. Behind a trait so tests can trip lateness at an exact point.
pub trait Budget {
    fn running_late(&mut self) -> bool;
}

/// Wall-budget over a monotonic clock.
#[derive(Debug, Clone)]
pub struct CycleBudget {
    start: Instant,
    max: Duration,
}

impl CycleBudget {
    pub fn start(max: Duration) -> Self {
        Self {
            start: Instant::now(),
            max,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn exceeded(&self) -> bool {
        self.elapsed() > self.max
    }
}

impl Budget for CycleBudget {
    fn running_late(&mut self) -> bool {
        self.exceeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generous_budget_is_not_late() {
        let mut budget = CycleBudget::start(Duration::from_secs(3600));
        assert!(!budget.running_late());
    }

    #[test]
    fn zero_budget_trips_immediately() {
        let mut budget = CycleBudget::start(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(budget.running_late());
    }
}
