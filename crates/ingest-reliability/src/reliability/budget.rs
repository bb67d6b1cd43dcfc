//! Process-wide retry budget
//!
//! Every retry (any attempt after the first) must spend one unit. Once the
//! budget reaches zero, failing tasks are dead-lettered instead of retried.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hard ceiling on total retries shared by all workers
#[derive(Debug)]
pub struct RetryBudget {
    total: u64,
    remaining: AtomicU64,
}

impl RetryBudget {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            remaining: AtomicU64::new(total),
        }
    }

    /// Spend one retry; returns false when the budget is exhausted
    pub fn try_spend(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn spent(&self) -> u64 {
        self.total - self.remaining()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_spend_until_exhausted() {
        let budget = RetryBudget::new(2);
        assert!(budget.try_spend());
        assert!(budget.try_spend());
        assert!(!budget.try_spend());
        assert!(budget.is_exhausted());
        assert_eq!(budget.spent(), 2);
    }

    #[test]
    fn test_zero_budget_never_spends() {
        let budget = RetryBudget::new(0);
        assert!(!budget.try_spend());
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn test_concurrent_spend_never_overdraws() {
        let budget = Arc::new(RetryBudget::new(100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let budget = Arc::clone(&budget);
                std::thread::spawn(move || (0..50).filter(|_| budget.try_spend()).count())
            })
            .collect();

        let spent: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(spent, 100);
        assert_eq!(budget.remaining(), 0);
    }
}
