//! Limiter-wide execution counters
//!
//! Counters are plain atomics, updated once per execution outcome and once
//! per scheduled retry. They are observational only: nothing in the retry
//! path reads them.

use crate::retry::RetryOutcome;
use crate::token_budget::BudgetStats;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct LimiterCounters {
    executions: AtomicU64,
    successes: AtomicU64,
    retries: AtomicU64,
    fatal: AtomicU64,
    exhausted: AtomicU64,
    budget_timeouts: AtomicU64,
    cancelled: AtomicU64,
}

impl LimiterCounters {
    pub(crate) fn record_start(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, outcome: RetryOutcome) {
        let counter = match outcome {
            RetryOutcome::Success => &self.successes,
            RetryOutcome::Fatal => &self.fatal,
            RetryOutcome::Exhausted => &self.exhausted,
            RetryOutcome::BudgetTimeout => &self.budget_timeouts,
            RetryOutcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.executions,
            &self.successes,
            &self.retries,
            &self.fatal,
            &self.exhausted,
            &self.budget_timeouts,
            &self.cancelled,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, budget: BudgetStats) -> LimiterStats {
        LimiterStats {
            executions: self.executions.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            fatal: self.fatal.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            budget_timeouts: self.budget_timeouts.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            budget,
        }
    }
}

/// Snapshot of a limiter's activity since creation or the last reset
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterStats {
    /// Executions started
    pub executions: u64,
    pub successes: u64,
    /// Retries scheduled across all executions
    pub retries: u64,
    pub fatal: u64,
    pub exhausted: u64,
    pub budget_timeouts: u64,
    pub cancelled: u64,
    pub budget: BudgetStats,
}

impl LimiterStats {
    /// Executions that have not reported an outcome yet
    pub fn in_flight(&self) -> u64 {
        let finished = self.successes
            + self.fatal
            + self.exhausted
            + self.budget_timeouts
            + self.cancelled;
        self.executions.saturating_sub(finished)
    }
}
