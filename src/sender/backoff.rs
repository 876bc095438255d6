//! Reconnection backoff driven by a fixed delay table.

use std::time::Duration;

/// Default delay table, in milliseconds.
pub const DEFAULT_BACKOFF_MS: [u64; 5] = [50, 100, 250, 500, 1000];

/// Ordered delays indexed by the number of consecutive failures.
///
/// Indexing saturates at the last entry so persistent failures settle on the
/// longest delay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    delays: Vec<Duration>,
}

impl BackoffPolicy {
    /// Build a policy from an explicit table. Returns `None` for an empty
    /// table or one whose delays decrease.
    pub fn new(delays: Vec<Duration>) -> Option<Self> {
        if delays.is_empty() || delays.windows(2).any(|w| w[0] > w[1]) {
            return None;
        }
        Some(Self { delays })
    }

    /// Build a policy from a table of milliseconds.
    pub fn from_millis(delays: &[u64]) -> Option<Self> {
        Self::new(delays.iter().copied().map(Duration::from_millis).collect())
    }

    /// Delay for the given consecutive-failure count.
    pub fn delay_for(&self, failures: usize) -> Duration {
        let last = self.delays.len() - 1;
        self.delays[failures.min(last)]
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            delays: DEFAULT_BACKOFF_MS
                .iter()
                .copied()
                .map(Duration::from_millis)
                .collect(),
        }
    }
}

/// Tracks consecutive failures for the worker.
#[derive(Debug)]
pub struct BackoffState {
    policy: BackoffPolicy,
    failures: usize,
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Record a successful unit of work.
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Delay to wait after a failure. Bumps the failure count.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn failures(&self) -> usize {
        self.failures
    }
}
