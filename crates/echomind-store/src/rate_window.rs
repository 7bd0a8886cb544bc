//! Sliding-window admission log.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use echomind_core::Principal;

use crate::error::StoreError;

/// Result of a single check-and-record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowDecision {
    /// Recorded. `remaining` admissions are left in the current window.
    Admitted { remaining: u32 },
    /// Not recorded. The oldest admission leaves the window after `retry_after`.
    Rejected { retry_after: Duration },
}

/// Windowed request counter.
///
/// `check_and_record` must be atomic per principal: two concurrent calls
/// never both observe the last free slot.
pub trait RateLimitStore: Send + Sync {
    fn check_and_record(
        &self,
        principal: &Principal,
        now: Instant,
        window: Duration,
        capacity: u32,
    ) -> Result<WindowDecision, StoreError>;

    /// Drop principals with no admission inside the window. Returns how many
    /// were removed.
    fn prune(&self, now: Instant, window: Duration) -> usize;
}

/// Process-local window log. Each principal's log sits behind its shard
/// lock for the duration of a check.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    windows: DashMap<Principal, VecDeque<Instant>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked_principals(&self) -> usize {
        self.windows.len()
    }
}

fn evict_expired(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while log
        .front()
        .is_some_and(|t| now.saturating_duration_since(*t) >= window)
    {
        let _ = log.pop_front();
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn check_and_record(
        &self,
        principal: &Principal,
        now: Instant,
        window: Duration,
        capacity: u32,
    ) -> Result<WindowDecision, StoreError> {
        let mut log = self.windows.entry(principal.clone()).or_default();
        evict_expired(&mut log, now, window);

        let capacity = capacity as usize;
        if log.len() >= capacity {
            let retry_after = log
                .front()
                .map(|oldest| window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(window);
            return Ok(WindowDecision::Rejected { retry_after });
        }

        log.push_back(now);
        let remaining = u32::try_from(capacity - log.len()).unwrap_or(u32::MAX);
        Ok(WindowDecision::Admitted { remaining })
    }

    fn prune(&self, now: Instant, window: Duration) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, log| {
            evict_expired(log, now, window);
            !log.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }
}
