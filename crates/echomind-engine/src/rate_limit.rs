//! Per-principal admission control over a [`RateLimitStore`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use echomind_core::Principal;
use echomind_store::{RateLimitStore, StoreError, WindowDecision};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Rejected { retry_after: Duration },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    window: Duration,
    capacity: u32,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, window: Duration, capacity: u32) -> Self {
        Self {
            store,
            window,
            capacity,
        }
    }

    pub fn admit(&self, principal: &Principal) -> Result<Admission, StoreError> {
        self.admit_at(principal, Instant::now())
    }

    pub fn admit_at(&self, principal: &Principal, now: Instant) -> Result<Admission, StoreError> {
        let decision = self
            .store
            .check_and_record(principal, now, self.window, self.capacity)?;
        Ok(match decision {
            WindowDecision::Admitted { remaining } => Admission::Allowed { remaining },
            WindowDecision::Rejected { retry_after } => {
                debug!(principal = %principal, ?retry_after, "rate window full");
                Admission::Rejected { retry_after }
            }
        })
    }

    /// Forget principals that have been idle for a full window.
    pub fn prune_idle(&self) -> usize {
        self.store.prune(Instant::now(), self.window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echomind_store::MemoryRateLimitStore;

    fn limiter(capacity: u32) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            Duration::from_secs(60),
            capacity,
        )
    }

    #[test]
    fn capacity_plus_one_is_rejected() {
        let limiter = limiter(10);
        let alice = Principal::from_raw("alice");
        let now = Instant::now();
        for _ in 0..10 {
            assert!(matches!(
                limiter.admit_at(&alice, now).unwrap(),
                Admission::Allowed { .. }
            ));
        }
        assert!(matches!(
            limiter.admit_at(&alice, now).unwrap(),
            Admission::Rejected { .. }
        ));
    }

    #[test]
    fn window_expiry_readmits() {
        let limiter = limiter(1);
        let alice = Principal::from_raw("alice");
        let now = Instant::now();
        let _ = limiter.admit_at(&alice, now).unwrap();
        let later = now + Duration::from_secs(61);
        assert!(matches!(
            limiter.admit_at(&alice, later).unwrap(),
            Admission::Allowed { remaining: 0 }
        ));
    }
}
