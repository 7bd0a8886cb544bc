//! Usage accounting on top of the [`QuotaStore`] transaction executor.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use echomind_core::Principal;
use echomind_store::{QuotaStore, StoreError, TxDecision, TxOutcome, UsageRecord};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reservation {
    /// One unit consumed; carries the updated record.
    Reserved(UsageRecord),
    /// Nothing consumed.
    QuotaExceeded(UsageRecord),
    ProfileNotFound,
}

/// Read-check-increment body: never lets `used` pass `limit`.
fn reserve_one(current: Option<&UsageRecord>) -> TxDecision {
    match current {
        Some(record) if !record.is_exhausted() => TxDecision::Commit(UsageRecord {
            used: record.used + 1,
            ..record.clone()
        }),
        _ => TxDecision::Abort,
    }
}

#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn QuotaStore>,
    default_limit: u32,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn QuotaStore>, default_limit: u32) -> Self {
        Self {
            store,
            default_limit,
        }
    }

    /// Consume one unit. No compensating release exists.
    #[instrument(skip_all, fields(principal = %principal))]
    pub fn reserve(&self, principal: &Principal) -> Result<Reservation, StoreError> {
        let outcome = self.store.transact(principal, &reserve_one)?;
        let reservation = match outcome {
            TxOutcome::Committed(record) => Reservation::Reserved(record),
            TxOutcome::Aborted(Some(record)) => Reservation::QuotaExceeded(record),
            TxOutcome::Aborted(None) => Reservation::ProfileNotFound,
        };
        debug!(?reservation, "quota reservation");
        Ok(reservation)
    }

    pub fn usage(&self, principal: &Principal) -> Result<Option<UsageRecord>, StoreError> {
        self.store.get(principal)
    }

    /// Create the principal's record with the default limit if it is missing.
    pub fn provision(&self, principal: &Principal) -> Result<(UsageRecord, bool), StoreError> {
        let (record, created) = self.store.provision(principal, self.default_limit)?;
        if created {
            info!(principal = %principal, limit = record.limit, "usage profile provisioned");
        }
        Ok((record, created))
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }
}
