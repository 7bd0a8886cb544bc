//! Per-principal usage records and their transaction executor.
//!
//! Callers never read-modify-write a [`UsageRecord`] themselves. They hand a
//! body to [`QuotaStore::transact`], which runs it against the current
//! record and commits its decision atomically, re-running the body when a
//! concurrent writer got there first.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use echomind_core::Principal;

use crate::database::Database;
use crate::error::StoreError;

/// Upper bound on body re-runs before a transaction gives up with
/// [`StoreError::Conflict`].
pub const MAX_TX_ATTEMPTS: usize = 128;

/// Request counter for one principal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub principal: Principal,
    pub used: u32,
    pub limit: u32,
}

impl UsageRecord {
    pub fn new(principal: Principal, limit: u32) -> Self {
        Self {
            principal,
            used: 0,
            limit,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }
}

/// What a transaction body wants to happen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxDecision {
    /// Replace the record with this value.
    Commit(UsageRecord),
    /// Leave the store untouched.
    Abort,
}

/// What actually happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxOutcome {
    /// The body's record was written.
    Committed(UsageRecord),
    /// The body aborted; carries the record it saw, if any.
    Aborted(Option<UsageRecord>),
}

/// Transactional storage for usage records.
pub trait QuotaStore: Send + Sync {
    /// Run `body` against the current record and apply its decision
    /// atomically. The body may run more than once and must be pure.
    fn transact(
        &self,
        principal: &Principal,
        body: &dyn Fn(Option<&UsageRecord>) -> TxDecision,
    ) -> Result<TxOutcome, StoreError>;

    fn get(&self, principal: &Principal) -> Result<Option<UsageRecord>, StoreError>;

    /// Create a record with `used = 0` unless one exists. Returns the stored
    /// record and whether it was created by this call.
    fn provision(
        &self,
        principal: &Principal,
        limit: u32,
    ) -> Result<(UsageRecord, bool), StoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory backend
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct Versioned {
    record: UsageRecord,
    version: u64,
}

/// Lock-free-read usage store keyed by principal.
///
/// Writes are optimistic: a commit only lands if the record's version is
/// still the one the body saw.
#[derive(Default)]
pub struct MemoryQuotaStore {
    records: DashMap<Principal, Versioned>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a record directly. Test and seeding helper; bypasses the executor.
    pub fn insert(&self, record: UsageRecord) {
        let _ = self.records.insert(
            record.principal.clone(),
            Versioned { record, version: 0 },
        );
    }

    fn try_commit(
        &self,
        principal: &Principal,
        seen: Option<&Versioned>,
        next: &UsageRecord,
    ) -> bool {
        match (self.records.entry(principal.clone()), seen) {
            (Entry::Vacant(slot), None) => {
                let _ = slot.insert(Versioned {
                    record: next.clone(),
                    version: 1,
                });
                true
            }
            (Entry::Occupied(mut slot), Some(seen)) if slot.get().version == seen.version => {
                let current = slot.get_mut();
                current.record = next.clone();
                current.version += 1;
                true
            }
            _ => false,
        }
    }
}

impl QuotaStore for MemoryQuotaStore {
    fn transact(
        &self,
        principal: &Principal,
        body: &dyn Fn(Option<&UsageRecord>) -> TxDecision,
    ) -> Result<TxOutcome, StoreError> {
        for attempt in 1..=MAX_TX_ATTEMPTS {
            let snapshot = self.records.get(principal).map(|v| v.value().clone());

            match body(snapshot.as_ref().map(|v| &v.record)) {
                TxDecision::Abort => return Ok(TxOutcome::Aborted(snapshot.map(|v| v.record))),
                TxDecision::Commit(next) => {
                    if self.try_commit(principal, snapshot.as_ref(), &next) {
                        return Ok(TxOutcome::Committed(next));
                    }
                    debug!(principal = %principal, attempt, "usage version moved, retrying");
                }
            }
        }

        warn!(principal = %principal, "usage transaction exhausted retries");
        Err(StoreError::Conflict(format!("usage for {principal}")))
    }

    fn get(&self, principal: &Principal) -> Result<Option<UsageRecord>, StoreError> {
        Ok(self.records.get(principal).map(|v| v.record.clone()))
    }

    fn provision(
        &self,
        principal: &Principal,
        limit: u32,
    ) -> Result<(UsageRecord, bool), StoreError> {
        match self.records.entry(principal.clone()) {
            Entry::Occupied(slot) => Ok((slot.get().record.clone(), false)),
            Entry::Vacant(slot) => {
                let record = UsageRecord::new(principal.clone(), limit);
                let _ = slot.insert(Versioned {
                    record: record.clone(),
                    version: 0,
                });
                Ok((record, true))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite backend
// ─────────────────────────────────────────────────────────────────────────────

pub struct SqliteQuotaStore {
    db: Database,
}

impl SqliteQuotaStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn read_record(
    conn: &rusqlite::Connection,
    principal: &Principal,
) -> Result<Option<UsageRecord>, StoreError> {
    let row = conn
        .query_row(
            "SELECT used, usage_limit FROM usage WHERE principal = ?1",
            [principal.as_str()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;

    row.map(|(used, limit)| {
        let used = u32::try_from(used)
            .map_err(|_| StoreError::Corrupt(format!("used={used} for {principal}")))?;
        let limit = u32::try_from(limit)
            .map_err(|_| StoreError::Corrupt(format!("limit={limit} for {principal}")))?;
        Ok(UsageRecord {
            principal: principal.clone(),
            used,
            limit,
        })
    })
    .transpose()
}

impl QuotaStore for SqliteQuotaStore {
    #[instrument(skip_all, fields(principal = %principal))]
    fn transact(
        &self,
        principal: &Principal,
        body: &dyn Fn(Option<&UsageRecord>) -> TxDecision,
    ) -> Result<TxOutcome, StoreError> {
        for attempt in 1..=MAX_TX_ATTEMPTS {
            let outcome = self.db.with_tx(|tx| {
                let current = read_record(tx, principal)?;
                let next = match body(current.as_ref()) {
                    TxDecision::Abort => return Ok(Some(TxOutcome::Aborted(current))),
                    TxDecision::Commit(next) => next,
                };

                let now = Utc::now().to_rfc3339();
                let changed = match &current {
                    None => tx.execute(
                        "INSERT OR IGNORE INTO usage (principal, used, usage_limit, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?4)",
                        params![principal.as_str(), next.used, next.limit, now],
                    )?,
                    Some(seen) => tx.execute(
                        "UPDATE usage SET used = ?1, usage_limit = ?2, updated_at = ?3
                         WHERE principal = ?4 AND used = ?5 AND usage_limit = ?6",
                        params![
                            next.used,
                            next.limit,
                            now,
                            principal.as_str(),
                            seen.used,
                            seen.limit
                        ],
                    )?,
                };

                Ok((changed == 1).then_some(TxOutcome::Committed(next)))
            })?;

            match outcome {
                Some(outcome) => return Ok(outcome),
                None => debug!(attempt, "usage row moved, retrying"),
            }
        }

        warn!("usage transaction exhausted retries");
        Err(StoreError::Conflict(format!("usage for {principal}")))
    }

    #[instrument(skip_all, fields(principal = %principal))]
    fn get(&self, principal: &Principal) -> Result<Option<UsageRecord>, StoreError> {
        self.db.with_conn(|conn| read_record(conn, principal))
    }

    #[instrument(skip_all, fields(principal = %principal, limit))]
    fn provision(
        &self,
        principal: &Principal,
        limit: u32,
    ) -> Result<(UsageRecord, bool), StoreError> {
        self.db.with_tx(|tx| {
            let now = Utc::now().to_rfc3339();
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO usage (principal, used, usage_limit, created_at, updated_at)
                 VALUES (?1, 0, ?2, ?3, ?3)",
                params![principal.as_str(), limit, now],
            )?;
            let record = read_record(tx, principal)?
                .ok_or_else(|| StoreError::Database(format!("usage row missing for {principal}")))?;
            Ok((record, inserted == 1))
        })
    }
}
