//! Deposit store seam.
//!
//! The sync service only talks to [`DepositStore`]. Every write it offers is
//! conditional: documents are inserted only when absent and the claimed
//! transition only fires while the row is still `active`. Postgres provides
//! the production implementation (see `database.rs`); [`MemoryStore`] backs
//! tests and local runs without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shared::{DepositDocument, DepositStats, DepositStatus, PendingClaim};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store call timed out after {0} ms")]
    Timeout(u64),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Timeouts and lost connections may succeed on redelivery; anything
    /// else will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}

impl From<shared::EscrowError> for StoreError {
    fn from(err: shared::EscrowError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Result of the conditional `active -> claimed` write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimTransition {
    /// The row was active and is now claimed.
    Applied { signature: String },
    /// The row was already claimed; nothing changed.
    AlreadyClaimed { signature: String },
    /// The row is in a state a claim cannot move (expired).
    Rejected { signature: String, status: DepositStatus },
    /// No deposit exists for this record address yet.
    Missing,
}

/// Keyset position in the pending-claim listing: `(received_at, record_address)`
/// of the last marker already seen.
pub type PendingCursor = (DateTime<Utc>, String);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DepositStore: Send + Sync {
    /// Inserts the document unless one with the same signature or record
    /// address exists. Returns whether a row was created.
    async fn insert_if_absent(&self, doc: &DepositDocument) -> Result<bool, StoreError>;

    async fn find_by_signature(&self, signature: &str) -> Result<Option<DepositDocument>, StoreError>;

    /// Compare-and-set on status: only an `active` row becomes `claimed`.
    async fn mark_claimed(
        &self,
        record_address: &str,
        claimed_by: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<ClaimTransition, StoreError>;

    /// Stores the marker unless one already exists for the record address.
    async fn put_pending_claim(&self, claim: &PendingClaim) -> Result<(), StoreError>;

    async fn get_pending_claim(&self, record_address: &str) -> Result<Option<PendingClaim>, StoreError>;

    async fn delete_pending_claim(&self, record_address: &str) -> Result<(), StoreError>;

    /// Oldest markers first, ordered by `(received_at, record_address)` and
    /// starting strictly after `after`.
    async fn list_pending_claims(
        &self,
        after: Option<PendingCursor>,
        limit: i64,
    ) -> Result<Vec<PendingClaim>, StoreError>;

    async fn bump_pending_attempts(&self, record_address: &str) -> Result<(), StoreError>;

    /// Newest `hidden_at` first, with the total matching count.
    async fn list_deposits(
        &self,
        status: Option<DepositStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DepositDocument>, i64), StoreError>;

    async fn list_by_wallet(
        &self,
        wallet: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DepositDocument>, i64), StoreError>;

    async fn stats(&self) -> Result<DepositStats, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryTables {
    deposits: HashMap<String, DepositDocument>,
    // record address -> signature
    by_record: HashMap<String, String>,
    pending: HashMap<String, PendingClaim>,
}

/// In-process store. One lock around all tables makes every conditional
/// write atomic, the same guarantee a row lock gives in Postgres.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn deposit_count(&self) -> usize {
        self.tables.lock().deposits.len()
    }

    #[cfg(test)]
    pub fn pending_count(&self) -> usize {
        self.tables.lock().pending.len()
    }
}

fn page(mut docs: Vec<DepositDocument>, limit: i64, offset: i64) -> (Vec<DepositDocument>, i64) {
    docs.sort_by(|a, b| {
        b.hidden_at
            .cmp(&a.hidden_at)
            .then_with(|| a.signature.cmp(&b.signature))
    });
    let total = docs.len() as i64;
    let items = docs
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect();
    (items, total)
}

#[async_trait]
impl DepositStore for MemoryStore {
    async fn insert_if_absent(&self, doc: &DepositDocument) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock();
        if tables.deposits.contains_key(&doc.signature)
            || tables.by_record.contains_key(doc.record_address())
        {
            return Ok(false);
        }
        tables
            .by_record
            .insert(doc.record_address().to_string(), doc.signature.clone());
        tables.deposits.insert(doc.signature.clone(), doc.clone());
        Ok(true)
    }

    async fn find_by_signature(&self, signature: &str) -> Result<Option<DepositDocument>, StoreError> {
        Ok(self.tables.lock().deposits.get(signature).cloned())
    }

    async fn mark_claimed(
        &self,
        record_address: &str,
        claimed_by: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<ClaimTransition, StoreError> {
        let mut tables = self.tables.lock();
        let Some(signature) = tables.by_record.get(record_address).cloned() else {
            return Ok(ClaimTransition::Missing);
        };
        let Some(doc) = tables.deposits.get_mut(&signature) else {
            return Err(StoreError::Corrupt(format!(
                "record index points at missing deposit {signature}"
            )));
        };
        Ok(match doc.status {
            DepositStatus::Active => {
                doc.status = DepositStatus::Claimed;
                doc.claimed_at = Some(claimed_at);
                doc.claimed_by = Some(claimed_by.to_string());
                doc.updated_at = Utc::now();
                ClaimTransition::Applied { signature }
            }
            DepositStatus::Claimed => ClaimTransition::AlreadyClaimed { signature },
            status => ClaimTransition::Rejected { signature, status },
        })
    }

    async fn put_pending_claim(&self, claim: &PendingClaim) -> Result<(), StoreError> {
        self.tables
            .lock()
            .pending
            .entry(claim.record_address.clone())
            .or_insert_with(|| claim.clone());
        Ok(())
    }

    async fn get_pending_claim(&self, record_address: &str) -> Result<Option<PendingClaim>, StoreError> {
        Ok(self.tables.lock().pending.get(record_address).cloned())
    }

    async fn delete_pending_claim(&self, record_address: &str) -> Result<(), StoreError> {
        self.tables.lock().pending.remove(record_address);
        Ok(())
    }

    async fn list_pending_claims(
        &self,
        after: Option<PendingCursor>,
        limit: i64,
    ) -> Result<Vec<PendingClaim>, StoreError> {
        let mut claims: Vec<_> = self
            .tables
            .lock()
            .pending
            .values()
            .filter(|c| {
                after.as_ref().map_or(true, |(at, address)| {
                    (c.received_at, &c.record_address) > (*at, address)
                })
            })
            .cloned()
            .collect();
        claims.sort_by(|a, b| {
            a.received_at
                .cmp(&b.received_at)
                .then_with(|| a.record_address.cmp(&b.record_address))
        });
        claims.truncate(limit.max(0) as usize);
        Ok(claims)
    }

    async fn bump_pending_attempts(&self, record_address: &str) -> Result<(), StoreError> {
        if let Some(claim) = self.tables.lock().pending.get_mut(record_address) {
            claim.attempts = claim.attempts.saturating_add(1);
        }
        Ok(())
    }

    async fn list_deposits(
        &self,
        status: Option<DepositStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DepositDocument>, i64), StoreError> {
        let docs = self
            .tables
            .lock()
            .deposits
            .values()
            .filter(|d| status.map_or(true, |s| d.status == s))
            .cloned()
            .collect();
        Ok(page(docs, limit, offset))
    }

    async fn list_by_wallet(
        &self,
        wallet: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DepositDocument>, i64), StoreError> {
        let docs = self
            .tables
            .lock()
            .deposits
            .values()
            .filter(|d| d.wallet_address == wallet)
            .cloned()
            .collect();
        Ok(page(docs, limit, offset))
    }

    async fn stats(&self) -> Result<DepositStats, StoreError> {
        let tables = self.tables.lock();
        let mut stats = DepositStats {
            pending_claims: tables.pending.len() as i64,
            ..DepositStats::default()
        };
        for doc in tables.deposits.values() {
            let amount = u128::from(doc.amount);
            stats.total += 1;
            stats.total_amount += amount;
            match doc.status {
                DepositStatus::Active => {
                    stats.active += 1;
                    stats.active_amount += amount;
                }
                DepositStatus::Claimed => stats.claimed += 1,
                DepositStatus::Expired => stats.expired += 1,
            }
        }
        Ok(stats)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
