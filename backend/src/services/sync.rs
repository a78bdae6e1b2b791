//! Idempotent synchronization of escrow events into the deposit store.
//!
//! Deliveries are at-least-once and unordered. Hides insert only when absent,
//! claims only move `active -> claimed`, and a claim that outruns its hide
//! leaves a pending marker that whichever side lands second applies.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use shared::{ClaimEvent, DepositDocument, DepositEvent, PendingClaim, SyncEvent};

use crate::{
    cache::Cache,
    config::SyncSettings,
    monitering::metrics,
    store::{ClaimTransition, DepositStore, StoreError},
};

const UNKNOWN_TOKEN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Duplicate,
    Claimed,
    AlreadyClaimed,
    /// Claim stored as a pending marker until its hide arrives.
    Deferred,
    /// The deposit is in a state claims cannot change.
    Ignored,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Duplicate => "duplicate",
            SyncOutcome::Claimed => "claimed",
            SyncOutcome::AlreadyClaimed => "already_claimed",
            SyncOutcome::Deferred => "deferred",
            SyncOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Store error during {op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Store { source, .. } => source.is_retryable(),
        }
    }
}

#[derive(Clone)]
pub struct SyncService {
    store: Arc<dyn DepositStore>,
    cache: Cache,
    settings: SyncSettings,
    program_id: String,
    default_token_mint: Option<String>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn DepositStore>,
        cache: Cache,
        settings: SyncSettings,
        program_id: String,
        default_token_mint: Option<String>,
    ) -> Self {
        Self {
            store,
            cache,
            settings,
            program_id,
            default_token_mint,
        }
    }

    pub fn store(&self) -> &Arc<dyn DepositStore> {
        &self.store
    }

    pub async fn upsert(&self, event: &SyncEvent) -> Result<SyncOutcome, SyncError> {
        let result = match event {
            SyncEvent::Deposit(deposit) => self.sync_hide(deposit).await,
            SyncEvent::Claim(claim) => self.sync_claim(claim).await,
        };
        let outcome = match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "error",
        };
        metrics::record_sync(event.kind(), outcome);
        result
    }

    async fn sync_hide(&self, event: &DepositEvent) -> Result<SyncOutcome, SyncError> {
        let token_type = event
            .token_mint
            .clone()
            .or_else(|| self.default_token_mint.clone())
            .unwrap_or_else(|| UNKNOWN_TOKEN.to_string());
        let doc = DepositDocument::new_active(event, token_type, &self.program_id, Utc::now());

        let created = self
            .call("insert_if_absent", || self.store.insert_if_absent(&doc))
            .await?;

        if created {
            tracing::info!(
                signature = %event.signature,
                wallet = %event.wallet_address,
                amount = event.amount,
                record = %event.record_address,
                "Deposit synced"
            );
            self.cache.invalidate_deposit(&event.signature).await;
        } else {
            tracing::debug!(signature = %event.signature, "Deposit already synced");
        }

        // a claim may have arrived first, on this or an earlier delivery
        let pending = self
            .call("get_pending_claim", || self.store.get_pending_claim(&event.record_address))
            .await?;
        if let Some(pending) = pending {
            self.apply_pending(&pending).await?;
        }

        Ok(if created {
            SyncOutcome::Created
        } else {
            SyncOutcome::Duplicate
        })
    }

    async fn sync_claim(&self, event: &ClaimEvent) -> Result<SyncOutcome, SyncError> {
        let claimed_at = event.claimed_at(Utc::now());
        let transition = self
            .call("mark_claimed", || {
                self.store
                    .mark_claimed(&event.record_address, &event.claimed_by, claimed_at)
            })
            .await?;

        if transition != ClaimTransition::Missing {
            return Ok(self.finish_claim(&transition, &event.signature).await);
        }

        let marker = PendingClaim::from_event(event, Utc::now());
        self.call("put_pending_claim", || self.store.put_pending_claim(&marker))
            .await?;
        tracing::info!(
            signature = %event.signature,
            record = %event.record_address,
            "Claim arrived before its deposit; stored as pending"
        );

        // the hide may have landed between the claim attempt and the marker write
        let transition = self
            .call("mark_claimed", || {
                self.store
                    .mark_claimed(&event.record_address, &event.claimed_by, claimed_at)
            })
            .await?;
        if transition == ClaimTransition::Missing {
            return Ok(SyncOutcome::Deferred);
        }
        self.call("delete_pending_claim", || {
            self.store.delete_pending_claim(&event.record_address)
        })
        .await?;
        Ok(self.finish_claim(&transition, &event.signature).await)
    }

    /// Applies a pending marker if its deposit exists. Returns `None` while
    /// the deposit is still missing; the marker is kept in that case.
    pub async fn apply_pending(&self, pending: &PendingClaim) -> Result<Option<SyncOutcome>, SyncError> {
        let transition = self
            .call("mark_claimed", || {
                self.store.mark_claimed(
                    &pending.record_address,
                    &pending.claimed_by,
                    pending.claimed_at,
                )
            })
            .await?;
        if transition == ClaimTransition::Missing {
            return Ok(None);
        }
        self.call("delete_pending_claim", || {
            self.store.delete_pending_claim(&pending.record_address)
        })
        .await?;
        Ok(Some(self.finish_claim(&transition, &pending.claim_signature).await))
    }

    async fn finish_claim(&self, transition: &ClaimTransition, claim_signature: &str) -> SyncOutcome {
        match transition {
            ClaimTransition::Applied { signature } => {
                tracing::info!(
                    signature = %claim_signature,
                    deposit = %signature,
                    "Deposit marked claimed"
                );
                self.cache.invalidate_deposit(signature).await;
                SyncOutcome::Claimed
            }
            ClaimTransition::AlreadyClaimed { signature } => {
                tracing::debug!(signature = %claim_signature, deposit = %signature, "Deposit already claimed");
                SyncOutcome::AlreadyClaimed
            }
            ClaimTransition::Rejected { signature, status } => {
                tracing::warn!(
                    signature = %claim_signature,
                    deposit = %signature,
                    status = %status,
                    "Claim ignored for deposit in terminal state"
                );
                SyncOutcome::Ignored
            }
            ClaimTransition::Missing => SyncOutcome::Deferred,
        }
    }

    /// Runs one store call under the configured timeout, retrying transient
    /// failures with exponential backoff.
    pub(crate) async fn call<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, SyncError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match self.timed(f()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() || attempt >= self.settings.max_retries {
                return Err(SyncError::Store { op, source: err });
            }

            let backoff = backoff_delay(self.settings.retry_base, attempt);
            tracing::warn!(
                op,
                attempt = attempt + 1,
                max_retries = self.settings.max_retries,
                ?backoff,
                error = %err,
                "Transient store error, retrying"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// A single store call under the configured timeout, no retries. For
    /// callers that answer a request and must not sit in backoff.
    pub(crate) async fn bounded<T, Fut>(&self, op: &'static str, fut: Fut) -> Result<T, SyncError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.timed(fut)
            .await
            .map_err(|source| SyncError::Store { op, source })
    }

    async fn timed<T, Fut>(&self, fut: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.settings.store_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(timeout.as_millis() as u64)),
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(10))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{tests::StallStore, MemoryStore, MockDepositStore};
    use shared::DepositStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    pub fn settings() -> SyncSettings {
        SyncSettings {
            store_timeout: Duration::from_millis(50),
            max_retries: 2,
            retry_base: Duration::from_millis(1),
        }
    }

    pub fn service(store: Arc<dyn DepositStore>) -> SyncService {
        SyncService::new(store, Cache::new(100, 30), settings(), "program".into(), None)
    }

    fn hide(signature: &str, record: &str) -> SyncEvent {
        SyncEvent::Deposit(DepositEvent {
            signature: signature.into(),
            wallet_address: "wallet".into(),
            amount: 500_000_000,
            token_mint: Some("mint".into()),
            record_address: record.into(),
            identifier: 1_718_000_000,
            block_time: Some(1_718_000_010),
            slot: 10,
            fee: 5000,
        })
    }

    fn claim(signature: &str, record: &str) -> SyncEvent {
        SyncEvent::Claim(ClaimEvent {
            signature: signature.into(),
            record_address: record.into(),
            claimed_by: "wallet".into(),
            block_time: Some(1_718_000_500),
            slot: 20,
        })
    }

    #[tokio::test]
    async fn repeated_hides_create_one_active_document() {
        let store = Arc::new(MemoryStore::new());
        let sync = service(store.clone());
        let event = hide("sig-1", "rec-1");

        assert_eq!(sync.upsert(&event).await.unwrap(), SyncOutcome::Created);
        for _ in 0..4 {
            assert_eq!(sync.upsert(&event).await.unwrap(), SyncOutcome::Duplicate);
        }
        assert_eq!(store.deposit_count(), 1);
        let doc = store.find_by_signature("sig-1").await.unwrap().unwrap();
        assert_eq!(doc.status, DepositStatus::Active);
        assert_eq!(doc.token_type, "mint");
    }

    #[tokio::test]
    async fn hide_then_duplicate_claims_end_claimed() {
        let store = Arc::new(MemoryStore::new());
        let sync = service(store.clone());

        sync.upsert(&hide("sig-1", "rec-1")).await.unwrap();
        assert_eq!(sync.upsert(&claim("c-1", "rec-1")).await.unwrap(), SyncOutcome::Claimed);
        assert_eq!(
            sync.upsert(&claim("c-1", "rec-1")).await.unwrap(),
            SyncOutcome::AlreadyClaimed
        );

        let doc = store.find_by_signature("sig-1").await.unwrap().unwrap();
        assert_eq!(doc.status, DepositStatus::Claimed);
        assert_eq!(doc.claimed_by.as_deref(), Some("wallet"));
        assert_eq!(doc.claimed_at.unwrap().timestamp(), 1_718_000_500);
    }

    #[tokio::test]
    async fn claim_before_hide_converges_to_claimed() {
        let store = Arc::new(MemoryStore::new());
        let sync = service(store.clone());

        assert_eq!(sync.upsert(&claim("c-1", "rec-1")).await.unwrap(), SyncOutcome::Deferred);
        assert_eq!(store.pending_count(), 1);
        assert_eq!(store.deposit_count(), 0);

        assert_eq!(sync.upsert(&hide("sig-1", "rec-1")).await.unwrap(), SyncOutcome::Created);
        let doc = store.find_by_signature("sig-1").await.unwrap().unwrap();
        assert_eq!(doc.status, DepositStatus::Claimed);
        assert_eq!(store.pending_count(), 0);

        // redelivery of both changes nothing
        sync.upsert(&claim("c-1", "rec-1")).await.unwrap();
        sync.upsert(&hide("sig-1", "rec-1")).await.unwrap();
        assert_eq!(store.deposit_count(), 1);
        assert_eq!(
            store.find_by_signature("sig-1").await.unwrap().unwrap().status,
            DepositStatus::Claimed
        );
    }

    #[tokio::test]
    async fn claim_that_finds_the_deposit_on_recheck_clears_its_marker() {
        let mut store = MockDepositStore::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        store.expect_mark_claimed().returning(move |_, _, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(ClaimTransition::Missing)
            } else {
                Ok(ClaimTransition::Applied { signature: "sig-1".into() })
            }
        });
        store.expect_put_pending_claim().times(1).returning(|_| Ok(()));
        store.expect_delete_pending_claim().times(1).returning(|_| Ok(()));

        let sync = service(Arc::new(store));
        assert_eq!(sync.upsert(&claim("c-1", "rec-1")).await.unwrap(), SyncOutcome::Claimed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_then_succeed() {
        let mut store = MockDepositStore::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        store.expect_insert_if_absent().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Unavailable("connection reset".into()))
            } else {
                Ok(true)
            }
        });
        store.expect_get_pending_claim().returning(|_| Ok(None));

        let sync = service(Arc::new(store));
        assert_eq!(sync.upsert(&hide("sig-1", "rec-1")).await.unwrap(), SyncOutcome::Created);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_retryable() {
        let mut store = MockDepositStore::new();
        store
            .expect_insert_if_absent()
            .times(3)
            .returning(|_| Err(StoreError::Timeout(50)));

        let sync = service(Arc::new(store));
        let err = sync.upsert(&hide("sig-1", "rec-1")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let mut store = MockDepositStore::new();
        store
            .expect_insert_if_absent()
            .times(1)
            .returning(|_| Err(StoreError::Database("constraint violated".into())));

        let sync = service(Arc::new(store));
        let err = sync.upsert(&hide("sig-1", "rec-1")).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn hanging_store_calls_time_out_and_stay_retryable() {
        let sync = service(Arc::new(StallStore));
        let started = std::time::Instant::now();

        let err = sync.upsert(&hide("sig-1", "rec-1")).await.unwrap_err();
        assert!(err.is_retryable());
        let SyncError::Store { op, source } = &err;
        assert_eq!(*op, "insert_if_absent");
        assert!(matches!(source, StoreError::Timeout(50)));
        // one attempt plus two retries, each cut off at the store timeout
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn bounded_calls_are_not_retried() {
        let mut store = MockDepositStore::new();
        store
            .expect_ping()
            .times(1)
            .returning(|| Err(StoreError::Unavailable("connection refused".into())));
        let store: Arc<dyn DepositStore> = Arc::new(store);
        let sync = service(store.clone());

        let err = sync.bounded("ping", store.ping()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn backoff_doubles_from_the_base() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
    }
}
