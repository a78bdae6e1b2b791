use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::{
    monitering::metrics,
    services::{AppState, SyncError},
    store::PendingCursor,
};

const SWEEP_BATCH: i64 = 500;

pub async fn run_reconciler(state: actix_web::web::Data<AppState>) {
    let interval_secs = state.config.reconciliation_interval_seconds;
    let mut interval = time::interval(Duration::from_secs(interval_secs));

    tracing::info!("Pending claim reconciler started (interval: {}s)", interval_secs);

    loop {
        interval.tick().await;

        if let Err(e) = reconciliation_cycle(&state).await {
            tracing::error!("Reconciliation cycle error: {}", e);
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub applied: usize,
    pub waiting: usize,
    pub stale: usize,
    pub errors: usize,
}

pub async fn reconciliation_cycle(state: &AppState) -> Result<CycleReport, ReconcilerError> {
    sweep(state, SWEEP_BATCH).await
}

/// Walks every pending marker oldest first, `batch` at a time, so a backlog
/// of orphans at the head never hides newer markers.
async fn sweep(state: &AppState, batch: i64) -> Result<CycleReport, ReconcilerError> {
    tracing::debug!("Starting pending claim sweep...");
    let store = state.sync.store();
    let warn_after = chrono::Duration::seconds(state.config.pending_claim_warn_seconds);
    let now = Utc::now();
    let mut report = CycleReport::default();
    let mut cursor: Option<PendingCursor> = None;

    loop {
        let page = state
            .sync
            .call("list_pending_claims", || store.list_pending_claims(cursor.clone(), batch))
            .await?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some((last.received_at, last.record_address.clone()));
        let full_page = page.len() as i64 == batch;
        report.scanned += page.len();

        for claim in page {
            match state.sync.apply_pending(&claim).await {
                Ok(Some(outcome)) => {
                    report.applied += 1;
                    tracing::info!(
                        signature = %claim.claim_signature,
                        record = %claim.record_address,
                        outcome = outcome.as_str(),
                        "Pending claim applied"
                    );
                }
                Ok(None) => {
                    report.waiting += 1;
                    if let Err(e) = state
                        .sync
                        .bounded("bump_pending_attempts", store.bump_pending_attempts(&claim.record_address))
                        .await
                    {
                        tracing::warn!(record = %claim.record_address, "Failed to bump attempts: {}", e);
                    }
                    if now - claim.received_at >= warn_after {
                        report.stale += 1;
                        tracing::warn!(
                            signature = %claim.claim_signature,
                            record = %claim.record_address,
                            attempts = claim.attempts + 1,
                            received_at = %claim.received_at,
                            "Pending claim still has no matching deposit"
                        );
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(
                        signature = %claim.claim_signature,
                        record = %claim.record_address,
                        "Failed to apply pending claim: {}",
                        e
                    );
                }
            }
        }

        if !full_page {
            break;
        }
    }

    metrics::set_pending_claims((report.waiting + report.errors) as i64);
    tracing::info!(
        "Reconciliation cycle completed: {} pending, {} applied, {} waiting, {} stale, {} errors",
        report.scanned,
        report.applied,
        report.waiting,
        report.stale,
        report.errors
    );
    Ok(report)
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    #[error("Failed to list pending claims: {0}")]
    Listing(#[from] SyncError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{tests::{build_state, memory_state}, MockRecordSource},
        store::{tests::StallStore, DepositStore},
    };
    use shared::{ClaimEvent, DepositStatus, PendingClaim};
    use std::sync::Arc;

    fn marker(record: &str, received_at: chrono::DateTime<Utc>) -> PendingClaim {
        let event = ClaimEvent {
            signature: format!("claim-{record}"),
            record_address: record.into(),
            claimed_by: "wallet".into(),
            block_time: None,
            slot: 3,
        };
        PendingClaim::from_event(&event, received_at)
    }

    #[tokio::test]
    async fn sweep_applies_markers_whose_deposit_exists() {
        let (state, store) = memory_state(None);
        let doc = crate::store::tests::document("sig-1", "rec-1", "wallet", 10);
        store.insert_if_absent(&doc).await.unwrap();

        let early = ClaimEvent {
            signature: "c-1".into(),
            record_address: "rec-1".into(),
            claimed_by: "wallet".into(),
            block_time: None,
            slot: 3,
        };
        let orphan = ClaimEvent {
            record_address: "rec-2".into(),
            signature: "c-2".into(),
            ..early.clone()
        };
        let old = Utc::now() - chrono::Duration::hours(2);
        store.put_pending_claim(&PendingClaim::from_event(&early, old)).await.unwrap();
        store.put_pending_claim(&PendingClaim::from_event(&orphan, old)).await.unwrap();

        let report = reconciliation_cycle(&state).await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(report.waiting, 1);
        assert_eq!(report.stale, 1);

        let doc = store.find_by_signature("sig-1").await.unwrap().unwrap();
        assert_eq!(doc.status, DepositStatus::Claimed);

        // the orphan is kept, never dropped
        let kept = store.get_pending_claim("rec-2").await.unwrap().unwrap();
        assert_eq!(kept.attempts, 1);
        assert!(store.get_pending_claim("rec-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_reaches_markers_behind_a_full_page_of_orphans() {
        let (state, store) = memory_state(None);
        let base = Utc::now() - chrono::Duration::minutes(10);
        for (i, record) in ["orphan-0", "orphan-1", "orphan-2", "orphan-3"].iter().enumerate() {
            let at = base + chrono::Duration::seconds(i as i64);
            store.put_pending_claim(&marker(record, at)).await.unwrap();
        }
        // newest marker, the only one whose deposit exists
        let doc = crate::store::tests::document("sig-9", "rec-9", "wallet", 10);
        store.insert_if_absent(&doc).await.unwrap();
        store.put_pending_claim(&marker("rec-9", Utc::now())).await.unwrap();

        let report = sweep(&state, 2).await.unwrap();
        assert_eq!(report.scanned, 5);
        assert_eq!(report.applied, 1);
        assert_eq!(report.waiting, 4);
        assert_eq!(
            store.find_by_signature("sig-9").await.unwrap().unwrap().status,
            DepositStatus::Claimed
        );
        assert_eq!(store.pending_count(), 4);
    }

    #[tokio::test]
    async fn cycle_gives_up_when_the_store_hangs() {
        let state = build_state(None, Arc::new(StallStore), Arc::new(MockRecordSource::new()));

        let result = tokio::time::timeout(Duration::from_secs(5), reconciliation_cycle(&state))
            .await
            .expect("cycle must not hang");
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            ReconcilerError::Listing(SyncError::Store {
                op: "list_pending_claims",
                source: crate::store::StoreError::Timeout(_),
            })
        ));
    }
}
