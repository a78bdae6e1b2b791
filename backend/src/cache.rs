use std::time::Duration;

use moka::future::Cache as MokaCache;
use shared::{DepositDocument, DepositStats};

/// Read-through cache in front of the store. Only hits are cached; the sync
/// service invalidates a signature after every write that touches it.
#[derive(Clone)]
pub struct Cache {
    pub deposits: MokaCache<String, DepositDocument>,
    pub stats_cache: MokaCache<String, DepositStats>,
}

impl Cache {
    pub fn new(max_capacity: u64, ttl_seconds: u64) -> Self {
        Self {
            deposits: MokaCache::builder()
                .max_capacity(max_capacity)
                .time_to_live(Duration::from_secs(ttl_seconds))
                .build(),

            stats_cache: MokaCache::builder()
                .max_capacity(1)
                .time_to_live(Duration::from_secs(ttl_seconds))
                .build(),
        }
    }

    pub async fn get_deposit(&self, signature: &str) -> Option<DepositDocument> {
        self.deposits.get(signature).await
    }

    pub async fn set_deposit(&self, doc: DepositDocument) {
        self.deposits.insert(doc.signature.clone(), doc).await;
    }

    /// Drops the document and the aggregate stats it contributes to.
    pub async fn invalidate_deposit(&self, signature: &str) {
        self.deposits.invalidate(signature).await;
        self.stats_cache.invalidate("stats").await;
    }

    pub async fn get_stats(&self) -> Option<DepositStats> {
        self.stats_cache.get("stats").await
    }

    pub async fn set_stats(&self, stats: DepositStats) {
        self.stats_cache.insert("stats".to_string(), stats).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.deposits.entry_count()
    }
}
