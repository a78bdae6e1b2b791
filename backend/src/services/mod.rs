pub mod chain_reader;
pub mod envelope;
pub mod extractor;
pub mod pending_reconciler;
pub mod sync;

use std::sync::Arc;

pub use chain_reader::*;
pub use envelope::*;
pub use extractor::*;
pub use sync::*;

use crate::{cache::Cache, config::Config};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub cache: Cache,
    pub sync: SyncService,
    pub extractor: Extractor,
    pub chain: Arc<dyn RecordSource>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{DepositStore, MemoryStore};
    use actix_web::web;

    pub fn build_state(
        secret: Option<&str>,
        store: Arc<dyn DepositStore>,
        chain: Arc<dyn RecordSource>,
    ) -> web::Data<AppState> {
        let mut config = crate::config::tests::test_config();
        config.webhook_secret = secret.map(str::to_string);

        let cache = Cache::new(1_000, config.cache_ttl_seconds);
        let sync = SyncService::new(
            store,
            cache.clone(),
            config.sync,
            config.program_id.to_string(),
            config.default_token_mint.clone(),
        );
        let state = AppState {
            extractor: Extractor::new(config.program_id),
            config,
            cache,
            sync,
            chain,
        };
        web::Data::new(state)
    }

    pub fn state_with(
        secret: Option<&str>,
        chain: Arc<dyn RecordSource>,
    ) -> (web::Data<AppState>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (build_state(secret, store.clone(), chain), store)
    }

    pub fn memory_state(secret: Option<&str>) -> (web::Data<AppState>, Arc<MemoryStore>) {
        state_with(secret, Arc::new(MockRecordSource::new()))
    }
}
