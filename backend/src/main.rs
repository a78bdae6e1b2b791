//! # Treasure Sync Server
//!
//! Keeps an off-chain index of treasure escrow deposits in step with the
//! ledger. A transaction-notification provider posts batches of confirmed
//! transactions to `/webhook`; hides become `active` deposits and claims
//! move them to `claimed`. Deliveries may repeat or arrive out of order.
//!
//! ## Architecture
//!
//! 1. **Configuration**: environment variables (see `Config::from_env()`)
//! 2. **Store**: PostgreSQL deposit store with migrations, or an in-memory
//!    store for local runs (`STORE_BACKEND=memory`)
//! 3. **Cache**: short-lived read cache for deposit lookups
//! 4. **Solana Client**: RPC reads used by the resync endpoint
//! 5. **Background Services**: pending-claim reconciler
//! 6. **HTTP Server**: Actix-web server with CORS, logging, compression
//!
//! ## API Endpoints
//!
//! - `POST /webhook` - Transaction batch receiver
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//! - `/api/v1/deposits/*` - Deposit queries and resync

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use solana_client::nonblocking::rpc_client::RpcClient as AsyncRpcClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cache;
mod config;
mod database;
mod monitering;
mod services;
mod store;

use crate::{
    cache::Cache,
    config::{Config, StoreBackend},
    database::Database,
    services::{pending_reconciler, Extractor, SyncService},
    store::{DepositStore, MemoryStore},
};

const CACHE_CAPACITY: u64 = 20_000;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "treasure_sync=debug,actix_web=info".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!("Starting treasure sync service");

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(program_id = %config.program_id, "Configuration loaded");

    let store: Arc<dyn DepositStore> = match &config.store {
        StoreBackend::Postgres { database_url } => {
            let database = Database::new(database_url, config.max_db_connections)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connected");
            database
                .run_migrations()
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Database migrations completed");
            Arc::new(database)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory deposit store; deposits are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let cache = Cache::new(CACHE_CAPACITY, config.cache_ttl_seconds);
    tracing::info!(
        ttl_seconds = config.cache_ttl_seconds,
        "Cache initialized with {} entry capacity",
        CACHE_CAPACITY
    );

    let solana_client = AsyncRpcClient::new(config.solana_rpc_url.clone());
    tracing::info!("Solana RPC client initialized: {}", config.solana_rpc_url);

    let sync = SyncService::new(
        store,
        cache.clone(),
        config.sync,
        config.program_id.to_string(),
        config.default_token_mint.clone(),
    );

    if config.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET is not set; webhook deliveries will not be authenticated");
    }

    let app_state = web::Data::new(services::AppState {
        extractor: Extractor::new(config.program_id),
        config: config.clone(),
        cache,
        sync,
        chain: Arc::new(solana_client),
    });

    let reconcile_state = app_state.clone();
    tokio::spawn(async move {
        pending_reconciler::run_reconciler(reconcile_state).await;
    });
    tracing::info!(
        interval_seconds = config.reconciliation_interval_seconds,
        "Pending-claim reconciler started"
    );

    let bind_address = format!("{}:{}", config.host, config.port);
    tracing::info!("Server listening on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .app_data(web::PayloadConfig::new(16 * 1024 * 1024))
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(cors)
            .route("/health", web::get().to(api::health::health_check))
            .route("/metrics", web::get().to(monitering::metrics::metrics))
            .configure(api::webhook::configure)
            .service(web::scope("/api/v1").configure(api::deposits::configure))
    })
    .workers(num_cpus::get() * 2)
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("HTTP server exited with an error")
}
