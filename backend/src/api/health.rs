use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::services::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub store: String,
    pub cached_deposits: u64,
}

static START_TIME: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();

/// Liveness plus a round trip to the deposit store. Answers 503 while the
/// store is unreachable so load balancers stop routing webhook traffic here.
pub async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let start_time = START_TIME.get_or_init(std::time::Instant::now);
    let uptime = start_time.elapsed().as_secs();

    let (status, store) = match state.sync.bounded("ping", state.sync.store().ping()).await {
        Ok(()) => ("healthy", "ok".to_string()),
        Err(e) => {
            tracing::warn!("Health check could not reach the deposit store: {}", e);
            ("degraded", e.to_string())
        }
    };

    let body = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        store,
        cached_deposits: state.cache.entry_count(),
    };

    if status == "healthy" {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
