use actix_web::{HttpResponse, Responder};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static WEBHOOK_DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("webhook_deliveries_total", "Webhook deliveries by response status"),
        &["status"],
    )
    .expect("valid webhook_deliveries_total metric");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("webhook_deliveries_total registered once");
    counter
});

static EVENTS_SYNCED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("events_synced_total", "Escrow events synced by kind and outcome"),
        &["kind", "outcome"],
    )
    .expect("valid events_synced_total metric");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("events_synced_total registered once");
    counter
});

static ENVELOPES_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("envelopes_skipped_total", "Envelopes dropped before sync by reason"),
        &["reason"],
    )
    .expect("valid envelopes_skipped_total metric");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("envelopes_skipped_total registered once");
    counter
});

static PENDING_CLAIMS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("pending_claims", "Claims waiting for their deposit")
        .expect("valid pending_claims metric");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("pending_claims registered once");
    gauge
});

pub fn record_delivery(status: u16) {
    WEBHOOK_DELIVERIES
        .with_label_values(&[&status.to_string()])
        .inc();
}

pub fn record_sync(kind: &str, outcome: &str) {
    EVENTS_SYNCED.with_label_values(&[kind, outcome]).inc();
}

pub fn record_skip(reason: &str) {
    ENVELOPES_SKIPPED.with_label_values(&[reason]).inc();
}

pub fn set_pending_claims(count: i64) {
    PENDING_CLAIMS.set(count);
}

pub async fn metrics() -> impl Responder {
    let encoder = TextEncoder::new();
    let metrics_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metrics_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}
