//! Webhook receiver.
//!
//! Admission control happens once per delivery; after that every envelope is
//! handled on its own so one malformed transaction cannot sink the batch.
//! The provider redelivers on any 5xx, so 500 is reserved for failures that
//! a redelivery can fix (store timeouts, lost connections).

use actix_web::{web, HttpRequest, HttpResponse};
use bytes::Bytes;
use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    monitering::metrics,
    services::{AppState, Extraction, TransactionEnvelope},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhook", web::post().to(receive));
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub timestamp: String,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeResult {
    Processed,
    Skipped,
    Failed { retryable: bool },
}

async fn receive(req: HttpRequest, body: Bytes, state: web::Data<AppState>) -> HttpResponse {
    if !authorized(&req, &state) {
        tracing::warn!(
            peer = ?req.peer_addr(),
            header = %state.config.webhook_auth_header,
            "Rejected webhook delivery with missing or wrong secret"
        );
        metrics::record_delivery(401);
        return HttpResponse::Unauthorized().json(serde_json::json!({ "error": "unauthorized" }));
    }

    let batch: Vec<serde_json::Value> = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!("Malformed webhook body: {}", e);
            metrics::record_delivery(400);
            return HttpResponse::BadRequest()
                .json(serde_json::json!({ "error": "body must be a JSON array of transactions" }));
        }
    };

    tracing::debug!(count = batch.len(), "Webhook delivery received");
    let results = join_all(batch.into_iter().map(|raw| process_envelope(&state, raw))).await;

    let mut ack = WebhookAck {
        received: true,
        timestamp: Utc::now().to_rfc3339(),
        processed: 0,
        skipped: 0,
        failed: 0,
    };
    let mut retryable = false;
    for result in results {
        match result {
            EnvelopeResult::Processed => ack.processed += 1,
            EnvelopeResult::Skipped => ack.skipped += 1,
            EnvelopeResult::Failed { retryable: r } => {
                ack.failed += 1;
                retryable |= r;
            }
        }
    }

    if retryable {
        tracing::error!(
            processed = ack.processed,
            failed = ack.failed,
            "Webhook delivery hit a retryable failure; asking for redelivery"
        );
        metrics::record_delivery(500);
        return HttpResponse::InternalServerError().json(ack);
    }
    metrics::record_delivery(200);
    HttpResponse::Ok().json(ack)
}

async fn process_envelope(state: &AppState, raw: serde_json::Value) -> EnvelopeResult {
    let envelope = match TransactionEnvelope::deserialize(&raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                signature = raw_signature(&raw),
                "Dropping malformed transaction envelope: {}",
                e
            );
            metrics::record_skip("malformed");
            return EnvelopeResult::Failed { retryable: false };
        }
    };
    let signature = envelope.signature.as_str();

    let events = match state.extractor.extract(&envelope) {
        Ok(Extraction::Events(events)) => events,
        Ok(Extraction::Skipped(reason)) => {
            tracing::debug!(signature, reason = reason.as_str(), "Envelope skipped");
            metrics::record_skip(reason.as_str());
            return EnvelopeResult::Skipped;
        }
        Err(e) => {
            tracing::error!(signature, "Failed to extract escrow event: {}", e);
            metrics::record_skip("extract_error");
            return EnvelopeResult::Failed { retryable: false };
        }
    };

    // a claim from the same transaction must not run ahead of its hide
    for event in &events {
        match state.sync.upsert(event).await {
            Ok(outcome) => {
                tracing::debug!(signature, kind = event.kind(), outcome = outcome.as_str(), "Event synced");
            }
            Err(e) => {
                tracing::error!(
                    signature,
                    kind = event.kind(),
                    retryable = e.is_retryable(),
                    "Failed to sync event: {}",
                    e
                );
                return EnvelopeResult::Failed {
                    retryable: e.is_retryable(),
                };
            }
        }
    }
    EnvelopeResult::Processed
}

/// Best-effort signature of an envelope that did not deserialize.
fn raw_signature(raw: &serde_json::Value) -> &str {
    raw.get("signature")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown")
}

/// Without a configured secret every delivery is accepted (development only).
fn authorized(req: &HttpRequest, state: &AppState) -> bool {
    let Some(secret) = state.config.webhook_secret.as_deref() else {
        tracing::warn!("WEBHOOK_SECRET is not set; accepting unauthenticated webhook delivery");
        return true;
    };
    req.headers()
        .get(state.config.webhook_auth_header.as_str())
        .map(|value| constant_time_eq(value.as_bytes(), secret.as_bytes()))
        .unwrap_or(false)
}

/// Compares digests so timing does not depend on where the inputs differ
/// or on their lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let a = Sha256::digest(a);
    let b = Sha256::digest(b);
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
