use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use shared::{
    decode_escrow_record, validate_pubkey, ApiResponse, DepositDocument, DepositQuery,
    PaginatedResponse,
};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::services::{AppState, SyncError, SyncOutcome};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/deposits")
            .route("", web::get().to(list_deposits))
            .route("/stats", web::get().to(get_stats))
            .route("/wallet/{wallet}", web::get().to(list_wallet_deposits))
            .route("/{signature}", web::get().to(get_deposit))
            .route("/{signature}/resync", web::post().to(resync_deposit)),
    );
}

/// 503 while the store is timing out or unreachable, 500 otherwise.
fn store_failure(err: &SyncError) -> HttpResponse {
    let body = ApiResponse::<()>::error(err.to_string());
    if err.is_retryable() {
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::InternalServerError().json(body)
    }
}

async fn list_deposits(state: web::Data<AppState>, query: web::Query<DepositQuery>) -> impl Responder {
    let (status, limit, offset) = match query.normalized() {
        Ok(parts) => parts,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e.to_string())),
    };

    let store = state.sync.store();
    match state
        .sync
        .bounded("list_deposits", store.list_deposits(status, limit, offset))
        .await
    {
        Ok((items, total)) => {
            HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse::new(items, total, limit, offset)))
        }
        Err(e) => {
            tracing::error!("Failed to list deposits: {}", e);
            store_failure(&e)
        }
    }
}

async fn list_wallet_deposits(
    state: web::Data<AppState>,
    wallet: web::Path<String>,
    query: web::Query<DepositQuery>,
) -> impl Responder {
    if let Err(e) = validate_pubkey(&wallet) {
        return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e.to_string()));
    }
    let (_, limit, offset) = match query.normalized() {
        Ok(parts) => parts,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e.to_string())),
    };

    let store = state.sync.store();
    match state
        .sync
        .bounded("list_by_wallet", store.list_by_wallet(&wallet, limit, offset))
        .await
    {
        Ok((items, total)) => {
            HttpResponse::Ok().json(ApiResponse::success(PaginatedResponse::new(items, total, limit, offset)))
        }
        Err(e) => {
            tracing::error!("Failed to list deposits for wallet {}: {}", wallet, e);
            store_failure(&e)
        }
    }
}

async fn get_deposit(state: web::Data<AppState>, signature: web::Path<String>) -> impl Responder {
    let start = std::time::Instant::now();

    if let Some(doc) = state.cache.get_deposit(&signature).await {
        tracing::debug!("Deposit cache hit in {:?}", start.elapsed());
        return HttpResponse::Ok().json(ApiResponse::success(doc));
    }

    let store = state.sync.store();
    match state
        .sync
        .bounded("find_by_signature", store.find_by_signature(&signature))
        .await
    {
        Ok(Some(doc)) => {
            state.cache.set_deposit(doc.clone()).await;
            tracing::debug!("Deposit query took {:?}", start.elapsed());
            HttpResponse::Ok().json(ApiResponse::success(doc))
        }
        Ok(None) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Deposit not found".to_string()))
        }
        Err(e) => {
            tracing::error!(signature = %signature, "Failed to get deposit: {}", e);
            store_failure(&e)
        }
    }
}

async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    if let Some(stats) = state.cache.get_stats().await {
        return HttpResponse::Ok().json(ApiResponse::success(stats));
    }

    match state.sync.bounded("stats", state.sync.store().stats()).await {
        Ok(stats) => {
            state.cache.set_stats(stats.clone()).await;
            HttpResponse::Ok().json(ApiResponse::success(stats))
        }
        Err(e) => {
            tracing::error!("Failed to compute deposit stats: {}", e);
            store_failure(&e)
        }
    }
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ResyncResult {
    on_chain_claimed: bool,
    outcome: Option<&'static str>,
    deposit: DepositDocument,
}

/// Re-reads the record account over RPC and converges a stale `active`
/// document to `claimed` when the ledger says so.
async fn resync_deposit(state: web::Data<AppState>, signature: web::Path<String>) -> impl Responder {
    tracing::info!("API: Resync deposit {}", signature);

    let store = state.sync.store();
    let doc = match state
        .sync
        .bounded("find_by_signature", store.find_by_signature(&signature))
        .await
    {
        Ok(Some(doc)) => doc,
        Ok(None) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error("Deposit not found".to_string()))
        }
        Err(e) => {
            tracing::error!(signature = %signature, "Failed to load deposit for resync: {}", e);
            return store_failure(&e);
        }
    };

    let address = match Pubkey::from_str(doc.record_address()) {
        Ok(address) => address,
        Err(e) => {
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error(format!("Stored record address is invalid: {e}")))
        }
    };

    let data = match state.chain.fetch_account_data(&address).await {
        Ok(Some(data)) => data,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Record account not found on chain".to_string()))
        }
        Err(e) => {
            tracing::error!(signature = %signature, "Failed to fetch record account: {}", e);
            return HttpResponse::BadGateway().json(ApiResponse::<()>::error(e.to_string()));
        }
    };

    let record = match decode_escrow_record(&data) {
        Ok(record) => record,
        Err(e) => {
            tracing::error!(signature = %signature, "Failed to decode record account: {}", e);
            return HttpResponse::UnprocessableEntity().json(ApiResponse::<()>::error(e.to_string()));
        }
    };

    let mut outcome: Option<SyncOutcome> = None;
    if record.claimed && doc.is_claimable() {
        let claim = shared::ClaimEvent {
            signature: format!("resync:{}", doc.signature),
            record_address: doc.record_address().to_string(),
            claimed_by: record.player_base58(),
            block_time: Some(Utc::now().timestamp()),
            slot: doc.metadata.slot,
        };
        match state.sync.upsert(&shared::SyncEvent::Claim(claim)).await {
            Ok(result) => outcome = Some(result),
            Err(e) => {
                tracing::error!(signature = %signature, "Resync claim failed: {}", e);
                return store_failure(&e);
            }
        }
    }

    let deposit = match outcome {
        Some(SyncOutcome::Claimed) => match state
            .sync
            .bounded("find_by_signature", store.find_by_signature(&signature))
            .await
        {
            Ok(Some(updated)) => updated,
            _ => doc,
        },
        _ => doc,
    };

    HttpResponse::Ok().json(ApiResponse::success(ResyncResult {
        on_chain_claimed: record.claimed,
        outcome: outcome.as_ref().map(SyncOutcome::as_str),
        deposit,
    }))
}
