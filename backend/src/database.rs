use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{DepositDocument, DepositRow, DepositStats, DepositStatus, PendingClaim};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;

use crate::store::{ClaimTransition, DepositStore, PendingCursor, StoreError};

// amount is NUMERIC(20,0); text keeps the full u64 range across the driver
const DEPOSIT_COLUMNS: &str = "signature, wallet_address, amount::TEXT AS amount, token_type, status, hidden_at, \
     created_at, updated_at, claimed_at, claimed_by, block_time, slot, fee, program_id, record_address";

fn parse_sum(raw: String) -> Result<u128, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("amount sum out of range: {raw}")))
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(3))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn fetch_page(
        &self,
        filter: &str,
        bind: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DepositDocument>, i64), StoreError> {
        let (limit_param, offset_param) = if bind.is_some() { (2, 3) } else { (1, 2) };
        let query = format!(
            "SELECT {DEPOSIT_COLUMNS} FROM deposits {filter} \
             ORDER BY hidden_at DESC, signature ASC LIMIT ${limit_param} OFFSET ${offset_param}"
        );
        let count_query = format!("SELECT COUNT(*) AS count FROM deposits {filter}");

        let mut q = sqlx::query_as::<_, DepositRow>(&query);
        let mut c = sqlx::query(&count_query);
        if let Some(value) = bind {
            q = q.bind(value);
            c = c.bind(value);
        }

        let rows = q.bind(limit).bind(offset).fetch_all(&self.pool).await?;
        let total: i64 = c.fetch_one(&self.pool).await?.get("count");

        let docs = rows
            .into_iter()
            .map(DepositDocument::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((docs, total))
    }
}

#[async_trait]
impl DepositStore for Database {
    async fn insert_if_absent(&self, doc: &DepositDocument) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO deposits (
                signature, wallet_address, amount, token_type, status, hidden_at,
                created_at, updated_at, block_time, slot, fee, program_id, record_address
            ) VALUES ($1, $2, $3::NUMERIC, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&doc.signature)
        .bind(&doc.wallet_address)
        .bind(doc.amount.to_string())
        .bind(&doc.token_type)
        .bind(doc.status.as_str())
        .bind(doc.hidden_at)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .bind(doc.metadata.block_time)
        .bind(shared::u64_to_i64(doc.metadata.slot)?)
        .bind(shared::u64_to_i64(doc.metadata.fee)?)
        .bind(&doc.metadata.program_id)
        .bind(&doc.metadata.record_address)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_by_signature(&self, signature: &str) -> Result<Option<DepositDocument>, StoreError> {
        let row = sqlx::query_as::<_, DepositRow>(&format!(
            "SELECT {DEPOSIT_COLUMNS} FROM deposits WHERE signature = $1"
        ))
        .bind(signature)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(DepositDocument::try_from).transpose()?)
    }

    async fn mark_claimed(
        &self,
        record_address: &str,
        claimed_by: &str,
        claimed_at: DateTime<Utc>,
    ) -> Result<ClaimTransition, StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE deposits
            SET status = 'claimed', claimed_at = $2, claimed_by = $3, updated_at = NOW()
            WHERE record_address = $1 AND status = 'active'
            RETURNING signature
            "#,
        )
        .bind(record_address)
        .bind(claimed_at)
        .bind(claimed_by)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(ClaimTransition::Applied {
                signature: row.get("signature"),
            });
        }

        let current = sqlx::query("SELECT signature, status FROM deposits WHERE record_address = $1")
            .bind(record_address)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = current else {
            return Ok(ClaimTransition::Missing);
        };
        let signature: String = row.get("signature");
        let status: DepositStatus = row.get::<String, _>("status").parse()?;
        match status {
            DepositStatus::Claimed => Ok(ClaimTransition::AlreadyClaimed { signature }),
            // row was inserted between the update and this read
            DepositStatus::Active => self.mark_claimed(record_address, claimed_by, claimed_at).await,
            status => Ok(ClaimTransition::Rejected { signature, status }),
        }
    }

    async fn put_pending_claim(&self, claim: &PendingClaim) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pending_claims (
                record_address, claim_signature, claimed_by, claimed_at, received_at, attempts
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (record_address) DO NOTHING
            "#,
        )
        .bind(&claim.record_address)
        .bind(&claim.claim_signature)
        .bind(&claim.claimed_by)
        .bind(claim.claimed_at)
        .bind(claim.received_at)
        .bind(claim.attempts)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_pending_claim(&self, record_address: &str) -> Result<Option<PendingClaim>, StoreError> {
        let claim = sqlx::query_as::<_, PendingClaim>(
            "SELECT * FROM pending_claims WHERE record_address = $1",
        )
        .bind(record_address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claim)
    }

    async fn delete_pending_claim(&self, record_address: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pending_claims WHERE record_address = $1")
            .bind(record_address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_pending_claims(
        &self,
        after: Option<PendingCursor>,
        limit: i64,
    ) -> Result<Vec<PendingClaim>, StoreError> {
        let (received_at, record_address) = after.unzip();
        let claims = sqlx::query_as::<_, PendingClaim>(
            r#"
            SELECT * FROM pending_claims
            WHERE $1::TIMESTAMPTZ IS NULL OR (received_at, record_address) > ($1, $2)
            ORDER BY received_at ASC, record_address ASC
            LIMIT $3
            "#,
        )
        .bind(received_at)
        .bind(record_address)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(claims)
    }

    async fn bump_pending_attempts(&self, record_address: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE pending_claims SET attempts = attempts + 1 WHERE record_address = $1")
            .bind(record_address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_deposits(
        &self,
        status: Option<DepositStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DepositDocument>, i64), StoreError> {
        match status {
            Some(status) => {
                self.fetch_page("WHERE status = $1", Some(status.as_str()), limit, offset)
                    .await
            }
            None => self.fetch_page("", None, limit, offset).await,
        }
    }

    async fn list_by_wallet(
        &self,
        wallet: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DepositDocument>, i64), StoreError> {
        self.fetch_page("WHERE wallet_address = $1", Some(wallet), limit, offset)
            .await
    }

    async fn stats(&self) -> Result<DepositStats, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'active') AS active,
                COUNT(*) FILTER (WHERE status = 'claimed') AS claimed,
                COUNT(*) FILTER (WHERE status = 'expired') AS expired,
                COALESCE(SUM(amount), 0)::TEXT AS total_amount,
                COALESCE(SUM(amount) FILTER (WHERE status = 'active'), 0)::TEXT AS active_amount,
                (SELECT COUNT(*) FROM pending_claims) AS pending_claims
            FROM deposits
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DepositStats {
            total: row.get("total"),
            active: row.get("active"),
            claimed: row.get("claimed"),
            expired: row.get("expired"),
            total_amount: parse_sum(row.get("total_amount"))?,
            active_amount: parse_sum(row.get("active_amount"))?,
            pending_claims: row.get("pending_claims"),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
