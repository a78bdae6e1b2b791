use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::{EscrowError, EscrowResult};

#[derive(Debug , Clone , Copy , Serialize , Deserialize , PartialEq , Eq , Hash)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
  Active,
  Claimed,
  Expired,
}

impl DepositStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      DepositStatus::Active => "active",
      DepositStatus::Claimed => "claimed",
      DepositStatus::Expired => "expired",
    }
  }
}

impl FromStr for DepositStatus {
  type Err = EscrowError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "active" => Ok(DepositStatus::Active),
      "claimed" => Ok(DepositStatus::Claimed),
      "expired" => Ok(DepositStatus::Expired),
      other => Err(EscrowError::InvalidStatus(other.to_string())),
    }
  }
}

impl fmt::Display for DepositStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug , Clone , Serialize , Deserialize , PartialEq , Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepositMetadata {
  pub block_time: Option<i64>,
  pub slot: u64,
  pub fee: u64,
  pub program_id: String,
  pub record_address: String,
}

/// One confirmed hide, keyed by its transaction signature.
#[derive(Debug , Clone , Serialize , Deserialize , PartialEq , Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepositDocument {
  pub signature: String,
  pub wallet_address: String,
  pub amount: u64,
  pub token_type: String,
  pub status: DepositStatus,
  pub hidden_at: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(default , skip_serializing_if = "Option::is_none")]
  pub claimed_at: Option<DateTime<Utc>>,
  #[serde(default , skip_serializing_if = "Option::is_none")]
  pub claimed_by: Option<String>,
  pub metadata: DepositMetadata,
}

impl DepositDocument {
  pub fn new_active(
    event: &DepositEvent,
    token_type: String,
    program_id: &str,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      signature: event.signature.clone(),
      wallet_address: event.wallet_address.clone(),
      amount: event.amount,
      token_type,
      status: DepositStatus::Active,
      hidden_at: crate::hidden_at_from_identifier(event.identifier, event.block_time, now),
      created_at: now,
      updated_at: now,
      claimed_at: None,
      claimed_by: None,
      metadata: DepositMetadata {
        block_time: event.block_time,
        slot: event.slot,
        fee: event.fee,
        program_id: program_id.to_string(),
        record_address: event.record_address.clone(),
      },
    }
  }

  #[inline]
  pub fn record_address(&self) -> &str {
    &self.metadata.record_address
  }

  #[inline]
  pub fn is_claimable(&self) -> bool {
    self.status == DepositStatus::Active
  }
}

/// Flat row shape of the `deposits` table.
#[derive(Debug , Clone , FromRow)]
pub struct DepositRow {
  pub signature: String,
  pub wallet_address: String,
  /// NUMERIC(20,0) selected as text.
  pub amount: String,
  pub token_type: String,
  pub status: String,
  pub hidden_at: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub claimed_at: Option<DateTime<Utc>>,
  pub claimed_by: Option<String>,
  pub block_time: Option<i64>,
  pub slot: i64,
  pub fee: i64,
  pub program_id: String,
  pub record_address: String,
}

impl TryFrom<DepositRow> for DepositDocument {
  type Error = EscrowError;

  fn try_from(row: DepositRow) -> EscrowResult<Self> {
    Ok(Self {
      signature: row.signature,
      wallet_address: row.wallet_address,
      amount: crate::parse_amount(&row.amount)?,
      token_type: row.token_type,
      status: row.status.parse()?,
      hidden_at: row.hidden_at,
      created_at: row.created_at,
      updated_at: row.updated_at,
      claimed_at: row.claimed_at,
      claimed_by: row.claimed_by,
      metadata: DepositMetadata {
        block_time: row.block_time,
        slot: crate::i64_to_u64(row.slot)?,
        fee: crate::i64_to_u64(row.fee)?,
        program_id: row.program_id,
        record_address: row.record_address,
      },
    })
  }
}

/// Normalized hide, built from a transaction envelope and the decoded record.
#[derive(Debug , Clone , Serialize , Deserialize , PartialEq , Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepositEvent {
  pub signature: String,
  pub wallet_address: String,
  pub amount: u64,
  pub token_mint: Option<String>,
  pub record_address: String,
  pub identifier: i64,
  pub block_time: Option<i64>,
  pub slot: u64,
  pub fee: u64,
}

#[derive(Debug , Clone , Serialize , Deserialize , PartialEq , Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimEvent {
  pub signature: String,
  pub record_address: String,
  pub claimed_by: String,
  pub block_time: Option<i64>,
  pub slot: u64,
}

impl ClaimEvent {
  /// Claim time: the block time when known, else `fallback`.
  pub fn claimed_at(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
    self
      .block_time
      .and_then(|t| DateTime::from_timestamp(t, 0))
      .unwrap_or(fallback)
  }
}

#[derive(Debug , Clone , PartialEq , Eq)]
pub enum SyncEvent {
  Deposit(DepositEvent),
  Claim(ClaimEvent),
}

impl SyncEvent {
  pub fn kind(&self) -> &'static str {
    match self {
      SyncEvent::Deposit(_) => "hide",
      SyncEvent::Claim(_) => "claim",
    }
  }
}

/// A claim that arrived before the deposit document it targets.
#[derive(Debug , Clone , Serialize , Deserialize , FromRow , PartialEq , Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingClaim {
  pub record_address: String,
  pub claim_signature: String,
  pub claimed_by: String,
  pub claimed_at: DateTime<Utc>,
  pub received_at: DateTime<Utc>,
  pub attempts: i32,
}

impl PendingClaim {
  pub fn from_event(event: &ClaimEvent, now: DateTime<Utc>) -> Self {
    Self {
      record_address: event.record_address.clone(),
      claim_signature: event.signature.clone(),
      claimed_by: event.claimed_by.clone(),
      claimed_at: event.claimed_at(now),
      received_at: now,
      attempts: 0,
    }
  }
}

#[derive(Debug , Clone , Default , Serialize , Deserialize , PartialEq , Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepositStats {
  pub total: i64,
  pub active: i64,
  pub claimed: i64,
  pub expired: i64,
  /// Sums of `u64` amounts; wider so they cannot overflow.
  pub total_amount: u128,
  pub active_amount: u128,
  pub pending_claims: i64,
}

#[derive(Debug , Clone , Serialize ,Deserialize)]
pub struct ApiResponse<T>{
  pub success : bool ,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data : Option<T>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error : Option<String>,
}

impl<T> ApiResponse<T>{
  pub fn success(data: T) -> Self {
    Self { success: true, data: Some(data), error: None }
  }

  pub fn error(error : String) -> Self{
    Self { success: false, data: None, error: Some(error) }
  }
}

pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug , Clone , Serialize , Deserialize)]
pub struct DepositQuery {
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default = "default_limit")]
  pub limit : i64,
  #[serde(default)]
  pub offset : i64
}

impl DepositQuery {
  /// Parses the status filter and clamps paging to sane bounds.
  pub fn normalized(&self) -> EscrowResult<(Option<DepositStatus>, i64, i64)> {
    let status = self
      .status
      .as_deref()
      .filter(|s| !s.is_empty())
      .map(str::parse)
      .transpose()?;
    Ok((status, self.limit.clamp(1, MAX_PAGE_SIZE), self.offset.max(0)))
  }
}

fn default_limit() -> i64 {
  100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
  pub items: Vec<T>,
  pub total: i64,
  pub limit: i64,
  pub offset: i64,
  pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
  pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
    let has_more = (offset + items.len() as i64) < total;
    Self {
      items,
      total,
      limit,
      offset,
      has_more,
    }
  }
}
