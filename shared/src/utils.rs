use chrono::{DateTime, Utc};

use crate::{EscrowError, EscrowResult};

/// Identifiers above this are read as milliseconds rather than seconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

pub fn validate_pubkey(pubkey : &str) -> EscrowResult<[u8; 32]>{
  if pubkey.len() < 32 || pubkey.len() > 44 {
    return Err(EscrowError::InvalidPubkey("Pubkey length must be between 32-44 characters".to_string()));
  }

  let bytes = bs58::decode(pubkey).into_vec().map_err(|e| EscrowError::InvalidPubkey(format!("Invalid base58: {}" , e)))?;
  bytes
    .try_into()
    .map_err(|b: Vec<u8>| EscrowError::InvalidPubkey(format!("Expected 32 bytes, got {}", b.len())))
}

/// The program uses the identifier as the hide timestamp. Positive values are
/// unix seconds (or millis when large enough); anything else falls back to the
/// block time, then to `now`.
pub fn hidden_at_from_identifier(
  identifier: i64,
  block_time: Option<i64>,
  now: DateTime<Utc>,
) -> DateTime<Utc> {
  let from_identifier = if identifier >= MILLIS_THRESHOLD {
    DateTime::from_timestamp_millis(identifier)
  } else if identifier > 0 {
    DateTime::from_timestamp(identifier, 0)
  } else {
    None
  };

  from_identifier
    .or_else(|| block_time.and_then(|t| DateTime::from_timestamp(t, 0)))
    .unwrap_or(now)
}

pub fn u64_to_i64(value: u64) -> EscrowResult<i64> {
  i64::try_from(value).map_err(|_| EscrowError::Overflow)
}

pub fn i64_to_u64(value: i64) -> EscrowResult<u64> {
  u64::try_from(value).map_err(|_| EscrowError::InvalidAmount(format!("negative value {value}")))
}

/// Amounts are stored as NUMERIC and read back as text, so the full `u64`
/// range survives the round trip.
pub fn parse_amount(raw: &str) -> EscrowResult<u64> {
  raw.trim().parse().map_err(|_| EscrowError::InvalidAmount(format!("not a token amount: {raw:?}")))
}
