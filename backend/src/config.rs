//! # Configuration Module
//!
//! This module handles loading and validation of environment variables
//! for the deposit sync server.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default | Required |
//! |----------|-------------|---------|----------|
//! | `STORE_BACKEND` | `postgres` or `memory` (in-process, lost on restart) | `postgres` | No |
//! | `DATABASE_URL` | PostgreSQL connection string | - | With `postgres` |
//! | `PROGRAM_ID` | Deployed escrow program ID | - | Yes |
//! | `SOLANA_RPC_URL` | Solana RPC endpoint | `https://api.devnet.solana.com` | No |
//! | `HOST` | Server bind address | `0.0.0.0` | No |
//! | `PORT` | Server port | `3000` | No |
//! | `MAX_DB_CONNECTIONS` | Database connection pool size | `20` | No |
//! | `WEBHOOK_SECRET` | Shared secret expected on webhook deliveries | unset | No |
//! | `WEBHOOK_AUTH_HEADER` | Header carrying the secret | `authorization` | No |
//! | `STORE_TIMEOUT_MS` | Bound on every store call | `3000` | No |
//! | `SYNC_MAX_RETRIES` | In-process retries for transient store errors | `3` | No |
//! | `SYNC_RETRY_BASE_MS` | First backoff delay, doubled per retry | `100` | No |
//! | `CACHE_TTL_SECONDS` | Deposit read cache TTL | `30` | No |
//! | `RECONCILIATION_INTERVAL_SECONDS` | Pending claim sweep interval | `60` | No |
//! | `PENDING_CLAIM_WARN_SECONDS` | Age at which an unapplied claim is logged | `600` | No |
//! | `DEFAULT_TOKEN_MINT` | Token type used when a hide carries no transfer | unset | No |

use solana_sdk::pubkey::Pubkey;
use std::{str::FromStr, time::Duration};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store: StoreBackend,
    pub solana_rpc_url: String,
    /// Public key of the deployed escrow program
    pub program_id: Pubkey,
    pub max_db_connections: u32,
    /// `None` accepts every delivery; development only
    pub webhook_secret: Option<String>,
    pub webhook_auth_header: String,
    pub sync: SyncSettings,
    pub cache_ttl_seconds: u64,
    pub reconciliation_interval_seconds: u64,
    pub pending_claim_warn_seconds: i64,
    pub default_token_mint: Option<String>,
}

/// Where deposit documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    /// In-process tables for local runs; nothing survives a restart.
    Memory,
}

/// Timeouts and retry policy for store calls made by the sync service.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub store_timeout: Duration,
    pub max_retries: u32,
    pub retry_base: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(3000),
            max_retries: 3,
            retry_base: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup. `from_env` is this over
    /// `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match lookup("STORE_BACKEND")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("postgres") => StoreBackend::Postgres {
                database_url: lookup("DATABASE_URL").ok_or(ConfigError::MissingEnvVar("DATABASE_URL"))?,
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => return Err(ConfigError::InvalidStoreBackend(other.to_string())),
        };

        let solana_rpc_url = lookup("SOLANA_RPC_URL")
            .unwrap_or_else(|| "https://api.devnet.solana.com".to_string());

        let program_id_str =
            lookup("PROGRAM_ID").ok_or(ConfigError::MissingEnvVar("PROGRAM_ID"))?;

        let program_id = Pubkey::from_str(&program_id_str)
            .map_err(|e| ConfigError::InvalidProgramId(e.to_string()))?;

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let max_db_connections = parse_or(&lookup, "MAX_DB_CONNECTIONS", 20)?;

        let webhook_secret = lookup("WEBHOOK_SECRET").filter(|s| !s.is_empty());
        let webhook_auth_header = lookup("WEBHOOK_AUTH_HEADER")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "authorization".to_string())
            .to_ascii_lowercase();

        let sync = SyncSettings {
            store_timeout: Duration::from_millis(parse_or(&lookup, "STORE_TIMEOUT_MS", 3000)?),
            max_retries: parse_or(&lookup, "SYNC_MAX_RETRIES", 3)?,
            retry_base: Duration::from_millis(parse_or(&lookup, "SYNC_RETRY_BASE_MS", 100)?),
        };
        if sync.store_timeout.is_zero() {
            return Err(ConfigError::InvalidNumber("STORE_TIMEOUT_MS"));
        }

        let cache_ttl_seconds = parse_or(&lookup, "CACHE_TTL_SECONDS", 30)?;
        let reconciliation_interval_seconds =
            parse_or(&lookup, "RECONCILIATION_INTERVAL_SECONDS", 60)?;
        if reconciliation_interval_seconds == 0 {
            return Err(ConfigError::InvalidNumber("RECONCILIATION_INTERVAL_SECONDS"));
        }
        let pending_claim_warn_seconds = parse_or(&lookup, "PENDING_CLAIM_WARN_SECONDS", 600)?;

        let default_token_mint = match lookup("DEFAULT_TOKEN_MINT").filter(|s| !s.is_empty()) {
            Some(mint) => {
                Pubkey::from_str(&mint)
                    .map_err(|_| ConfigError::InvalidPubkey("DEFAULT_TOKEN_MINT"))?;
                Some(mint)
            }
            None => None,
        };

        Ok(Config {
            host,
            port,
            store,
            solana_rpc_url,
            program_id,
            max_db_connections,
            webhook_secret,
            webhook_auth_header,
            sync,
            cache_ttl_seconds,
            reconciliation_interval_seconds,
            pending_claim_warn_seconds,
            default_token_mint,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber(key)),
        None => Ok(default),
    }
}

/// Configuration errors that can occur during loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// The program ID is not a valid Solana public key
    #[error("Invalid program ID: {0}")]
    InvalidProgramId(String),

    /// The port number is not valid
    #[error("Invalid port number")]
    InvalidPort,

    /// A numeric environment variable has an invalid value
    #[error("Invalid number for {0}")]
    InvalidNumber(&'static str),

    #[error("Invalid public key for {0}")]
    InvalidPubkey(&'static str),

    #[error("Unknown STORE_BACKEND {0:?}; expected postgres or memory")]
    InvalidStoreBackend(String),
}
