use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Solana RPC error: {0}")]
    Rpc(String),
}

/// Live reads of escrow record accounts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Raw account data, or `None` if the account does not exist.
    async fn fetch_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ChainError>;
}

#[async_trait]
impl RecordSource for RpcClient {
    async fn fetch_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ChainError> {
        let response = self
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(response.value.map(|account| account.data))
    }
}
