use anchor_lang::prelude::*;

#[error_code]

pub enum EscrowError {
    #[msg("Treasure amount is too low (minimum 100 tokens)")]
    InsufficientDeposit,
    #[msg("Insufficient token balance to hide this treasure")]
    InsufficientBalance,
    #[msg("Treasure has already been claimed")]
    AlreadyClaimed,
    #[msg("Vault has already been initialized")]
    AlreadyInitialized,
    #[msg("A treasure record already exists for this player and identifier")]
    RecordAlreadyExists,
    #[msg("Unauthorized: you don't have permission for this operation")]
    Unauthorized,
    #[msg("Invalid Token Account")]
    InvalidTokenAccount,
    #[msg("Arithmetic Overflow")]
    Overflow,
    #[msg("Token mint is not whitelisted for hiding")]
    TokenNotWhitelisted,
    #[msg("Vault authority cannot be the default pubkey")]
    InvalidAuthority,
}
