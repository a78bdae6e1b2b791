//! # Treasure Escrow Program
//!
//! A Solana Anchor program that escrows fungible tokens as "hidden treasure".
//! Each deposit produces its own record account that can later be claimed once.
//!
//! ## Features
//!
//! - **Vault Initialization**: One singleton vault, created once
//! - **Hide**: Move tokens into the vault and open a per-deposit record
//! - **Claim**: Flag a record as discovered (tokens stay in escrow)
//! - **Administration**: Per-mint whitelist and authority handover
//! - **Events**: Emit structured events for off-chain processing
//!
//! ## Accounts
//!
//! - `TreasureVault` at `["vault"]`
//! - `EscrowRecord` at `["treasure", player, identifier (i64 LE)]`
//! - `TokenWhitelist` at `["whitelist", mint]`
//!
//! The record address is derived without a private key, so a reused
//! `(player, identifier)` pair is rejected rather than overwritten.

use anchor_lang::prelude::*;

pub mod constants;
pub mod error;
pub mod instructions;
pub mod states;

#[cfg(test)]
mod tests;

use crate::instructions::*;

declare_id!("AihKtoUdFbdhtTk17AYDFsppGUkSy31cVze9cin4eJXk");

#[program]
pub mod treasure_escrow {
    use super::*;

    /// Create the singleton treasure vault
    ///
    /// # Errors
    /// `AlreadyInitialized` if the vault already exists
    ///
    /// # Events
    /// Emits `VaultInitialized` on success
    pub fn initialize(ctx: Context<Initialize>) -> Result<()> {
        initialize_handler(ctx)
    }

    /// Hide tokens in the vault
    ///
    /// Transfers `amount` from the player's token account to the vault token
    /// account and opens the record derived from `(player, identifier)`.
    ///
    /// # Arguments
    /// * `amount` - Amount of tokens to hide (in smallest units)
    /// * `identifier` - Unique per player; also the "hidden at" timestamp
    ///
    /// # Errors
    /// `TokenNotWhitelisted`, `InsufficientDeposit`, `InsufficientBalance`,
    /// `RecordAlreadyExists`
    ///
    /// # Events
    /// Emits `TreasureHidden` on success
    pub fn hide(ctx: Context<Hide>, amount: u64, identifier: i64) -> Result<()> {
        hide_handler(ctx, amount, identifier)
    }

    /// Claim a hidden treasure record
    ///
    /// # Errors
    /// `Unauthorized` unless the signer is the record's player,
    /// `AlreadyClaimed` on a second claim
    ///
    /// # Events
    /// Emits `TreasureClaimed` on success
    pub fn claim(ctx: Context<Claim>) -> Result<()> {
        claim_handler(ctx)
    }

    /// Enable or disable a token mint for hiding. Authority only.
    pub fn whitelist_token(ctx: Context<WhitelistToken>, enabled: bool) -> Result<()> {
        whitelist_token_handler(ctx, enabled)
    }

    /// Hand the vault to a new authority. Authority only.
    pub fn update_vault(ctx: Context<UpdateVault>, new_authority: Option<Pubkey>) -> Result<()> {
        update_vault_handler(ctx, new_authority)
    }
}
