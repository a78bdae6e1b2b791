use anchor_lang::prelude::*;

use crate::{
    constants::{MIN_DEPOSIT, ONE_TOKEN, TREASURE_SEED},
    error::EscrowError,
};

#[account]
pub struct TreasureVault {
    pub authority: Pubkey,
    pub total_hidden: u64,
    pub total_claimed: u64,
    pub bump: u8,
}

impl TreasureVault {
    pub const LEN: usize = 32 + 8 + 8 + 1;

    /// A freshly allocated vault is all zeroes, so a default authority means
    /// `initialize` has never completed on this account.
    pub fn is_initialized(&self) -> bool {
        self.authority != Pubkey::default()
    }

    pub fn open(&mut self, authority: Pubkey, bump: u8) -> Result<()> {
        require!(!self.is_initialized(), EscrowError::AlreadyInitialized);
        self.authority = authority;
        self.total_hidden = 0;
        self.total_claimed = 0;
        self.bump = bump;
        Ok(())
    }

    pub fn ensure_authority(&self, signer: &Pubkey) -> Result<()> {
        require_keys_eq!(self.authority, *signer, EscrowError::Unauthorized);
        Ok(())
    }

    /// Hands the vault to `new_authority`. Only the current authority may do
    /// this, and never to the default key that marks an unopened vault.
    pub fn set_authority(&mut self, signer: &Pubkey, new_authority: Pubkey) -> Result<()> {
        self.ensure_authority(signer)?;
        require!(
            new_authority != Pubkey::default(),
            EscrowError::InvalidAuthority
        );
        self.authority = new_authority;
        Ok(())
    }

    pub fn record_hidden(&mut self, amount: u64) -> Result<()> {
        self.total_hidden = self
            .total_hidden
            .checked_add(amount)
            .ok_or(EscrowError::Overflow)?;
        Ok(())
    }

    pub fn record_claimed(&mut self, amount: u64) -> Result<()> {
        let total_claimed = self
            .total_claimed
            .checked_add(amount)
            .ok_or(EscrowError::Overflow)?;
        // every claimed amount was hidden first
        require!(
            total_claimed <= self.total_hidden,
            EscrowError::Overflow
        );
        self.total_claimed = total_claimed;
        Ok(())
    }
}

/// One hidden treasure. The account address is derived from
/// `(TREASURE_SEED, player, identifier)`, so a player can never reuse an identifier.
///
/// Field order is a wire contract: off-chain decoders read fixed offsets.
#[account]
pub struct EscrowRecord {
    pub player: Pubkey,
    pub amount: u64,
    pub identifier: i64,
    pub claimed: bool,
    pub tier: u8,
    pub bump: u8,
}

impl EscrowRecord {
    pub const LEN: usize = 32 + 8 + 8 + 1 + 1 + 1;

    pub fn is_initialized(&self) -> bool {
        self.player != Pubkey::default()
    }

    /// Every precondition of `hide` that can be checked before tokens move.
    pub fn ensure_hideable(&self, amount: u64, depositor_balance: u64) -> Result<()> {
        require!(amount >= MIN_DEPOSIT, EscrowError::InsufficientDeposit);
        require!(!self.is_initialized(), EscrowError::RecordAlreadyExists);
        require!(
            depositor_balance >= amount,
            EscrowError::InsufficientBalance
        );
        Ok(())
    }

    pub fn open(&mut self, player: Pubkey, amount: u64, identifier: i64, bump: u8) {
        self.player = player;
        self.amount = amount;
        self.identifier = identifier;
        self.claimed = false;
        self.tier = tier_for(amount);
        self.bump = bump;
    }

    pub fn claim(&mut self, claimer: &Pubkey) -> Result<()> {
        require!(self.player == *claimer, EscrowError::Unauthorized);
        require!(!self.claimed, EscrowError::AlreadyClaimed);
        self.claimed = true;
        Ok(())
    }
}

/// Tier 1..=4 by whole tokens hidden.
pub fn tier_for(amount: u64) -> u8 {
    let tokens = amount / ONE_TOKEN;
    if tokens >= 100_000 {
        4
    } else if tokens >= 10_000 {
        3
    } else if tokens >= 1_000 {
        2
    } else {
        1
    }
}

pub fn treasure_record_address(player: &Pubkey, identifier: i64) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[TREASURE_SEED, player.as_ref(), &identifier.to_le_bytes()],
        &crate::ID,
    )
}
