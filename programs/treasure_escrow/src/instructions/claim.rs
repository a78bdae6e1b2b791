use anchor_lang::prelude::*;

use crate::{
    constants::{TREASURE_SEED, VAULT_SEED},
    states::{EscrowRecord, TreasureClaimed, TreasureVault},
};

#[derive(Accounts)]
pub struct Claim<'info> {
    pub player: Signer<'info>,

    #[account(
    mut,
    seeds = [
      TREASURE_SEED,
      treasure_record.player.as_ref(),
      &treasure_record.identifier.to_le_bytes()
    ],
    bump = treasure_record.bump,
  )]
    pub treasure_record: Account<'info, EscrowRecord>,

    #[account(
    mut,
    seeds = [VAULT_SEED],
    bump = vault.bump
  )]
    pub vault: Account<'info, TreasureVault>,
}

/// Flags the record as discovered. Tokens stay in the vault.
pub fn claim_handler(ctx: Context<Claim>) -> Result<()> {
    let player = ctx.accounts.player.key();
    let record = &mut ctx.accounts.treasure_record;

    record.claim(&player)?;

    let vault = &mut ctx.accounts.vault;
    vault.record_claimed(record.amount)?;

    msg!(
        "Treasure claimed: {} base units, total claimed {}",
        record.amount,
        vault.total_claimed
    );

    emit!(TreasureClaimed {
        player,
        record: record.key(),
        amount: record.amount,
        total_claimed: vault.total_claimed,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}
