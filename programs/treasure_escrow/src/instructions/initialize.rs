use anchor_lang::prelude::*;

use crate::{
    constants::VAULT_SEED,
    states::{TreasureVault, VaultInitialized},
};

#[derive(Accounts)]

pub struct Initialize<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,
    // `init_if_needed` so a second call reaches the handler and fails with
    // AlreadyInitialized instead of a system-program allocation error.
    #[account(
    init_if_needed,
    payer = authority,
    space = 8 + TreasureVault::LEN,
    seeds = [VAULT_SEED],
    bump
  )]
    pub vault: Account<'info, TreasureVault>,
    pub system_program: Program<'info, System>,
}

pub fn initialize_handler(ctx: Context<Initialize>) -> Result<()> {
    let vault = &mut ctx.accounts.vault;
    let clock = Clock::get()?;

    vault.open(ctx.accounts.authority.key(), ctx.bumps.vault)?;

    msg!("Treasure vault initialized, authority: {}", vault.authority);

    emit!(VaultInitialized {
        authority: vault.authority,
        vault: vault.key(),
        timestamp: clock.unix_timestamp
    });

    Ok(())
}
