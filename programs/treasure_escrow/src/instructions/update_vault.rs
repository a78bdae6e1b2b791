use anchor_lang::prelude::*;

use crate::{
    constants::VAULT_SEED,
    error::EscrowError,
    states::{TreasureVault, VaultAuthorityUpdated},
};

#[derive(Accounts)]
pub struct UpdateVault<'info> {
    pub authority: Signer<'info>,
    #[account(
    mut,
    seeds = [VAULT_SEED],
    bump = vault.bump,
    constraint = vault.authority == authority.key() @ EscrowError::Unauthorized
  )]
    pub vault: Account<'info, TreasureVault>,
}

/// `None` leaves the vault unchanged.
pub fn update_vault_handler(ctx: Context<UpdateVault>, new_authority: Option<Pubkey>) -> Result<()> {
    let Some(new_authority) = new_authority else {
        return Ok(());
    };

    let signer = ctx.accounts.authority.key();
    let vault = &mut ctx.accounts.vault;
    let previous_authority = vault.authority;
    vault.set_authority(&signer, new_authority)?;

    msg!("Vault authority updated to: {}", new_authority);

    emit!(VaultAuthorityUpdated {
        previous_authority,
        new_authority,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}
