use anchor_lang::prelude::*;
use anchor_spl::token::Mint;

use crate::{
    constants::{VAULT_SEED, WHITELIST_SEED},
    error::EscrowError,
    states::{TokenWhitelist, TokenWhitelisted, TreasureVault},
};

#[derive(Accounts)]
pub struct WhitelistToken<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,
    #[account(
    seeds = [VAULT_SEED],
    bump = vault.bump,
    constraint = vault.authority == authority.key() @ EscrowError::Unauthorized
  )]
    pub vault: Account<'info, TreasureVault>,
    pub token_mint: Account<'info, Mint>,
    // `init_if_needed` so the same call can later disable the mint
    #[account(
    init_if_needed,
    payer = authority,
    space = 8 + TokenWhitelist::LEN,
    seeds = [WHITELIST_SEED, token_mint.key().as_ref()],
    bump
  )]
    pub token_whitelist: Account<'info, TokenWhitelist>,
    pub system_program: Program<'info, System>,
}

pub fn whitelist_token_handler(ctx: Context<WhitelistToken>, enabled: bool) -> Result<()> {
    ctx.accounts
        .vault
        .ensure_authority(&ctx.accounts.authority.key())?;

    let token_mint = ctx.accounts.token_mint.key();
    ctx.accounts
        .token_whitelist
        .set(token_mint, enabled, ctx.bumps.token_whitelist);

    msg!("Token {} whitelist enabled: {}", token_mint, enabled);

    emit!(TokenWhitelisted {
        token_mint,
        enabled,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}
