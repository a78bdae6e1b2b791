use anchor_lang::prelude::*;
use anchor_spl::token::{transfer, Token, TokenAccount, Transfer};

use crate::{
    constants::{TREASURE_SEED, VAULT_SEED, WHITELIST_SEED},
    error::EscrowError,
    states::{EscrowRecord, TokenWhitelist, TreasureHidden, TreasureVault},
};

#[derive(Accounts)]
#[instruction(amount: u64, identifier: i64)]
pub struct Hide<'info> {
    #[account(mut)]
    pub player: Signer<'info>,
    // Players token account (source of funds)
    #[account(
    mut,
    constraint = player_token_account.owner == player.key() @ EscrowError::InvalidTokenAccount
  )]
    pub player_token_account: Account<'info, TokenAccount>,
    // Vault token account (destination of funds)
    #[account(
    mut,
    constraint = vault_token_account.owner == vault.key() @ EscrowError::InvalidTokenAccount,
    constraint = vault_token_account.mint == player_token_account.mint @ EscrowError::InvalidTokenAccount
  )]
    pub vault_token_account: Account<'info, TokenAccount>,
    #[account(
    mut,
    seeds = [VAULT_SEED],
    bump = vault.bump
  )]
    pub vault: Account<'info, TreasureVault>,
    // Reaching the handler with an existing record turns a reused
    // (player, identifier) pair into RecordAlreadyExists.
    #[account(
    init_if_needed,
    payer = player,
    space = 8 + EscrowRecord::LEN,
    seeds = [TREASURE_SEED, player.key().as_ref(), &identifier.to_le_bytes()],
    bump
  )]
    pub treasure_record: Account<'info, EscrowRecord>,
    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
    // Appended last so the record keeps its account index.
    #[account(
    seeds = [WHITELIST_SEED, player_token_account.mint.as_ref()],
    bump = token_whitelist.bump,
    constraint = token_whitelist.enabled @ EscrowError::TokenNotWhitelisted
  )]
    pub token_whitelist: Account<'info, TokenWhitelist>,
}

pub fn hide_handler(ctx: Context<Hide>, amount: u64, identifier: i64) -> Result<()> {
    ctx.accounts
        .token_whitelist
        .ensure_accepts(&ctx.accounts.player_token_account.mint)?;
    ctx.accounts
        .treasure_record
        .ensure_hideable(amount, ctx.accounts.player_token_account.amount)?;

    let cpi_accounts = Transfer {
        from: ctx.accounts.player_token_account.to_account_info(),
        to: ctx.accounts.vault_token_account.to_account_info(),
        authority: ctx.accounts.player.to_account_info(),
    };
    let cpi_program = ctx.accounts.token_program.to_account_info();

    transfer(CpiContext::new(cpi_program, cpi_accounts), amount)?;

    let player = ctx.accounts.player.key();
    let record = &mut ctx.accounts.treasure_record;
    record.open(player, amount, identifier, ctx.bumps.treasure_record);

    let vault = &mut ctx.accounts.vault;
    vault.record_hidden(amount)?;

    msg!(
        "Treasure hidden: {} base units, identifier {}, tier {}",
        amount,
        identifier,
        record.tier
    );

    emit!(TreasureHidden {
        player,
        record: record.key(),
        amount,
        identifier,
        tier: record.tier,
        total_hidden: vault.total_hidden,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}
