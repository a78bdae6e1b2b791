use anchor_lang::prelude::*;

#[event]
pub struct VaultInitialized{
  pub authority : Pubkey ,
  pub vault : Pubkey ,
  pub timestamp : i64
}

#[event]
pub struct TreasureHidden{
  pub player : Pubkey ,
  pub record : Pubkey ,
  pub amount : u64 ,
  pub identifier : i64 ,
  pub tier : u8 ,
  pub total_hidden : u64 ,
  pub timestamp : i64
}

#[event]
pub struct TreasureClaimed{
  pub player : Pubkey ,
  pub record : Pubkey ,
  pub amount : u64 ,
  pub total_claimed : u64 ,
  pub timestamp : i64
}

#[event]
pub struct TokenWhitelisted{
  pub token_mint : Pubkey ,
  pub enabled : bool ,
  pub timestamp : i64
}

#[event]
pub struct VaultAuthorityUpdated{
  pub previous_authority : Pubkey ,
  pub new_authority : Pubkey ,
  pub timestamp : i64
}
