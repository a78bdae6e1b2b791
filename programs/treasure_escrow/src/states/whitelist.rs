use anchor_lang::prelude::*;

use crate::{constants::WHITELIST_SEED, error::EscrowError};

/// Admission entry for one token mint. Hides are only accepted for mints
/// with an enabled entry at `[WHITELIST_SEED, mint]`.
#[account]
pub struct TokenWhitelist {
    pub token_mint: Pubkey,
    pub enabled: bool,
    pub bump: u8,
}

impl TokenWhitelist {
    pub const LEN: usize = 32 + 1 + 1;

    pub fn set(&mut self, token_mint: Pubkey, enabled: bool, bump: u8) {
        self.token_mint = token_mint;
        self.enabled = enabled;
        self.bump = bump;
    }

    pub fn ensure_accepts(&self, mint: &Pubkey) -> Result<()> {
        require!(
            self.enabled && self.token_mint == *mint,
            EscrowError::TokenNotWhitelisted
        );
        Ok(())
    }
}

pub fn whitelist_address(mint: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[WHITELIST_SEED, mint.as_ref()], &crate::ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_an_enabled_entry_for_the_same_mint_accepts() {
        let mint = Pubkey::new_unique();
        let mut entry = TokenWhitelist {
            token_mint: Pubkey::default(),
            enabled: false,
            bump: 0,
        };
        assert!(entry.ensure_accepts(&mint).is_err());

        entry.set(mint, true, 253);
        assert!(entry.ensure_accepts(&mint).is_ok());
        assert!(entry.ensure_accepts(&Pubkey::new_unique()).is_err());

        entry.set(mint, false, 253);
        assert!(entry.ensure_accepts(&mint).is_err());
    }

    #[test]
    fn each_mint_has_its_own_entry() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        assert_ne!(whitelist_address(&a).0, whitelist_address(&b).0);
    }
}
