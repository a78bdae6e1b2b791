/// Seed of the singleton vault PDA.
pub const VAULT_SEED: &[u8] = b"vault";

/// Seed prefix of every treasure record PDA: `[TREASURE_SEED, player, identifier_le]`.
pub const TREASURE_SEED: &[u8] = b"treasure";

/// Seed prefix of the per-mint whitelist PDA: `[WHITELIST_SEED, mint]`.
pub const WHITELIST_SEED: &[u8] = b"whitelist";

/// 100 tokens at 6 decimals.
pub const MIN_DEPOSIT: u64 = 100_000_000;

/// One whole token in base units.
pub const ONE_TOKEN: u64 = 1_000_000;
