//! Ledger emulation for the escrow state machine.
//!
//! Mirrors what the runtime gives the handlers: every instruction runs
//! against a staged copy of the accounts and is committed only if it
//! succeeds, records live at their derived addresses, and the vault is a
//! single versioned row written with an expected-version check. Token
//! balances are tracked for one escrow mint; other mints only exist to be
//! refused by the whitelist.

use std::collections::{BTreeMap, HashMap};

use anchor_lang::prelude::*;

use crate::{
    constants::MIN_DEPOSIT,
    error::EscrowError,
    states::{treasure_record_address, whitelist_address, EscrowRecord, TokenWhitelist, TreasureVault},
};

#[derive(Clone)]
struct VersionedVault {
    version: u64,
    vault: TreasureVault,
}

#[derive(Clone, Default)]
struct LedgerState {
    vault: Option<VersionedVault>,
    records: BTreeMap<Pubkey, EscrowRecord>,
    whitelist: BTreeMap<Pubkey, TokenWhitelist>,
    // token balances by owner; the vault PDA owns the escrow balance
    balances: HashMap<Pubkey, u64>,
}

struct TestLedger {
    state: LedgerState,
    vault_key: Pubkey,
    mint: Pubkey,
}

impl TestLedger {
    fn new() -> Self {
        let (vault_key, _) = Pubkey::find_program_address(&[crate::constants::VAULT_SEED], &crate::ID);
        Self {
            state: LedgerState::default(),
            vault_key,
            mint: Pubkey::new_unique(),
        }
    }

    fn fund(&mut self, owner: Pubkey, amount: u64) {
        *self.state.balances.entry(owner).or_default() += amount;
    }

    fn balance(&self, owner: &Pubkey) -> u64 {
        self.state.balances.get(owner).copied().unwrap_or(0)
    }

    fn vault(&self) -> &TreasureVault {
        &self.state.vault.as_ref().expect("vault initialized").vault
    }

    fn record(&self, address: &Pubkey) -> Option<&EscrowRecord> {
        self.state.records.get(address)
    }

    /// Serialized view of every account, for byte-level comparisons.
    fn snapshot(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        if let Some(v) = &self.state.vault {
            bytes.extend(v.vault.try_to_vec().unwrap());
        }
        for (address, record) in &self.state.records {
            bytes.extend(address.to_bytes());
            bytes.extend(record.try_to_vec().unwrap());
        }
        for (mint, entry) in &self.state.whitelist {
            bytes.extend(mint.to_bytes());
            bytes.extend(entry.try_to_vec().unwrap());
        }
        let mut balances: Vec<_> = self.state.balances.iter().collect();
        balances.sort();
        for (owner, amount) in balances {
            bytes.extend(owner.to_bytes());
            bytes.extend(amount.to_le_bytes());
        }
        bytes
    }

    /// Runs `f` on a staged copy; commits only on success and only if
    /// nobody advanced the vault row in between.
    fn transact<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut LedgerState) -> Result<()>,
    {
        let expected_version = self.state.vault.as_ref().map(|v| v.version);
        let mut staged = self.state.clone();
        f(&mut staged)?;

        let current_version = self.state.vault.as_ref().map(|v| v.version);
        if current_version != expected_version {
            return Err(ProgramError::AccountBorrowFailed.into());
        }
        if let Some(v) = staged.vault.as_mut() {
            v.version = expected_version.map_or(1, |version| version + 1);
        }
        self.state = staged;
        Ok(())
    }

    fn initialize(&mut self, authority: Pubkey) -> Result<()> {
        self.transact(|state| {
            let slot = state.vault.get_or_insert_with(|| VersionedVault {
                version: 0,
                vault: TreasureVault {
                    authority: Pubkey::default(),
                    total_hidden: 0,
                    total_claimed: 0,
                    bump: 0,
                },
            });
            slot.vault.open(authority, 255)
        })
    }

    fn whitelist_token(&mut self, signer: Pubkey, mint: Pubkey, enabled: bool) -> Result<()> {
        let (_, bump) = whitelist_address(&mint);
        self.transact(|state| {
            let vault = state.vault.as_ref().ok_or(ProgramError::UninitializedAccount)?;
            vault.vault.ensure_authority(&signer)?;
            state
                .whitelist
                .entry(mint)
                .or_insert_with(|| TokenWhitelist {
                    token_mint: Pubkey::default(),
                    enabled: false,
                    bump: 0,
                })
                .set(mint, enabled, bump);
            Ok(())
        })
    }

    fn update_vault(&mut self, signer: Pubkey, new_authority: Option<Pubkey>) -> Result<()> {
        self.transact(|state| {
            let vault = state.vault.as_mut().ok_or(ProgramError::UninitializedAccount)?;
            match new_authority {
                Some(next) => vault.vault.set_authority(&signer, next),
                None => vault.vault.ensure_authority(&signer),
            }
        })
    }

    fn hide(&mut self, player: Pubkey, amount: u64, identifier: i64) -> Result<Pubkey> {
        let mint = self.mint;
        self.hide_token(player, mint, amount, identifier)
    }

    fn hide_token(&mut self, player: Pubkey, mint: Pubkey, amount: u64, identifier: i64) -> Result<Pubkey> {
        let vault_key = self.vault_key;
        let (address, bump) = treasure_record_address(&player, identifier);
        self.transact(|state| {
            state
                .whitelist
                .get(&mint)
                .ok_or(EscrowError::TokenNotWhitelisted)?
                .ensure_accepts(&mint)?;

            let balance = state.balances.get(&player).copied().unwrap_or(0);
            let record = state.records.entry(address).or_insert_with(|| EscrowRecord {
                player: Pubkey::default(),
                amount: 0,
                identifier: 0,
                claimed: false,
                tier: 0,
                bump: 0,
            });
            record.ensure_hideable(amount, balance)?;

            // token transfer collaborator
            let from = state.balances.entry(player).or_default();
            *from = from
                .checked_sub(amount)
                .ok_or(EscrowError::InsufficientBalance)?;
            *state.balances.entry(vault_key).or_default() += amount;

            state
                .records
                .get_mut(&address)
                .expect("record staged above")
                .open(player, amount, identifier, bump);

            let vault = state.vault.as_mut().ok_or(ProgramError::UninitializedAccount)?;
            vault.vault.record_hidden(amount)
        })?;
        Ok(address)
    }

    fn claim(&mut self, signer: Pubkey, address: Pubkey) -> Result<()> {
        self.transact(|state| {
            let record = state
                .records
                .get_mut(&address)
                .ok_or(ProgramError::UninitializedAccount)?;
            record.claim(&signer)?;
            let amount = record.amount;

            let vault = state.vault.as_mut().ok_or(ProgramError::UninitializedAccount)?;
            vault.vault.record_claimed(amount)
        })
    }
}

fn code(err: anchor_lang::error::Error) -> u32 {
    match err {
        anchor_lang::error::Error::AnchorError(e) => e.error_code_number,
        other => panic!("unexpected error {other:?}"),
    }
}

/// Initialized vault with the escrow mint whitelisted.
fn listed_ledger() -> TestLedger {
    let mut ledger = TestLedger::new();
    let authority = Pubkey::new_unique();
    ledger.initialize(authority).unwrap();
    let mint = ledger.mint;
    ledger.whitelist_token(authority, mint, true).unwrap();
    ledger
}

fn ready_ledger() -> (TestLedger, Pubkey) {
    let mut ledger = listed_ledger();
    let player = Pubkey::new_unique();
    ledger.fund(player, 10_000_000_000);
    (ledger, player)
}

#[test]
fn initialize_twice_fails_without_touching_the_vault() {
    let mut ledger = TestLedger::new();
    let authority = Pubkey::new_unique();
    ledger.initialize(authority).unwrap();
    let before = ledger.snapshot();

    let err = ledger.initialize(Pubkey::new_unique()).unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::AlreadyInitialized));
    assert_eq!(ledger.snapshot(), before);
    assert_eq!(ledger.vault().authority, authority);
}

#[test]
fn distinct_hides_each_add_one_record_and_their_amount() {
    let (mut ledger, player) = ready_ledger();
    let other = Pubkey::new_unique();
    ledger.fund(other, 1_000_000_000);

    let deposits = [
        (player, 100_000_000u64, 1i64),
        (player, 250_000_000, 2),
        (other, 300_000_000, 1),
        (player, 1_000_000_000, 3),
    ];
    for (i, (who, amount, id)) in deposits.iter().enumerate() {
        let hidden_before = ledger.vault().total_hidden;
        ledger.hide(*who, *amount, *id).unwrap();
        assert_eq!(ledger.state.records.len(), i + 1);
        assert_eq!(ledger.vault().total_hidden, hidden_before + amount);
    }
    assert_eq!(ledger.balance(&ledger.vault_key), 1_650_000_000);
}

#[test]
fn below_minimum_hide_leaves_every_account_unchanged() {
    let (mut ledger, player) = ready_ledger();
    ledger.hide(player, MIN_DEPOSIT, 1).unwrap();
    let before = ledger.snapshot();

    for amount in [0, 1, 50_000_000, MIN_DEPOSIT - 1] {
        let err = ledger.hide(player, amount, 99).unwrap_err();
        assert_eq!(code(err), u32::from(EscrowError::InsufficientDeposit));
        assert_eq!(ledger.snapshot(), before);
    }
}

#[test]
fn reused_identifier_is_a_collision() {
    let (mut ledger, player) = ready_ledger();
    let address = ledger.hide(player, MIN_DEPOSIT, 42).unwrap();
    let before = ledger.snapshot();

    let err = ledger.hide(player, 2 * MIN_DEPOSIT, 42).unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::RecordAlreadyExists));
    assert_eq!(ledger.snapshot(), before);
    assert_eq!(ledger.record(&address).unwrap().amount, MIN_DEPOSIT);

    // same identifier, different player, different address
    let other = Pubkey::new_unique();
    ledger.fund(other, MIN_DEPOSIT);
    let other_address = ledger.hide(other, MIN_DEPOSIT, 42).unwrap();
    assert_ne!(other_address, address);
}

#[test]
fn hide_without_funds_fails_atomically() {
    let mut ledger = listed_ledger();
    let player = Pubkey::new_unique();
    ledger.fund(player, MIN_DEPOSIT - 1);
    let before = ledger.snapshot();

    let err = ledger.hide(player, MIN_DEPOSIT, 1).unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::InsufficientBalance));
    assert_eq!(ledger.snapshot(), before);
    assert!(ledger.state.records.is_empty());
}

#[test]
fn second_claim_is_rejected_and_totals_hold() {
    let (mut ledger, player) = ready_ledger();
    let address = ledger.hide(player, 300_000_000, 5).unwrap();

    ledger.claim(player, address).unwrap();
    assert_eq!(ledger.vault().total_claimed, 300_000_000);
    let before = ledger.snapshot();

    let err = ledger.claim(player, address).unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::AlreadyClaimed));
    assert_eq!(ledger.vault().total_claimed, 300_000_000);
    assert_eq!(ledger.snapshot(), before);
}

#[test]
fn only_the_depositor_can_claim() {
    let (mut ledger, player) = ready_ledger();
    let address = ledger.hide(player, MIN_DEPOSIT, 5).unwrap();

    let err = ledger.claim(Pubkey::new_unique(), address).unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::Unauthorized));
    assert!(!ledger.record(&address).unwrap().claimed);
    assert_eq!(ledger.vault().total_claimed, 0);
}

#[test]
fn hide_then_claim_walkthrough() {
    let (mut ledger, player) = ready_ledger();
    let t1 = 1_718_000_000i64;
    let address = ledger.hide(player, 500_000_000, t1).unwrap();

    let record = ledger.record(&address).unwrap();
    assert_eq!(record.player, player);
    assert_eq!(record.amount, 500_000_000);
    assert_eq!(record.identifier, t1);
    assert!(!record.claimed);

    let claimed_before = ledger.vault().total_claimed;
    ledger.claim(player, address).unwrap();
    assert!(ledger.record(&address).unwrap().claimed);
    assert_eq!(ledger.vault().total_claimed, claimed_before + 500_000_000);
    // claiming does not release escrowed tokens
    assert_eq!(ledger.balance(&ledger.vault_key), 500_000_000);
}

#[test]
fn rejected_small_hide_creates_nothing() {
    let (mut ledger, player) = ready_ledger();
    let hidden_before = ledger.vault().total_hidden;

    let err = ledger.hide(player, 50_000_000, 1_718_000_100).unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::InsufficientDeposit));
    assert!(ledger.state.records.is_empty());
    assert_eq!(ledger.vault().total_hidden, hidden_before);
}

#[test]
fn every_commit_advances_the_vault_version() {
    let (mut ledger, player) = ready_ledger();
    let v0 = ledger.state.vault.as_ref().unwrap().version;
    let address = ledger.hide(player, MIN_DEPOSIT, 1).unwrap();
    ledger.claim(player, address).unwrap();
    let _ = ledger.claim(player, address);
    assert_eq!(ledger.state.vault.as_ref().unwrap().version, v0 + 2);
}

#[test]
fn hide_requires_an_enabled_whitelist_entry() {
    let (mut ledger, player) = ready_ledger();
    let before = ledger.snapshot();

    let err = ledger
        .hide_token(player, Pubkey::new_unique(), MIN_DEPOSIT, 1)
        .unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::TokenNotWhitelisted));
    assert_eq!(ledger.snapshot(), before);

    let authority = ledger.vault().authority;
    let mint = ledger.mint;
    ledger.whitelist_token(authority, mint, false).unwrap();
    let err = ledger.hide(player, MIN_DEPOSIT, 1).unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::TokenNotWhitelisted));
    assert!(ledger.state.records.is_empty());
    assert_eq!(ledger.vault().total_hidden, 0);

    ledger.whitelist_token(authority, mint, true).unwrap();
    ledger.hide(player, MIN_DEPOSIT, 1).unwrap();
    assert_eq!(ledger.vault().total_hidden, MIN_DEPOSIT);
}

#[test]
fn only_the_authority_administers_the_vault() {
    let (mut ledger, _) = ready_ledger();
    let authority = ledger.vault().authority;
    let stranger = Pubkey::new_unique();
    let before = ledger.snapshot();

    let err = ledger
        .whitelist_token(stranger, Pubkey::new_unique(), true)
        .unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::Unauthorized));
    let err = ledger.update_vault(stranger, Some(stranger)).unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::Unauthorized));
    assert_eq!(ledger.snapshot(), before);

    let next = Pubkey::new_unique();
    ledger.update_vault(authority, Some(next)).unwrap();
    assert_eq!(ledger.vault().authority, next);

    // the previous authority lost its rights
    let err = ledger
        .whitelist_token(authority, Pubkey::new_unique(), true)
        .unwrap_err();
    assert_eq!(code(err), u32::from(EscrowError::Unauthorized));
    ledger.whitelist_token(next, Pubkey::new_unique(), true).unwrap();
}
