//! Turns a transaction envelope into the sync events it implies.
//!
//! Relevance is decided by the program id, classification by the Anchor
//! instruction discriminator (with the `Instruction: X` log line as a
//! fallback for providers that omit instruction data), and the deposit
//! itself comes from the decoded record account, never from the client. A
//! hide whose record is already claimed in the same transaction yields the
//! deposit followed by its claim.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use shared::{
    decode_escrow_record, ClaimEvent, DecodeError, DepositEvent, EscrowRecordAccount, SyncEvent,
    CLAIM_INSTRUCTION_DISCRIMINATOR, ESCROW_RECORD_DISCRIMINATOR, HIDE_INSTRUCTION_DISCRIMINATOR,
};

use super::envelope::{EnvelopeInstruction, TransactionEnvelope};

const TREASURE_SEED: &[u8] = b"treasure";

/// Account positions in the escrow program's instructions.
const HIDE_PLAYER_INDEX: usize = 0;
const HIDE_RECORD_INDEX: usize = 4;
const CLAIM_PLAYER_INDEX: usize = 0;
const CLAIM_RECORD_INDEX: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowInstruction {
    Hide,
    Claim,
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Record account {0} not present in account data")]
    MissingRecordAccount(String),
    #[error("No escrow record account found in transaction")]
    NoRecordAccount,
    #[error("Instruction is missing account #{0}")]
    MissingInstructionAccount(usize),
    #[error("Failed to decode record account: {0}")]
    Decode(#[from] DecodeError),
    #[error("Record address {actual} does not match derived address {expected}")]
    AddressMismatch { expected: String, actual: String },
    #[error("Claim signer {signer} is not the record's player {player}")]
    ClaimerMismatch { signer: String, player: String },
    #[error("Invalid account address: {0}")]
    InvalidAddress(String),
}

/// Why an envelope produced no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotEscrowProgram,
    TransactionFailed,
    UnrelatedInstruction,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotEscrowProgram => "not_escrow_program",
            SkipReason::TransactionFailed => "transaction_failed",
            SkipReason::UnrelatedInstruction => "unrelated_instruction",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// In the order they must be applied.
    Events(Vec<SyncEvent>),
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct Extractor {
    program_id: Pubkey,
    program_id_str: String,
}

impl Extractor {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            program_id_str: program_id.to_string(),
        }
    }

    pub fn program_id(&self) -> &str {
        &self.program_id_str
    }

    pub fn extract(&self, envelope: &TransactionEnvelope) -> Result<Extraction, ExtractError> {
        if !envelope.touches(&self.program_id_str) {
            return Ok(Extraction::Skipped(SkipReason::NotEscrowProgram));
        }
        if envelope.failed() {
            return Ok(Extraction::Skipped(SkipReason::TransactionFailed));
        }

        let instruction = self.program_instruction(envelope);
        let kind = instruction
            .and_then(|ix| classify_data(&ix.data_bytes()?))
            .or_else(|| classify_logs(&envelope.log_messages));

        let events = match kind {
            Some(EscrowInstruction::Hide) => self.extract_hide(envelope, instruction)?,
            Some(EscrowInstruction::Claim) => {
                vec![SyncEvent::Claim(self.extract_claim(envelope, instruction)?)]
            }
            None => return Ok(Extraction::Skipped(SkipReason::UnrelatedInstruction)),
        };
        Ok(Extraction::Events(events))
    }

    /// First top-level instruction addressed to the escrow program that
    /// carries a known discriminator, else the first one addressed to it.
    fn program_instruction<'a>(&self, envelope: &'a TransactionEnvelope) -> Option<&'a EnvelopeInstruction> {
        let mut ours = envelope
            .instructions
            .iter()
            .filter(|ix| ix.program_id == self.program_id_str);
        let first = ours.clone().next();
        ours.find(|ix| ix.data_bytes().and_then(|d| classify_data(&d)).is_some())
            .or(first)
    }

    fn extract_hide(
        &self,
        envelope: &TransactionEnvelope,
        instruction: Option<&EnvelopeInstruction>,
    ) -> Result<Vec<SyncEvent>, ExtractError> {
        let (record_address, record) = match instruction {
            Some(ix) if ix.accounts.len() > HIDE_RECORD_INDEX => {
                let address = ix.accounts[HIDE_RECORD_INDEX].clone();
                let record = self.decode_record_at(envelope, &address)?;
                (address, record)
            }
            _ => self.find_record(envelope)?,
        };

        self.verify_record_address(&record_address, &record)?;

        if let Some(player) = instruction.and_then(|ix| ix.accounts.get(HIDE_PLAYER_INDEX)) {
            if *player != record.player_base58() {
                tracing::warn!(
                    signature = %envelope.signature,
                    instruction_player = %player,
                    record_player = %record.player_base58(),
                    "Hide signer differs from record player; trusting the record"
                );
            }
        }

        let mut events = Vec::with_capacity(2);
        events.push(SyncEvent::Deposit(DepositEvent {
            signature: envelope.signature.clone(),
            wallet_address: record.player_base58(),
            amount: record.amount,
            token_mint: envelope.token_transfers.first().map(|t| t.mint.clone()),
            record_address: record_address.clone(),
            identifier: record.identifier,
            block_time: envelope.block_time,
            slot: envelope.slot,
            fee: envelope.fee,
        }));

        // hide and claim landed in one transaction; the post-state shows both
        if record.claimed {
            events.push(SyncEvent::Claim(ClaimEvent {
                signature: envelope.signature.clone(),
                record_address,
                claimed_by: record.player_base58(),
                block_time: envelope.block_time,
                slot: envelope.slot,
            }));
        }
        Ok(events)
    }

    fn extract_claim(
        &self,
        envelope: &TransactionEnvelope,
        instruction: Option<&EnvelopeInstruction>,
    ) -> Result<ClaimEvent, ExtractError> {
        let (claimed_by, record_address) = match instruction {
            Some(ix) => {
                let player = ix
                    .accounts
                    .get(CLAIM_PLAYER_INDEX)
                    .ok_or(ExtractError::MissingInstructionAccount(CLAIM_PLAYER_INDEX))?;
                let record = ix
                    .accounts
                    .get(CLAIM_RECORD_INDEX)
                    .ok_or(ExtractError::MissingInstructionAccount(CLAIM_RECORD_INDEX))?;
                (player.clone(), record.clone())
            }
            None => {
                let (address, record) = self.find_record(envelope)?;
                (record.player_base58(), address)
            }
        };

        // the post-state is optional for claims, but when present it must agree
        if let Some(entry) = envelope.account_data_for(&record_address) {
            let record = decode_escrow_record(&entry.data.to_bytes()?)?;
            if record.player_base58() != claimed_by {
                return Err(ExtractError::ClaimerMismatch {
                    signer: claimed_by,
                    player: record.player_base58(),
                });
            }
        }

        Ok(ClaimEvent {
            signature: envelope.signature.clone(),
            record_address,
            claimed_by,
            block_time: envelope.block_time,
            slot: envelope.slot,
        })
    }

    fn decode_record_at(
        &self,
        envelope: &TransactionEnvelope,
        address: &str,
    ) -> Result<EscrowRecordAccount, ExtractError> {
        let entry = envelope
            .account_data_for(address)
            .ok_or_else(|| ExtractError::MissingRecordAccount(address.to_string()))?;
        Ok(decode_escrow_record(&entry.data.to_bytes()?)?)
    }

    /// Scans account data for the single entry tagged as an escrow record.
    fn find_record(
        &self,
        envelope: &TransactionEnvelope,
    ) -> Result<(String, EscrowRecordAccount), ExtractError> {
        envelope
            .account_data
            .iter()
            .filter(|entry| {
                entry
                    .owner
                    .as_deref()
                    .map_or(true, |owner| owner == self.program_id_str)
            })
            .find_map(|entry| {
                let bytes = entry.data.to_bytes().ok()?;
                if !bytes.starts_with(&ESCROW_RECORD_DISCRIMINATOR) {
                    return None;
                }
                Some(decode_escrow_record(&bytes).map(|record| (entry.account.clone(), record)))
            })
            .ok_or(ExtractError::NoRecordAccount)?
            .map_err(ExtractError::from)
    }

    fn verify_record_address(
        &self,
        address: &str,
        record: &EscrowRecordAccount,
    ) -> Result<(), ExtractError> {
        let expected = record_address(&self.program_id, &record.player, record.identifier);
        let actual = Pubkey::from_str(address)
            .map_err(|_| ExtractError::InvalidAddress(address.to_string()))?;
        if expected != actual {
            return Err(ExtractError::AddressMismatch {
                expected: expected.to_string(),
                actual: address.to_string(),
            });
        }
        Ok(())
    }
}

/// Address of the record for `(player, identifier)`.
pub fn record_address(program_id: &Pubkey, player: &[u8; 32], identifier: i64) -> Pubkey {
    let (address, _bump) = Pubkey::find_program_address(
        &[TREASURE_SEED, player.as_ref(), &identifier.to_le_bytes()],
        program_id,
    );
    address
}

pub fn classify_data(data: &[u8]) -> Option<EscrowInstruction> {
    let tag = data.get(..8)?;
    if tag == HIDE_INSTRUCTION_DISCRIMINATOR {
        Some(EscrowInstruction::Hide)
    } else if tag == CLAIM_INSTRUCTION_DISCRIMINATOR {
        Some(EscrowInstruction::Claim)
    } else {
        None
    }
}

pub fn classify_logs(logs: &[String]) -> Option<EscrowInstruction> {
    logs.iter().find_map(|line| {
        match line.trim().strip_prefix("Program log: Instruction: ")? {
            "Hide" => Some(EscrowInstruction::Hide),
            "Claim" => Some(EscrowInstruction::Claim),
            _ => None,
        }
    })
}
