//! Escrow record account decoding.
//!
//! Reads the record straight from fixed byte offsets instead of going through
//! a ledger deserializer, because webhook payloads carry account bytes that do
//! not always match what a live RPC read returns. The layout is a versioned
//! contract with the on-chain program:
//!
//! | Bytes | Field |
//! |-------|-------|
//! | 0..8  | type tag (Anchor discriminator) |
//! | 8..40 | player |
//! | 40..48 | amount, u64 LE |
//! | 48..56 | identifier, i64 LE |
//! | 56    | claimed, 0/1 |
//! | 57    | tier (reserved, never read) |
//! | 58    | bump (ignored) |

use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

use crate::DecodeError;

/// `sha256("account:EscrowRecord")[..8]`
pub const ESCROW_RECORD_DISCRIMINATOR: [u8; 8] = [174, 124, 167, 70, 91, 85, 212, 227];
/// `sha256("global:hide")[..8]`
pub const HIDE_INSTRUCTION_DISCRIMINATOR: [u8; 8] = [174, 155, 104, 251, 192, 201, 92, 117];
/// `sha256("global:claim")[..8]`
pub const CLAIM_INSTRUCTION_DISCRIMINATOR: [u8; 8] = [62, 198, 214, 193, 213, 159, 108, 210];

pub const TYPE_TAG_LEN: usize = 8;
pub const PLAYER_OFFSET: usize = 8;
pub const AMOUNT_OFFSET: usize = 40;
pub const IDENTIFIER_OFFSET: usize = 48;
pub const CLAIMED_OFFSET: usize = 56;
/// Reserved for the tier byte. Kept in the layout, skipped on decode.
pub const TIER_OFFSET: usize = 57;
pub const BUMP_OFFSET: usize = 58;

/// Everything up to and including the reserved tier byte.
pub const MIN_RECORD_LEN: usize = 58;
/// Full on-chain size: 8 byte tag + 51 bytes of fields.
pub const RECORD_LEN: usize = 59;

/// The logical fields of an escrow record that the pipeline relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowRecordAccount {
    pub player: [u8; 32],
    pub amount: u64,
    pub identifier: i64,
    pub claimed: bool,
}

impl EscrowRecordAccount {
    pub fn player_base58(&self) -> String {
        bs58::encode(self.player).into_string()
    }

    /// Serializes into the on-chain layout. `tier` and `bump` are written as
    /// given; decoding ignores both.
    pub fn encode(&self, tier: u8, bump: u8) -> Vec<u8> {
        let mut data = Vec::with_capacity(RECORD_LEN);
        data.extend_from_slice(&ESCROW_RECORD_DISCRIMINATOR);
        data.extend_from_slice(&self.player);
        data.extend_from_slice(&self.amount.to_le_bytes());
        data.extend_from_slice(&self.identifier.to_le_bytes());
        data.push(u8::from(self.claimed));
        data.push(tier);
        data.push(bump);
        data
    }
}

/// Decodes an escrow record. Fails closed on short buffers, a foreign type
/// tag, or a claimed byte that is neither 0 nor 1.
pub fn decode_escrow_record(data: &[u8]) -> Result<EscrowRecordAccount, DecodeError> {
    if data.len() < MIN_RECORD_LEN {
        return Err(DecodeError::TooShort {
            len: data.len(),
            min: MIN_RECORD_LEN,
        });
    }

    let mut tag = [0u8; TYPE_TAG_LEN];
    tag.copy_from_slice(&data[..TYPE_TAG_LEN]);
    if tag != ESCROW_RECORD_DISCRIMINATOR {
        return Err(DecodeError::UnexpectedTypeTag(tag));
    }

    let mut player = [0u8; 32];
    player.copy_from_slice(&data[PLAYER_OFFSET..AMOUNT_OFFSET]);
    let amount = u64::from_le_bytes(read_8(data, AMOUNT_OFFSET));
    let identifier = i64::from_le_bytes(read_8(data, IDENTIFIER_OFFSET));
    let claimed = match data[CLAIMED_OFFSET] {
        0 => false,
        1 => true,
        other => return Err(DecodeError::InvalidClaimedFlag(other)),
    };

    Ok(EscrowRecordAccount {
        player,
        amount,
        identifier,
        claimed,
    })
}

fn read_8(data: &[u8], offset: usize) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    buf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountDataEncoding {
    Base64,
    Base58,
}

impl AccountDataEncoding {
    pub fn parse(name: &str) -> Result<Self, DecodeError> {
        match name.to_ascii_lowercase().as_str() {
            "base64" => Ok(Self::Base64),
            "base58" => Ok(Self::Base58),
            other => Err(DecodeError::UnsupportedEncoding(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base64 => "base64",
            Self::Base58 => "base58",
        }
    }
}

/// Turns a text-encoded account payload into raw bytes.
pub fn decode_account_data(
    data: &str,
    encoding: AccountDataEncoding,
) -> Result<Vec<u8>, DecodeError> {
    match encoding {
        AccountDataEncoding::Base64 => {
            STANDARD
                .decode(data.trim())
                .map_err(|e| DecodeError::InvalidEncoding {
                    encoding: encoding.as_str(),
                    reason: e.to_string(),
                })
        }
        AccountDataEncoding::Base58 => {
            bs58::decode(data.trim())
                .into_vec()
                .map_err(|e| DecodeError::InvalidEncoding {
                    encoding: encoding.as_str(),
                    reason: e.to_string(),
                })
        }
    }
}

pub fn encode_account_data(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Anchor discriminator for `namespace:name`.
pub fn anchor_discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("{namespace}:{name}").as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}
