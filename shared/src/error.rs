use thiserror::Error;


/// Why a raw escrow record could not be turned into a typed record.
/// Decoding never guesses: any of these drops the event.
#[derive(Debug , Clone , PartialEq , Eq , Error)]
pub enum DecodeError{
  #[error("Account data too short: got {len} bytes, need at least {min}")]
  TooShort { len : usize , min : usize },
  #[error("Unexpected account type tag: {0:?}")]
  UnexpectedTypeTag([u8 ; 8]),
  #[error("Invalid claimed flag: {0}")]
  InvalidClaimedFlag(u8),
  #[error("Invalid {encoding} account data: {reason}")]
  InvalidEncoding { encoding : &'static str , reason : String },
  #[error("Unsupported account data encoding: {0}")]
  UnsupportedEncoding(String),
}

#[derive(Debug , Error)]
pub enum EscrowError{
  #[error("Invalid pubkey: {0}")]
  InvalidPubkey(String),
  #[error("Invalid amount: {0}")]
  InvalidAmount(String),
  #[error("Invalid status: {0}")]
  InvalidStatus(String),
  #[error("Arithmetic overflow")]
  Overflow,
  #[error("Decode error: {0}")]
  Decode(#[from] DecodeError),
}

pub type EscrowResult<T> = Result<T , EscrowError>;
