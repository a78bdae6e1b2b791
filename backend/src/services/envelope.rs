//! Transaction envelopes as delivered by the webhook provider.
//!
//! This is the only place that knows the provider's JSON shape. Account data
//! framing varies between providers and between their "raw" and "enhanced"
//! payloads, so [`AccountDataPayload`] accepts every framing seen in practice
//! and normalizes it to bytes.

use serde::Deserialize;
use shared::{decode_account_data, AccountDataEncoding, DecodeError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEnvelope {
    pub signature: String,
    #[serde(default)]
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub fee_payer: Option<String>,
    #[serde(default)]
    pub transaction_error: Option<serde_json::Value>,
    #[serde(default)]
    pub account_keys: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<EnvelopeInstruction>,
    #[serde(default)]
    pub log_messages: Vec<String>,
    #[serde(default)]
    pub account_data: Vec<AccountDataEntry>,
    #[serde(default)]
    pub token_transfers: Vec<TokenTransfer>,
}

impl TransactionEnvelope {
    pub fn failed(&self) -> bool {
        self.transaction_error
            .as_ref()
            .is_some_and(|err| !err.is_null())
    }

    /// Every account the transaction touched, including invoked programs.
    pub fn touches(&self, account: &str) -> bool {
        self.account_keys.iter().any(|k| k == account)
            || self.instructions.iter().any(|ix| ix.program_id == account)
    }

    pub fn account_data_for(&self, account: &str) -> Option<&AccountDataEntry> {
        self.account_data.iter().find(|entry| entry.account == account)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeInstruction {
    pub program_id: String,
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Base58 instruction data
    #[serde(default)]
    pub data: String,
}

impl EnvelopeInstruction {
    pub fn data_bytes(&self) -> Option<Vec<u8>> {
        bs58::decode(&self.data).into_vec().ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDataEntry {
    pub account: String,
    pub data: AccountDataPayload,
    #[serde(default)]
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccountDataPayload {
    /// Bare base64 string
    Plain(String),
    /// `[data, "base64" | "base58"]`, the RPC `getAccountInfo` framing
    Pair(String, String),
    Object { data: String, encoding: String },
}

impl AccountDataPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        match self {
            AccountDataPayload::Plain(data) => decode_account_data(data, AccountDataEncoding::Base64),
            AccountDataPayload::Pair(data, encoding)
            | AccountDataPayload::Object { data, encoding } => {
                decode_account_data(data, AccountDataEncoding::parse(encoding)?)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    pub mint: String,
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    #[serde(default)]
    pub token_amount: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn account_data_framings_normalize_to_the_same_bytes() {
        let bytes = vec![1u8, 2, 3, 250];
        let b64 = shared::encode_account_data(&bytes);
        let b58 = bs58::encode(&bytes).into_string();

        let framings = [
            json!(b64),
            json!([b64, "base64"]),
            json!([b58, "base58"]),
            json!({ "data": b64, "encoding": "base64" }),
        ];
        for framing in framings {
            let payload: AccountDataPayload = serde_json::from_value(framing).unwrap();
            assert_eq!(payload.to_bytes().unwrap(), bytes);
        }
    }

    #[test]
    fn unknown_encoding_fails_closed() {
        let payload: AccountDataPayload =
            serde_json::from_value(json!(["{}", "jsonParsed"])).unwrap();
        assert!(matches!(
            payload.to_bytes(),
            Err(DecodeError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn envelope_defaults_and_failure_flag() {
        let env: TransactionEnvelope = serde_json::from_value(json!({
            "signature": "sig",
            "transactionError": null,
            "someProviderField": 7
        }))
        .unwrap();
        assert!(!env.failed());
        assert!(env.instructions.is_empty());

        let env: TransactionEnvelope = serde_json::from_value(json!({
            "signature": "sig",
            "transactionError": { "InstructionError": [0, { "Custom": 6000 }] }
        }))
        .unwrap();
        assert!(env.failed());
    }
}
