//! # Ledger Access
//!
//! Everything the engine reads from the chain goes through the
//! [`LedgerTransport`] trait. Responses are decoded into closed, typed
//! shapes at this boundary ([`FinalizedTransaction`], [`ParsedInstruction`],
//! [`SignatureStatus`], ...) so that business logic never pokes at raw JSON.
//!
//! ## Transports
//!
//! | Type                    | Purpose                                        |
//! |-------------------------|------------------------------------------------|
//! | [`rpc::RpcTransport`]   | Typed JSON-RPC client over `reqwest`           |
//! | [`raw::RawLifetimeClient`] | Hand-rolled `getLatestBlockhash` fallback   |
//! | [`memory::MemoryLedger`] | Scripted in-process ledger for tests and dry runs |
//!
//! Lifetime fetching is split into its own [`LifetimeSource`] trait because
//! the fallback path only ever needs that one call.

pub mod lifetime;
pub mod memory;
pub mod parsed;
pub mod raw;
pub mod rpc;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::address::Address;
use crate::error::{SettlementError, TransportError};

pub use lifetime::{get_transaction_lifetime, LifetimeFetcher, RetryPolicy};
pub use parsed::{FinalizedTransaction, ParsedInstruction};

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// A 64-byte transaction signature, base58 in text form. A transaction's
/// first signature is also its id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; 64]);

impl Signature {
    pub const LEN: usize = 64;

    pub const fn new_from_array(bytes: [u8; 64]) -> Self {
        Signature(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

impl FromStr for Signature {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|e| SettlementError::invalid_input("signature", e.to_string()))?;
        let array: [u8; 64] = bytes.as_slice().try_into().map_err(|_| {
            SettlementError::invalid_input(
                "signature",
                format!("expected {} bytes, got {}", Self::LEN, bytes.len()),
            )
        })?;
        Ok(Signature(array))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Ledger data
// ---------------------------------------------------------------------------

/// A recent blockhash and the last block height at which a transaction
/// referencing it is still accepted. Fetched fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionLifetime {
    #[serde(rename = "blockhash")]
    pub recent_hash: String,
    #[serde(rename = "lastValidBlockHeight")]
    pub valid_until_height: u64,
}

/// Commitment levels reported by signature status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    Processed,
    Confirmed,
    Finalized,
}

/// Where a submitted signature currently stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStatus {
    pub slot: u64,
    /// `None` once the block is rooted.
    pub confirmations: Option<u64>,
    /// The on-chain error, if the transaction failed.
    pub err: Option<serde_json::Value>,
    pub confirmation_status: Option<ConfirmationStatus>,
}

impl SignatureStatus {
    /// Landed at `confirmed` or better.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.confirmation_status,
            Some(ConfirmationStatus::Confirmed | ConfirmationStatus::Finalized)
        )
    }

    pub fn is_failed(&self) -> bool {
        self.err.is_some()
    }
}

/// Raw account contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountData {
    pub owner: Address,
    pub lamports: u64,
    pub data: Vec<u8>,
}

/// One token account found for an owner and mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccount {
    pub address: Address,
    pub amount_raw: u64,
    pub decimals: u8,
}

// ---------------------------------------------------------------------------
// Transport traits
// ---------------------------------------------------------------------------

/// Anything that can hand out a fresh transaction lifetime.
#[async_trait]
pub trait LifetimeSource: Send + Sync {
    async fn latest_lifetime(&self) -> Result<TransactionLifetime, TransportError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Read access to the ledger.
///
/// Lookups distinguish "does not exist" (`Ok(None)`) from "could not ask"
/// (`Err`). Implementations must not retry; retry policy belongs to the
/// caller.
#[async_trait]
pub trait LedgerTransport: LifetimeSource {
    /// A finalized transaction, decoded from its `jsonParsed` form.
    async fn transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<FinalizedTransaction>, TransportError>;

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, TransportError>;

    async fn account(&self, address: &Address) -> Result<Option<AccountData>, TransportError>;

    /// Lamport balance. Missing accounts hold zero lamports.
    async fn balance(&self, address: &Address) -> Result<u64, TransportError>;

    async fn token_accounts(
        &self,
        owner: &Address,
        mint: &Address,
    ) -> Result<Vec<TokenAccount>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let sig = Signature::new_from_array([42u8; 64]);
        let text = sig.to_string();
        assert_eq!(text.parse::<Signature>().unwrap(), sig);
        let json = serde_json::to_string(&sig).unwrap();
        assert_eq!(serde_json::from_str::<Signature>(&json).unwrap(), sig);
    }

    #[test]
    fn signature_rejects_wrong_length() {
        let short = bs58::encode([1u8; 32]).into_string();
        match short.parse::<Signature>() {
            Err(SettlementError::InvalidInput { field: "signature", reason }) => {
                assert!(reason.contains("got 32"), "{reason}");
            }
            other => panic!("expected InvalidInput, got {:?}", other),
        }
        assert!("not base58 0OIl".parse::<Signature>().is_err());
    }

    #[test]
    fn lifetime_uses_client_field_names() {
        let lifetime = TransactionLifetime {
            recent_hash: "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N".into(),
            valid_until_height: 1_234,
        };
        let json = serde_json::to_value(&lifetime).unwrap();
        assert_eq!(json["blockhash"], "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N");
        assert_eq!(json["lastValidBlockHeight"], 1_234);
    }

    #[test]
    fn status_classification() {
        let status: SignatureStatus = serde_json::from_value(serde_json::json!({
            "slot": 10,
            "confirmations": null,
            "err": null,
            "confirmationStatus": "finalized"
        }))
        .unwrap();
        assert!(status.is_confirmed());
        assert!(!status.is_failed());

        let failed: SignatureStatus = serde_json::from_value(serde_json::json!({
            "slot": 11,
            "confirmations": 3,
            "err": { "InstructionError": [0, { "Custom": 6001 }] },
            "confirmationStatus": "processed"
        }))
        .unwrap();
        assert!(!failed.is_confirmed());
        assert!(failed.is_failed());
    }
}
