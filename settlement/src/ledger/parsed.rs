//! Typed decoding of `getTransaction` responses in `jsonParsed` encoding.
//!
//! The RPC node already parses instructions of well-known programs into
//! `{ "type": ..., "info": {...} }` objects. We turn each one into a
//! [`ParsedInstruction`] variant immediately, keyed on the program id
//! rather than the node's free-form `program` label. Instructions we have
//! no use for become [`ParsedInstruction::Other`]; a known instruction with
//! a malformed `info` object is a decode error.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::Address;
use crate::config::{SPL_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID};
use crate::error::TransportError;

/// The instruction kinds settlement cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParsedInstruction {
    /// System program lamport transfer.
    SystemTransfer {
        source: Address,
        destination: Address,
        lamports: u64,
    },
    /// SPL token `transfer`. `source` and `destination` are token accounts.
    TokenTransfer {
        source: Address,
        destination: Address,
        authority: Option<Address>,
        amount: u64,
    },
    /// SPL token `transferChecked`, which also names the mint.
    TokenTransferChecked {
        source: Address,
        destination: Address,
        authority: Option<Address>,
        mint: Address,
        amount: u64,
        decimals: u8,
    },
    /// Anything else.
    Other {
        program_id: Address,
        instruction_type: Option<String>,
    },
}

/// A finalized transaction reduced to what verification needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedTransaction {
    pub slot: u64,
    pub block_time: Option<DateTime<Utc>>,
    pub fee: u64,
    /// The on-chain error, if execution failed.
    pub error: Option<Value>,
    /// Top-level instructions in order.
    pub instructions: Vec<ParsedInstruction>,
}

impl FinalizedTransaction {
    /// Decodes the `result` of a `getTransaction` call (non-null).
    pub fn from_rpc_json(value: Value) -> Result<Self, TransportError> {
        let raw: RawTransaction = decode(value, "transaction")?;
        let instructions = raw
            .transaction
            .message
            .instructions
            .into_iter()
            .map(decode_instruction)
            .collect::<Result<Vec<_>, _>>()?;
        let (error, fee) = match raw.meta {
            Some(meta) => (meta.err, meta.fee),
            None => (None, 0),
        };
        Ok(FinalizedTransaction {
            slot: raw.slot,
            block_time: raw
                .block_time
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            fee,
            error,
            instructions,
        })
    }

    /// Whether the ledger reports the transaction as failed.
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    slot: u64,
    block_time: Option<i64>,
    meta: Option<RawMeta>,
    transaction: RawEnvelope,
}

#[derive(Deserialize)]
struct RawMeta {
    err: Option<Value>,
    #[serde(default)]
    fee: u64,
}

#[derive(Deserialize)]
struct RawEnvelope {
    message: RawMessage,
}

#[derive(Deserialize)]
struct RawMessage {
    instructions: Vec<RawInstruction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInstruction {
    program_id: Address,
    parsed: Option<Value>,
}

#[derive(Deserialize)]
struct SystemTransferInfo {
    source: Address,
    destination: Address,
    lamports: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransferInfo {
    source: Address,
    destination: Address,
    #[serde(default, alias = "multisigAuthority")]
    authority: Option<Address>,
    amount: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransferCheckedInfo {
    source: Address,
    destination: Address,
    #[serde(default, alias = "multisigAuthority")]
    authority: Option<Address>,
    mint: Address,
    token_amount: UiTokenAmount,
}

#[derive(Deserialize)]
struct UiTokenAmount {
    amount: String,
    decimals: u8,
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::decode(format!("{what}: {e}")))
}

fn parse_amount(amount: &str) -> Result<u64, TransportError> {
    amount
        .parse()
        .map_err(|_| TransportError::decode(format!("token amount `{amount}` is not an integer")))
}

fn decode_instruction(raw: RawInstruction) -> Result<ParsedInstruction, TransportError> {
    let RawInstruction { program_id, parsed } = raw;
    let (kind, info) = match parsed {
        Some(Value::Object(mut map)) => {
            let kind = map
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_owned);
            (kind, map.remove("info"))
        }
        _ => (None, None),
    };

    let instruction = match (kind.as_deref(), info) {
        (Some("transfer"), Some(info)) if program_id == SYSTEM_PROGRAM_ID => {
            let info: SystemTransferInfo = decode(info, "system transfer")?;
            ParsedInstruction::SystemTransfer {
                source: info.source,
                destination: info.destination,
                lamports: info.lamports,
            }
        }
        (Some("transfer"), Some(info)) if program_id == SPL_TOKEN_PROGRAM_ID => {
            let info: TokenTransferInfo = decode(info, "token transfer")?;
            ParsedInstruction::TokenTransfer {
                source: info.source,
                destination: info.destination,
                authority: info.authority,
                amount: parse_amount(&info.amount)?,
            }
        }
        (Some("transferChecked"), Some(info)) if program_id == SPL_TOKEN_PROGRAM_ID => {
            let info: TokenTransferCheckedInfo = decode(info, "token transferChecked")?;
            ParsedInstruction::TokenTransferChecked {
                source: info.source,
                destination: info.destination,
                authority: info.authority,
                mint: info.mint,
                amount: parse_amount(&info.token_amount.amount)?,
                decimals: info.token_amount.decimals,
            }
        }
        _ => ParsedInstruction::Other {
            program_id,
            instruction_type: kind,
        },
    };
    Ok(instruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAYER: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const TREASURY: &str = "2VNKqH3aL3xQkZGZ7wj3F6GWZ5E6VSovs3svLesaxwCo";
    const PAYER_ATA: &str = "E2nJPAG2XcDngJWKZzaDpQFtAxncvwxAQKKFkBkKNFv3";
    const MINT: &str = "7zsunv4pLAzVWGCQts2k266TYJuLJfMvHcMbcRSR8xqf";

    fn envelope(instructions: Value, err: Value) -> Value {
        json!({
            "slot": 301_234_567u64,
            "blockTime": 1_760_000_000i64,
            "meta": { "err": err, "fee": 5000, "status": { "Ok": null } },
            "transaction": {
                "signatures": ["5h6xBEauJ3PK6SWCZ1PGjBvj8vDdWG3KpwATGy1ARAXFSDwt8GFXM7W5Ncn16wmqokgpiKRLuS83KUxyZyv2sUYv"],
                "message": { "instructions": instructions }
            }
        })
    }

    #[test]
    fn decodes_system_transfer() {
        let tx = FinalizedTransaction::from_rpc_json(envelope(
            json!([{
                "program": "system",
                "programId": "11111111111111111111111111111111",
                "parsed": {
                    "type": "transfer",
                    "info": { "source": PAYER, "destination": TREASURY, "lamports": 10_000_000 }
                },
                "stackHeight": null
            }]),
            Value::Null,
        ))
        .unwrap();

        assert!(!tx.failed());
        assert_eq!(tx.fee, 5000);
        assert_eq!(tx.block_time.unwrap().timestamp(), 1_760_000_000);
        assert_eq!(
            tx.instructions,
            vec![ParsedInstruction::SystemTransfer {
                source: PAYER.parse().unwrap(),
                destination: TREASURY.parse().unwrap(),
                lamports: 10_000_000,
            }]
        );
    }

    #[test]
    fn decodes_token_transfers() {
        let tx = FinalizedTransaction::from_rpc_json(envelope(
            json!([
                {
                    "program": "spl-token",
                    "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                    "parsed": {
                        "type": "transfer",
                        "info": {
                            "source": PAYER_ATA,
                            "destination": TREASURY,
                            "authority": PAYER,
                            "amount": "1000000"
                        }
                    }
                },
                {
                    "program": "spl-token",
                    "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                    "parsed": {
                        "type": "transferChecked",
                        "info": {
                            "source": PAYER_ATA,
                            "destination": TREASURY,
                            "multisigAuthority": PAYER,
                            "signers": [PAYER],
                            "mint": MINT,
                            "tokenAmount": {
                                "amount": "2500000",
                                "decimals": 6,
                                "uiAmount": 2.5,
                                "uiAmountString": "2.5"
                            }
                        }
                    }
                }
            ]),
            Value::Null,
        ))
        .unwrap();

        assert_eq!(
            tx.instructions[0],
            ParsedInstruction::TokenTransfer {
                source: PAYER_ATA.parse().unwrap(),
                destination: TREASURY.parse().unwrap(),
                authority: Some(PAYER.parse().unwrap()),
                amount: 1_000_000,
            }
        );
        match &tx.instructions[1] {
            ParsedInstruction::TokenTransferChecked {
                mint,
                amount,
                decimals,
                authority,
                ..
            } => {
                assert_eq!(mint.to_string(), MINT);
                assert_eq!(*amount, 2_500_000);
                assert_eq!(*decimals, 6);
                assert_eq!(authority.unwrap().to_string(), PAYER);
            }
            other => panic!("expected TokenTransferChecked, got {:?}", other),
        }
    }

    #[test]
    fn unknown_and_unparsed_instructions_are_other() {
        let tx = FinalizedTransaction::from_rpc_json(envelope(
            json!([
                {
                    "programId": "6Zxc4uCXKqWS6spnW7u9wA81PChgws6wbGAKJyi8PnvT",
                    "accounts": [PAYER],
                    "data": "3Bxs4h24hBtQy9rw",
                    "stackHeight": null
                },
                {
                    "program": "spl-memo",
                    "programId": "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr",
                    "parsed": "neptu reading"
                },
                {
                    "program": "system",
                    "programId": "11111111111111111111111111111111",
                    "parsed": { "type": "createAccount", "info": {} }
                }
            ]),
            Value::Null,
        ))
        .unwrap();

        assert_eq!(tx.instructions.len(), 3);
        assert!(tx
            .instructions
            .iter()
            .all(|ix| matches!(ix, ParsedInstruction::Other { .. })));
        match &tx.instructions[2] {
            ParsedInstruction::Other {
                instruction_type, ..
            } => assert_eq!(instruction_type.as_deref(), Some("createAccount")),
            other => panic!("expected Other, got {:?}", other),
        }
    }

    #[test]
    fn failed_transactions_keep_their_error() {
        let tx = FinalizedTransaction::from_rpc_json(envelope(
            json!([]),
            json!({ "InstructionError": [0, { "Custom": 1 }] }),
        ))
        .unwrap();
        assert!(tx.failed());
    }

    #[test]
    fn malformed_known_instruction_is_a_decode_error() {
        let result = FinalizedTransaction::from_rpc_json(envelope(
            json!([{
                "program": "spl-token",
                "programId": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
                "parsed": {
                    "type": "transfer",
                    "info": { "source": PAYER_ATA, "destination": TREASURY, "amount": "1.5" }
                }
            }]),
            Value::Null,
        ));
        match result {
            Err(TransportError::Decode(reason)) => assert!(reason.contains("1.5"), "{reason}"),
            other => panic!("expected Decode, got {:?}", other),
        }
    }
}
