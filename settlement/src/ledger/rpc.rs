//! # JSON-RPC Transport
//!
//! A typed Solana JSON-RPC 2.0 client over `reqwest`. Request/response
//! envelopes are plain serde types; each ledger call decodes its `result`
//! into a private wire struct and then into the crate's own types.
//!
//! ## Method Index
//!
//! | Method                     | Used for                                  |
//! |----------------------------|-------------------------------------------|
//! | `getLatestBlockhash`       | transaction lifetime                      |
//! | `getTransaction`           | payment verification (`jsonParsed`)       |
//! | `getSignatureStatuses`     | confirmation polling                      |
//! | `getAccountInfo`           | claim records, pricing config, economy state |
//! | `getBalance`               | SOL balances                              |
//! | `getTokenAccountsByOwner`  | token balances                            |
//!
//! The client carries a whole-request timeout as a backstop; the
//! resilience layer applies its own, tighter one on top.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, trace};

use super::{
    AccountData, FinalizedTransaction, LedgerTransport, LifetimeSource, Signature,
    SignatureStatus, TokenAccount, TransactionLifetime,
};
use crate::address::Address;
use crate::config::{LEDGER_CALL_TIMEOUT, LIFETIME_COMMITMENT};
use crate::error::TransportError;

// ---------------------------------------------------------------------------
// RPC Method Enumeration
// ---------------------------------------------------------------------------

/// The ledger RPC methods the engine calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcMethod {
    GetLatestBlockhash,
    GetTransaction,
    GetSignatureStatuses,
    GetAccountInfo,
    GetBalance,
    GetTokenAccountsByOwner,
}

// ---------------------------------------------------------------------------
// RPC Request / Response
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version. Always "2.0".
    pub jsonrpc: String,
    pub id: u64,
    pub method: RpcMethod,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: RpcMethod, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method,
            params,
        }
    }
}

/// A JSON-RPC 2.0 response. A conforming node sets exactly one of
/// `result` and `error`; a `null` result is a legitimate answer
/// ("not found") and deserializes as `None` here too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Decodes the result as `T`, mapping an error object to
    /// [`TransportError::Rpc`]. A missing or `null` result is offered to
    /// `T` as JSON `null`, so `Option<_>` targets see `None`.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, TransportError> {
        if let Some(error) = self.error {
            return Err(TransportError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(self.result.unwrap_or(Value::Null))
            .map_err(|e| TransportError::decode(e.to_string()))
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ---------------------------------------------------------------------------
// Result payloads
// ---------------------------------------------------------------------------

/// Most Solana methods wrap their answer in `{ context, value }`.
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockhashValue {
    blockhash: String,
    last_valid_block_height: u64,
}

#[derive(Debug, Deserialize)]
struct AccountInfoValue {
    /// `[payload, "base64"]`
    data: (String, String),
    owner: Address,
    lamports: u64,
}

#[derive(Debug, Deserialize)]
struct KeyedTokenAccount {
    pubkey: Address,
    account: ParsedTokenAccountValue,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAccountValue {
    data: ParsedTokenAccountData,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAccountData {
    parsed: ParsedTokenAccountInfo,
}

#[derive(Debug, Deserialize)]
struct ParsedTokenAccountInfo {
    info: TokenAccountInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenAccountInfo {
    token_amount: TokenAmount,
}

#[derive(Debug, Deserialize)]
struct TokenAmount {
    amount: String,
    decimals: u8,
}

// ---------------------------------------------------------------------------
// RpcTransport
// ---------------------------------------------------------------------------

/// Ledger transport speaking JSON-RPC over HTTP.
#[derive(Debug)]
pub struct RpcTransport {
    endpoint: String,
    client: Client,
    next_id: AtomicU64,
}

impl RpcTransport {
    /// Client for `endpoint` with the default per-request timeout.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(endpoint, LEDGER_CALL_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends one request and decodes its result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: RpcMethod,
        params: Value,
    ) -> Result<T, TransportError> {
        let request = RpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);
        trace!(endpoint = %self.endpoint, ?method, id = request.id, "rpc request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        let body: RpcResponse = response.json().await.map_err(http_error)?;
        debug!(endpoint = %self.endpoint, ?method, ok = body.error.is_none(), "rpc response");
        body.into_result()
    }
}

pub(crate) fn http_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Http(format!("timed out: {err}"))
    } else if err.is_decode() {
        TransportError::decode(err.to_string())
    } else {
        TransportError::Http(err.to_string())
    }
}

#[async_trait]
impl LifetimeSource for RpcTransport {
    async fn latest_lifetime(&self) -> Result<TransactionLifetime, TransportError> {
        let result: WithContext<BlockhashValue> = self
            .call(
                RpcMethod::GetLatestBlockhash,
                json!([{ "commitment": LIFETIME_COMMITMENT }]),
            )
            .await?;
        Ok(TransactionLifetime {
            recent_hash: result.value.blockhash,
            valid_until_height: result.value.last_valid_block_height,
        })
    }

    fn describe(&self) -> String {
        format!("rpc {}", self.endpoint)
    }
}

#[async_trait]
impl LedgerTransport for RpcTransport {
    async fn transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<FinalizedTransaction>, TransportError> {
        let result: Option<Value> = self
            .call(
                RpcMethod::GetTransaction,
                json!([
                    signature.to_string(),
                    {
                        "encoding": "jsonParsed",
                        "commitment": "finalized",
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;
        result.map(FinalizedTransaction::from_rpc_json).transpose()
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, TransportError> {
        let result: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                RpcMethod::GetSignatureStatuses,
                json!([[signature.to_string()], { "searchTransactionHistory": true }]),
            )
            .await?;
        Ok(result.value.into_iter().next().flatten())
    }

    async fn account(&self, address: &Address) -> Result<Option<AccountData>, TransportError> {
        let result: WithContext<Option<AccountInfoValue>> = self
            .call(
                RpcMethod::GetAccountInfo,
                json!([address.to_string(), { "encoding": "base64", "commitment": "confirmed" }]),
            )
            .await?;
        result
            .value
            .map(|info| {
                let (payload, encoding) = info.data;
                if encoding != "base64" {
                    return Err(TransportError::decode(format!(
                        "unexpected account encoding `{encoding}`"
                    )));
                }
                let data = BASE64
                    .decode(payload)
                    .map_err(|e| TransportError::decode(format!("account data: {e}")))?;
                Ok(AccountData {
                    owner: info.owner,
                    lamports: info.lamports,
                    data,
                })
            })
            .transpose()
    }

    async fn balance(&self, address: &Address) -> Result<u64, TransportError> {
        let result: WithContext<u64> = self
            .call(
                RpcMethod::GetBalance,
                json!([address.to_string(), { "commitment": "confirmed" }]),
            )
            .await?;
        Ok(result.value)
    }

    async fn token_accounts(
        &self,
        owner: &Address,
        mint: &Address,
    ) -> Result<Vec<TokenAccount>, TransportError> {
        let result: WithContext<Vec<KeyedTokenAccount>> = self
            .call(
                RpcMethod::GetTokenAccountsByOwner,
                json!([
                    owner.to_string(),
                    { "mint": mint.to_string() },
                    { "encoding": "jsonParsed", "commitment": "confirmed" }
                ]),
            )
            .await?;
        result
            .value
            .into_iter()
            .map(|keyed| {
                let amount = keyed.account.data.parsed.info.token_amount;
                Ok(TokenAccount {
                    address: keyed.pubkey,
                    amount_raw: amount.amount.parse().map_err(|_| {
                        TransportError::decode(format!("token amount `{}`", amount.amount))
                    })?,
                    decimals: amount.decimals,
                })
            })
            .collect()
    }
}
