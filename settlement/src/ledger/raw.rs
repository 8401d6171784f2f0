//! Fallback lifetime fetch.
//!
//! A deliberately small client: it builds the `getLatestBlockhash` body by
//! hand and walks `result.value` itself, sharing nothing with
//! [`RpcTransport`](super::rpc::RpcTransport) except `reqwest`. When the
//! primary transport misbehaves (bad pooled connection, codec bug, a
//! wedged custom endpoint) this path still has a chance.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::rpc::http_error;
use super::{LifetimeSource, TransactionLifetime};
use crate::config::{LEDGER_CALL_TIMEOUT, LIFETIME_COMMITMENT};
use crate::error::TransportError;

/// Raw JSON-RPC `getLatestBlockhash` against a fixed URL.
#[derive(Debug, Clone)]
pub struct RawLifetimeClient {
    url: String,
    client: Client,
}

impl RawLifetimeClient {
    pub fn new(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_timeout(url, LEDGER_CALL_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// The exact request body sent by the fallback.
pub fn lifetime_request_body() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "getLatestBlockhash",
        "params": [{ "commitment": LIFETIME_COMMITMENT }]
    })
}

/// Pulls the lifetime out of a raw response body.
pub fn parse_lifetime_response(body: &Value) -> Result<TransactionLifetime, TransportError> {
    if let Some(error) = body.get("error") {
        return Err(TransportError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    let value = body
        .pointer("/result/value")
        .ok_or_else(|| TransportError::decode("missing result.value"))?;
    let recent_hash = value
        .get("blockhash")
        .and_then(Value::as_str)
        .filter(|hash| !hash.is_empty())
        .ok_or_else(|| TransportError::decode("missing blockhash"))?;
    let valid_until_height = value
        .get("lastValidBlockHeight")
        .and_then(Value::as_u64)
        .ok_or_else(|| TransportError::decode("missing lastValidBlockHeight"))?;
    Ok(TransactionLifetime {
        recent_hash: recent_hash.to_string(),
        valid_until_height,
    })
}

#[async_trait]
impl LifetimeSource for RawLifetimeClient {
    async fn latest_lifetime(&self) -> Result<TransactionLifetime, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(lifetime_request_body().to_string())
            .send()
            .await
            .map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        let text = response.text().await.map_err(http_error)?;
        let body: Value =
            serde_json::from_str(&text).map_err(|e| TransportError::decode(e.to_string()))?;
        let lifetime = parse_lifetime_response(&body)?;
        debug!(url = %self.url, height = lifetime.valid_until_height, "raw lifetime fetched");
        Ok(lifetime)
    }

    fn describe(&self) -> String {
        format!("raw {}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_is_fixed() {
        assert_eq!(
            lifetime_request_body().to_string(),
            r#"{"id":1,"jsonrpc":"2.0","method":"getLatestBlockhash","params":[{"commitment":"confirmed"}]}"#
        );
    }

    #[test]
    fn parses_well_formed_response() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": { "slot": 100 },
                "value": {
                    "blockhash": "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N",
                    "lastValidBlockHeight": 250
                }
            }
        });
        let lifetime = parse_lifetime_response(&body).unwrap();
        assert_eq!(lifetime.recent_hash, "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N");
        assert_eq!(lifetime.valid_until_height, 250);
    }

    #[test]
    fn surfaces_rpc_errors() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32005, "message": "Node is behind" }
        });
        assert_eq!(
            parse_lifetime_response(&body),
            Err(TransportError::Rpc {
                code: -32005,
                message: "Node is behind".into()
            })
        );
    }

    #[test]
    fn rejects_incomplete_values() {
        let missing_height = json!({ "result": { "value": { "blockhash": "abc" } } });
        assert!(matches!(
            parse_lifetime_response(&missing_height),
            Err(TransportError::Decode(_))
        ));
        let empty_hash = json!({ "result": { "value": { "blockhash": "", "lastValidBlockHeight": 1 } } });
        assert!(parse_lifetime_response(&empty_hash).is_err());
        assert!(parse_lifetime_response(&json!({ "result": null })).is_err());
    }
}
