//! Error types for the settlement engine.
//!
//! [`SettlementError`] is what every fallible public operation returns.
//! Ledger I/O failures are described by [`TransportError`], which the
//! resilience layer keeps around so that exhaustion can report the last
//! thing that went wrong.
//!
//! Terminal verification outcomes (not found, failed, no transfer) are not
//! errors: they travel inside a successful `TransactionVerification`.

use thiserror::Error;

use crate::address::pda::PdaError;

/// Shorthand for results carrying a [`SettlementError`].
pub type SettlementResult<T> = std::result::Result<T, SettlementError>;

/// Errors returned by settlement operations.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Malformed caller input: bad address, wrong signature length, zero
    /// amount, an account that does not match its derivation. Never retried.
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        /// Which input was rejected.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A reading type name or on-chain index outside the known set. Inside
    /// the crate every lookup is an exhaustive match, so this only appears
    /// at parsing boundaries and signals drift between this table and the
    /// deployed program.
    #[error("unknown reading type: {0}")]
    UnknownReadingType(String),

    /// Every lifetime attempt failed on both transports.
    #[error("ledger unreachable after {attempts} attempts: {last_error}")]
    LedgerUnreachable {
        /// Number of attempts made.
        attempts: u32,
        /// The error from the final fallback call.
        last_error: TransportError,
    },

    /// A single, non-retried ledger call failed.
    #[error("ledger transport error: {0}")]
    Transport(#[from] TransportError),

    /// The claim nonce is not above the last nonce observed for the owner.
    #[error("nonce {nonce} already used (last nonce {last_nonce})")]
    NonceAlreadyUsed {
        /// The nonce the caller asked to use.
        nonce: u64,
        /// The highest nonce already accepted or reserved for this owner.
        last_nonce: u64,
    },

    /// Program address derivation rejected its seeds.
    #[error("address derivation failed: {0}")]
    Derivation(#[from] PdaError),
}

impl SettlementError {
    /// Builds an [`SettlementError::InvalidInput`].
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        SettlementError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// True for failures that came from the ledger rather than the caller.
    pub fn is_ledger_failure(&self) -> bool {
        matches!(
            self,
            SettlementError::LedgerUnreachable { .. } | SettlementError::Transport(_)
        )
    }
}

/// Failures of a single ledger call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The call did not complete within its time budget and was cancelled.
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The request never produced an HTTP response (DNS, TLS, connection).
    #[error("http request failed: {0}")]
    Http(String),

    /// The endpoint answered with a non-success HTTP status.
    #[error("http status {status}")]
    Status { status: u16 },

    /// The endpoint answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn decode(reason: impl Into<String>) -> Self {
        TransportError::Decode(reason.into())
    }
}
