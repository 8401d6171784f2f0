//! # Transaction Lifetime Resilience
//!
//! Fetches a fresh `(blockhash, lastValidBlockHeight)` pair with bounded
//! effort:
//!
//! ```text
//!   attempt 1:  primary ──(timeout/err)──▶ fallback ──(err)──▶ sleep 1s
//!   attempt 2:  primary ──(timeout/err)──▶ fallback ──(err)──▶ sleep 2s
//!   attempt 3:  primary ──(timeout/err)──▶ fallback ──(err)──▶ LedgerUnreachable
//! ```
//!
//! Every call runs under `tokio::time::timeout`. When the deadline passes
//! the in-flight future is dropped, which drops the underlying HTTP request
//! with it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::raw::RawLifetimeClient;
use super::rpc::RpcTransport;
use super::{LifetimeSource, TransactionLifetime};
use crate::config::{
    NetworkConfig, LEDGER_CALL_TIMEOUT, LIFETIME_MAX_ATTEMPTS, LIFETIME_RETRY_BASE_DELAY,
};
use crate::error::{SettlementError, SettlementResult, TransportError};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Attempt count, per-call deadline and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub call_timeout: Duration,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: LIFETIME_MAX_ATTEMPTS,
            call_timeout: LEDGER_CALL_TIMEOUT,
            base_delay: LIFETIME_RETRY_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Pause after a failed `attempt` (1-based): `base_delay * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Longest possible wall time of a fetch that ends in exhaustion.
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let calls = self.call_timeout.saturating_mul(2 * attempts);
        (1..attempts).fold(calls, |total, attempt| {
            total.saturating_add(self.delay_for(attempt))
        })
    }
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

async fn bounded(
    source: &dyn LifetimeSource,
    deadline: Duration,
) -> Result<TransactionLifetime, TransportError> {
    match tokio::time::timeout(deadline, source.latest_lifetime()).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            after_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// Fetches a transaction lifetime, primary first, fallback within the same
/// attempt, with exponential backoff between attempts.
pub async fn get_transaction_lifetime(
    primary: &dyn LifetimeSource,
    fallback: &dyn LifetimeSource,
    policy: &RetryPolicy,
) -> SettlementResult<TransactionLifetime> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match bounded(primary, policy.call_timeout).await {
            Ok(lifetime) => {
                debug!(attempt, source = %primary.describe(), "lifetime fetched");
                return Ok(lifetime);
            }
            Err(err) => {
                warn!(
                    attempt,
                    source = %primary.describe(),
                    error = %err,
                    "primary lifetime fetch failed, trying fallback"
                );
            }
        }

        let last_error = match bounded(fallback, policy.call_timeout).await {
            Ok(lifetime) => {
                info!(attempt, source = %fallback.describe(), "lifetime fetched via fallback");
                return Ok(lifetime);
            }
            Err(err) => err,
        };
        warn!(
            attempt,
            source = %fallback.describe(),
            error = %last_error,
            "fallback lifetime fetch failed"
        );

        if attempt >= attempts {
            return Err(SettlementError::LedgerUnreachable {
                attempts,
                last_error,
            });
        }
        let delay = policy.delay_for(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

// ---------------------------------------------------------------------------
// LifetimeFetcher
// ---------------------------------------------------------------------------

/// A primary/fallback pair bundled with its retry policy.
#[derive(Clone)]
pub struct LifetimeFetcher {
    primary: Arc<dyn LifetimeSource>,
    fallback: Arc<dyn LifetimeSource>,
    policy: RetryPolicy,
}

impl LifetimeFetcher {
    pub fn new(
        primary: Arc<dyn LifetimeSource>,
        fallback: Arc<dyn LifetimeSource>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            primary,
            fallback,
            policy,
        }
    }

    /// Primary over the configured RPC URL, fallback over the network's
    /// public default endpoint.
    pub fn for_config(config: &NetworkConfig) -> SettlementResult<Self> {
        let policy = RetryPolicy::default();
        let primary = RpcTransport::with_timeout(config.rpc_url.clone(), policy.call_timeout)?;
        let fallback =
            RawLifetimeClient::with_timeout(config.network.default_rpc_url(), policy.call_timeout)?;
        Ok(Self::new(Arc::new(primary), Arc::new(fallback), policy))
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch(&self) -> SettlementResult<TransactionLifetime> {
        get_transaction_lifetime(self.primary.as_ref(), self.fallback.as_ref(), &self.policy).await
    }

    /// Uses a lifetime the client already holds, otherwise fetches one.
    pub async fn resolve(
        &self,
        supplied: Option<TransactionLifetime>,
    ) -> SettlementResult<TransactionLifetime> {
        match supplied {
            Some(lifetime) => {
                debug!(height = lifetime.valid_until_height, "using caller-supplied lifetime");
                Ok(lifetime)
            }
            None => self.fetch().await,
        }
    }
}

impl std::fmt::Debug for LifetimeFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifetimeFetcher")
            .field("primary", &self.primary.describe())
            .field("fallback", &self.fallback.describe())
            .field("policy", &self.policy)
            .finish()
    }
}
