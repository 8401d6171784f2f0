//! # Program Context
//!
//! Everything the instruction builders need about a network's deployment:
//! program ids and every derived account. Bump searches cost up to 256
//! SHA-256 rounds each, so a context is derived once per network and then
//! shared as an `Arc`.
//!
//! ## Cache
//!
//! [`ProgramContextCache`] is owned by whoever hosts the engine and passed
//! in explicitly; there is no process-wide singleton. It maps each network
//! to its own `OnceLock` cell:
//!
//! ```text
//!   DashMap<Network, Arc<OnceLock<..>>>
//!        │  shard lock held only to clone the cell handle
//!        ▼
//!   cell.get_or_init(derive)   ◄── one builder per network, others wait
//! ```
//!
//! Concurrent first callers for one network run exactly one derivation
//! and all observe the same `Arc`. Initializing one network never blocks
//! another. Entries never expire: program ids do not change while the
//! process runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::address::pda::{self, DerivedAddress, PdaError};
use crate::address::Address;
use crate::config::Network;
use crate::error::SettlementResult;

/// Derived deployment facts for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramContext {
    pub network: Network,
    pub token_program: Address,
    pub economy_program: Address,
    /// NEPTU mint, owned by the token program.
    pub mint: DerivedAddress,
    pub metadata: DerivedAddress,
    /// Signer for payouts from the rewards pool.
    pub economy_authority: DerivedAddress,
    pub economy_state: DerivedAddress,
    pub pricing_config: DerivedAddress,
    /// NEPTU token account of the economy authority.
    pub rewards_pool: DerivedAddress,
}

impl ProgramContext {
    /// Derives the full context for `network`. Pure and deterministic.
    pub fn derive(network: Network) -> Result<Self, PdaError> {
        let token_program = network.token_program_id();
        let economy_program = network.economy_program_id();

        let mint = pda::mint_address(&token_program)?;
        let economy_authority = pda::economy_authority_address(&economy_program)?;
        let context = ProgramContext {
            network,
            token_program,
            economy_program,
            mint,
            metadata: pda::metadata_address(&mint.address)?,
            economy_authority,
            economy_state: pda::economy_state_address(&economy_program)?,
            pricing_config: pda::pricing_config_address(&economy_program)?,
            rewards_pool: pda::associated_token_address(
                &economy_authority.address,
                &mint.address,
            )?,
        };

        debug!(
            %network,
            mint = %context.mint.address,
            rewards_pool = %context.rewards_pool.address,
            "derived program context"
        );
        Ok(context)
    }

    /// The NEPTU token account of `owner`.
    pub fn token_account(&self, owner: &Address) -> Result<Address, PdaError> {
        Ok(pda::associated_token_address(owner, &self.mint.address)?.address)
    }

    /// The claim record of `owner`.
    pub fn claim_record(&self, owner: &Address) -> Result<DerivedAddress, PdaError> {
        pda::claim_record_address(owner, &self.economy_program)
    }
}

type ContextCell = OnceLock<Result<Arc<ProgramContext>, PdaError>>;

/// Per-network, build-once cache of [`ProgramContext`]s.
///
/// A failed derivation is cached like a successful one: derivation is
/// deterministic, so retrying would fail the same way.
#[derive(Debug, Default)]
pub struct ProgramContextCache {
    cells: DashMap<Network, Arc<ContextCell>>,
    builds: AtomicUsize,
}

impl ProgramContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the context for `network`, deriving it on first use.
    pub fn get(&self, network: Network) -> SettlementResult<Arc<ProgramContext>> {
        // Clone the cell out so the shard lock is released before deriving.
        let cell = Arc::clone(self.cells.entry(network).or_default().value());
        let result = cell.get_or_init(|| {
            self.builds.fetch_add(1, Ordering::SeqCst);
            ProgramContext::derive(network).map(Arc::new)
        });
        Ok(Arc::clone(result.as_ref().map_err(Clone::clone)?))
    }

    /// Number of derivations executed so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Networks with an initialized (or initializing) cell.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Drops every cached context. Callers already holding an `Arc` keep it.
    pub fn reset(&self) {
        self.cells.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn context_matches_direct_derivation() {
        let ctx = ProgramContext::derive(Network::Devnet).unwrap();
        assert_eq!(
            ctx.mint.address.to_string(),
            "J4rUwfHS74XKTcNAX5wh5vuwYH4Fv5MR4Pdo4Gt4dhrq"
        );
        assert_eq!(
            ctx.rewards_pool.address.to_string(),
            "74ghaUNLKLaFvLN74G8yex8hougvJkqwJEBYxpSJ1ZL"
        );
        assert_eq!(
            ctx.pricing_config.address.to_string(),
            "2d8ojCTHXskZm64gdEeoztPmDfAQMXuJ48GJDYwZUYUY"
        );
        assert_eq!(ctx.economy_program.to_string(), "6Zxc4uCXKqWS6spnW7u9wA81PChgws6wbGAKJyi8PnvT");
    }

    #[test]
    fn concurrent_first_callers_share_one_build() {
        let cache = ProgramContextCache::new();
        let barrier = Barrier::new(16);

        let contexts: Vec<Arc<ProgramContext>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        cache.get(Network::Devnet).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(cache.build_count(), 1);
        assert!(contexts.iter().all(|c| Arc::ptr_eq(c, &contexts[0])));
    }

    #[test]
    fn networks_are_cached_independently() {
        let cache = ProgramContextCache::new();
        let devnet = cache.get(Network::Devnet).unwrap();
        let mainnet = cache.get(Network::Mainnet).unwrap();
        let devnet_again = cache.get(Network::Devnet).unwrap();

        assert_eq!(cache.build_count(), 2);
        assert_eq!(cache.len(), 2);
        assert!(Arc::ptr_eq(&devnet, &devnet_again));
        assert_eq!(mainnet.network, Network::Mainnet);
        // Same program ids everywhere, so the derivations agree.
        assert_eq!(devnet.mint, mainnet.mint);
    }

    #[test]
    fn reset_forces_a_rebuild() {
        let cache = ProgramContextCache::new();
        let before = cache.get(Network::Localnet).unwrap();
        cache.reset();
        assert!(cache.is_empty());

        let after = cache.get(Network::Localnet).unwrap();
        assert_eq!(cache.build_count(), 2);
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(*before, *after);
    }

    #[test]
    fn user_accounts_hang_off_the_context() {
        let ctx = ProgramContext::derive(Network::Devnet).unwrap();
        let user: Address = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".parse().unwrap();
        assert_eq!(
            ctx.token_account(&user).unwrap().to_string(),
            "E2nJPAG2XcDngJWKZzaDpQFtAxncvwxAQKKFkBkKNFv3"
        );
        assert_eq!(ctx.claim_record(&user).unwrap().bump, 255);
    }
}
