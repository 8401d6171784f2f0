//! # Settlement Configuration & Constants
//!
//! Every magic number the settlement engine depends on lives here: the
//! ledger endpoints per network, the Neptu program ids, the well-known
//! Solana programs our instructions reference, token parameters and the
//! timing policy of the resilience layer.
//!
//! Program ids and seed contracts are frozen by the deployed programs.
//! Changing one here without redeploying produces accounts nobody owns.
//!
//! Runtime configuration (treasury, ecosystem pool, RPC override) comes
//! from the hosting environment through [`NetworkConfig`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{SettlementError, SettlementResult};

// ---------------------------------------------------------------------------
// Network Endpoints
// ---------------------------------------------------------------------------

/// Local validator started with `solana-test-validator`.
pub const LOCALNET_RPC_URL: &str = "http://localhost:8899";

/// Public devnet endpoint.
pub const DEVNET_RPC_URL: &str = "https://api.devnet.solana.com";

/// Public mainnet-beta endpoint.
pub const MAINNET_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

// ---------------------------------------------------------------------------
// Neptu Program Identifiers
// ---------------------------------------------------------------------------

/// The Neptu token program (`7JDw4pncZg6g7ezhQSNxKhj3ptT62okgttDjLL4TwqHW`).
/// Owns the NEPTU mint PDA and its metadata.
pub const NEPTU_TOKEN_PROGRAM_ID: Address = Address::new_from_array([
    93, 143, 158, 37, 216, 123, 225, 166, 144, 221, 246, 190, 62, 6, 97, 249, 185, 16, 126, 46,
    244, 80, 41, 230, 144, 222, 224, 158, 144, 251, 7, 173,
]);

/// The Neptu economy program (`6Zxc4uCXKqWS6spnW7u9wA81PChgws6wbGAKJyi8PnvT`).
/// Handles payments, burns and reward claims.
pub const NEPTU_ECONOMY_PROGRAM_ID: Address = Address::new_from_array([
    82, 187, 228, 145, 249, 233, 157, 249, 194, 241, 185, 210, 146, 197, 109, 75, 42, 24, 15, 117,
    75, 13, 34, 234, 123, 19, 76, 83, 97, 209, 101, 112,
]);

// ---------------------------------------------------------------------------
// Well-Known Programs
// ---------------------------------------------------------------------------

/// System program (`11111111111111111111111111111111`).
pub const SYSTEM_PROGRAM_ID: Address = Address::new_from_array([0u8; 32]);

/// SPL token program (`TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`).
pub const SPL_TOKEN_PROGRAM_ID: Address = Address::new_from_array([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
    237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// Associated token account program (`ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`).
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Address = Address::new_from_array([
    140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131, 11, 90, 19, 153, 218,
    255, 16, 132, 4, 142, 123, 216, 219, 233, 248, 89,
]);

/// Metaplex token metadata program (`metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s`).
pub const TOKEN_METADATA_PROGRAM_ID: Address = Address::new_from_array([
    11, 112, 101, 177, 227, 209, 124, 69, 56, 157, 82, 127, 107, 4, 195, 205, 88, 184, 108, 115,
    26, 160, 253, 181, 73, 182, 209, 188, 3, 248, 41, 70,
]);

// ---------------------------------------------------------------------------
// Token Parameters
// ---------------------------------------------------------------------------

/// SOL decimals.
pub const SOL_DECIMALS: u8 = 9;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// NEPTU decimals.
pub const NEPTU_DECIMALS: u8 = 6;

/// Raw NEPTU units in one whole token.
pub const TOKEN_SCALE: u64 = 1_000_000;

/// Fixed NEPTU supply, in whole tokens.
pub const NEPTU_TOTAL_SUPPLY: u64 = 1_000_000_000;

/// Share of the supply minted into the rewards pool, in whole tokens.
pub const NEPTU_REWARDS_POOL_SUPPLY: u64 = 300_000_000;

/// Burn share of every NEPTU payment, in basis points. Mirrors the economy
/// program's `BURN_RATE_BPS`.
pub const BURN_RATE_BPS: u64 = 5_000;

/// Basis point denominator.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// SUDIGITAL, the third-party token accepted for readings.
pub const SUDIGITAL_MINT: Address = Address::new_from_array([
    103, 249, 202, 194, 1, 0, 147, 221, 45, 13, 105, 234, 11, 206, 106, 138, 142, 179, 209, 16,
    137, 113, 174, 204, 9, 59, 96, 169, 39, 229, 182, 122,
]);

/// SUDIGITAL decimals.
pub const SUDIGITAL_DECIMALS: u8 = 6;

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// Attempts made by the lifetime fetcher before giving up.
pub const LIFETIME_MAX_ATTEMPTS: u32 = 3;

/// Upper bound on a single ledger call, primary or fallback.
pub const LEDGER_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Base delay of the exponential backoff between lifetime attempts.
pub const LIFETIME_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Commitment level used for lifetime fetches.
pub const LIFETIME_COMMITMENT: &str = "confirmed";

/// Signature status polls made by `wait_for_confirmation`.
pub const CONFIRMATION_MAX_RETRIES: u32 = 30;

/// Delay between signature status polls.
pub const CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Environment Variables
// ---------------------------------------------------------------------------

pub const ENV_NETWORK: &str = "SOLANA_NETWORK";
pub const ENV_RPC_URL: &str = "SOLANA_RPC_URL";
pub const ENV_TREASURY: &str = "NEPTU_TREASURY";
pub const ENV_ECOSYSTEM_POOL: &str = "NEPTU_ECOSYSTEM_POOL";
pub const ENV_THIRD_PARTY_TREASURY: &str = "SUDIGITAL_TREASURY";

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// A Solana cluster the Neptu programs are deployed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Localnet,
    #[default]
    Devnet,
    Mainnet,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Localnet, Network::Devnet, Network::Mainnet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Localnet => "localnet",
            Network::Devnet => "devnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// The fixed public endpoint for this network. The lifetime fetcher
    /// falls back to it when the configured transport fails.
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Localnet => LOCALNET_RPC_URL,
            Network::Devnet => DEVNET_RPC_URL,
            Network::Mainnet => MAINNET_RPC_URL,
        }
    }

    /// The token program id on this network. Identical everywhere today.
    pub fn token_program_id(&self) -> Address {
        NEPTU_TOKEN_PROGRAM_ID
    }

    /// The economy program id on this network. Identical everywhere today.
    pub fn economy_program_id(&self) -> Address {
        NEPTU_ECONOMY_PROGRAM_ID
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "localnet" | "localhost" => Ok(Network::Localnet),
            "devnet" => Ok(Network::Devnet),
            "mainnet" | "mainnet-beta" => Ok(Network::Mainnet),
            other => Err(SettlementError::invalid_input(
                "network",
                format!("unknown network `{other}`"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkConfig
// ---------------------------------------------------------------------------

/// Settlement configuration supplied by the hosting application.
///
/// Only the network is mandatory. Recipient accounts are optional at load
/// time so that read-only tooling (derivations, pricing) works without
/// them; operations that need one fail with `InvalidInput` when it is
/// missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network: Network,
    /// Primary RPC endpoint. Defaults to the network's public endpoint.
    pub rpc_url: String,
    /// Receives SOL payments.
    pub treasury: Option<Address>,
    /// Receives the non-burned share of NEPTU payments.
    pub ecosystem_pool: Option<Address>,
    /// Receives SUDIGITAL payments.
    pub third_party_treasury: Option<Address>,
}

impl NetworkConfig {
    /// Config for `network` with its public endpoint and no recipients.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            rpc_url: network.default_rpc_url().to_string(),
            treasury: None,
            ecosystem_pool: None,
            third_party_treasury: None,
        }
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    pub fn with_treasury(mut self, treasury: Address) -> Self {
        self.treasury = Some(treasury);
        self
    }

    pub fn with_ecosystem_pool(mut self, pool: Address) -> Self {
        self.ecosystem_pool = Some(pool);
        self
    }

    pub fn with_third_party_treasury(mut self, treasury: Address) -> Self {
        self.third_party_treasury = Some(treasury);
        self
    }

    /// Reads the config from the process environment.
    pub fn from_env() -> SettlementResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> SettlementResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let address = |key: &'static str| -> SettlementResult<Option<Address>> {
            get(key)
                .map(|v| {
                    v.trim().parse::<Address>().map_err(|e| {
                        SettlementError::invalid_input(key, e.to_string())
                    })
                })
                .transpose()
        };

        let network = match get(ENV_NETWORK) {
            Some(v) => v.parse()?,
            None => Network::default(),
        };
        let mut config = NetworkConfig::new(network);
        if let Some(url) = get(ENV_RPC_URL) {
            config.rpc_url = url.trim().to_string();
        }
        config.treasury = address(ENV_TREASURY)?;
        config.ecosystem_pool = address(ENV_ECOSYSTEM_POOL)?;
        config.third_party_treasury = address(ENV_THIRD_PARTY_TREASURY)?;
        Ok(config)
    }

    /// The SOL treasury, or `InvalidInput` when it was never configured.
    pub fn require_treasury(&self) -> SettlementResult<Address> {
        self.treasury.ok_or_else(|| {
            SettlementError::invalid_input(ENV_TREASURY, "treasury address is not configured")
        })
    }

    /// The ecosystem pool, or `InvalidInput` when it was never configured.
    pub fn require_ecosystem_pool(&self) -> SettlementResult<Address> {
        self.ecosystem_pool.ok_or_else(|| {
            SettlementError::invalid_input(
                ENV_ECOSYSTEM_POOL,
                "ecosystem pool address is not configured",
            )
        })
    }

    /// The SUDIGITAL treasury, or `InvalidInput` when it was never configured.
    pub fn require_third_party_treasury(&self) -> SettlementResult<Address> {
        self.third_party_treasury.ok_or_else(|| {
            SettlementError::invalid_input(
                ENV_THIRD_PARTY_TREASURY,
                "SUDIGITAL treasury address is not configured",
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
