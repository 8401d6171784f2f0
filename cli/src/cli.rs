//! # CLI Interface
//!
//! Command-line structure for `neptu`, the operator tool for the settlement
//! engine. Network settings are global flags backed by the same environment
//! variables the library reads.

use clap::{Args, Parser, Subcommand};

/// Neptu settlement operator tool.
///
/// Quotes prices, derives program accounts, builds unsigned payment and
/// claim payloads, and verifies submitted payments against the ledger.
#[derive(Parser, Debug)]
#[command(
    name = "neptu",
    about = "Neptu settlement operator tool",
    version,
    propagate_version = true
)]
pub struct NeptuCli {
    #[command(flatten)]
    pub network: NetworkArgs,

    /// Log output format: pretty or json.
    #[arg(long, global = true, env = "NEPTU_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Network selection and recipient accounts.
#[derive(Args, Debug, Clone)]
pub struct NetworkArgs {
    /// localnet, devnet or mainnet.
    #[arg(long, global = true, env = "SOLANA_NETWORK", default_value = "devnet")]
    pub network: String,

    /// Primary RPC endpoint. Defaults to the network's public endpoint.
    #[arg(long, global = true, env = "SOLANA_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Wallet receiving SOL payments.
    #[arg(long, global = true, env = "NEPTU_TREASURY")]
    pub treasury: Option<String>,

    /// Token account receiving the non-burned share of NEPTU payments.
    #[arg(long, global = true, env = "NEPTU_ECOSYSTEM_POOL")]
    pub ecosystem_pool: Option<String>,

    /// Wallet receiving SUDIGITAL payments.
    #[arg(long, global = true, env = "SUDIGITAL_TREASURY")]
    pub third_party_treasury: Option<String>,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the pricing table, or the full quote for one reading type.
    Pricing(PricingArgs),
    /// Print the derived program accounts of the selected network.
    Derive(DeriveArgs),
    /// Build an unsigned payload and print it as JSON.
    Build {
        #[command(subcommand)]
        kind: BuildCommand,
    },
    /// Fetch a fresh transaction lifetime.
    Lifetime,
    /// Verify that a signature settled a payment.
    Verify(VerifyArgs),
    /// Show a wallet's claim record.
    ClaimRecord(OwnerArgs),
    /// Show a wallet's SOL and NEPTU balances.
    Balance(OwnerArgs),
    /// Show on-chain pricing config and economy state.
    State,
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct PricingArgs {
    /// POTENSI, PELUANG, AI_CHAT or COMPATIBILITY.
    pub reading_type: Option<String>,
}

#[derive(Parser, Debug)]
pub struct DeriveArgs {
    /// Also derive this wallet's token account and claim record.
    #[arg(long)]
    pub owner: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum BuildCommand {
    /// Pay in SOL through the economy program.
    Coin(PayArgs),
    /// Pay in NEPTU through the economy program.
    Token(PayArgs),
    /// Pay in SUDIGITAL with a plain token transfer.
    ThirdParty(PayArgs),
    /// Claim NEPTU rewards.
    Claim(ClaimArgs),
}

/// A blockhash the client already holds. Both or neither.
#[derive(Args, Debug, Clone)]
pub struct LifetimeArgs {
    #[arg(long, requires = "valid_until")]
    pub blockhash: Option<String>,

    /// Last block height at which `--blockhash` is accepted.
    #[arg(long, requires = "blockhash")]
    pub valid_until: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct PayArgs {
    /// Paying wallet.
    #[arg(long)]
    pub wallet: String,

    #[arg(long)]
    pub reading_type: String,

    #[command(flatten)]
    pub lifetime: LifetimeArgs,
}

#[derive(Parser, Debug)]
pub struct ClaimArgs {
    /// Claiming wallet.
    #[arg(long)]
    pub wallet: String,

    /// Amount in NEPTU.
    #[arg(long)]
    pub amount: f64,

    #[arg(long)]
    pub nonce: u64,

    /// Hex-encoded Ed25519 key that authorizes claims.
    ///
    /// Without it the claim carries an all-zero authorization.
    #[arg(long, env = "NEPTU_CLAIM_AUTHORITY_KEY", hide_env_values = true)]
    pub authority_key: Option<String>,

    /// Skip reading the on-chain claim record before building.
    #[arg(long)]
    pub offline: bool,

    #[command(flatten)]
    pub lifetime: LifetimeArgs,
}

#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Base58 transaction signature.
    pub signature: String,

    /// Poll the signature status until confirmed before verifying.
    #[arg(long)]
    pub wait: bool,
}

#[derive(Parser, Debug)]
pub struct OwnerArgs {
    /// Wallet address.
    pub owner: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        NeptuCli::command().debug_assert();
    }

    #[test]
    fn lifetime_flags_come_in_pairs() {
        let ok = NeptuCli::try_parse_from([
            "neptu",
            "build",
            "coin",
            "--wallet",
            "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
            "--reading-type",
            "POTENSI",
            "--blockhash",
            "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N",
            "--valid-until",
            "100",
        ]);
        assert!(ok.is_ok());

        let half = NeptuCli::try_parse_from([
            "neptu",
            "build",
            "coin",
            "--wallet",
            "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU",
            "--reading-type",
            "POTENSI",
            "--blockhash",
            "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N",
        ]);
        assert!(half.is_err());
    }
}
