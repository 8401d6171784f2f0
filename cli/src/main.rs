// Copyright (c) 2026 Neptu Contributors. MIT License.
// See LICENSE for details.

//! # Neptu Operator CLI
//!
//! Entry point for the `neptu` binary. Parses arguments, initializes
//! logging, resolves the network configuration and runs one command.
//!
//! - `pricing`      — pricing table and per-reading quotes
//! - `derive`       — program-derived accounts of a network
//! - `build`        — unsigned coin, token, third-party and claim payloads
//! - `lifetime`     — fetch a transaction lifetime through the resilience layer
//! - `verify`       — verify a submitted payment signature
//! - `claim-record` — a wallet's claim record and next acceptable nonce
//! - `balance`      — a wallet's SOL and NEPTU balances
//! - `state`        — on-chain pricing config and economy counters
//! - `version`      — build information

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;

use neptu_settlement::accounts::{
    coin_balance, fetch_economy_state, fetch_pricing_config, token_balance,
};
use neptu_settlement::authorization::ClaimAuthorizer;
use neptu_settlement::claim::{fetch_claim_record, ClaimGuard};
use neptu_settlement::config::{
    CONFIRMATION_MAX_RETRIES, CONFIRMATION_POLL_INTERVAL, SOL_DECIMALS,
};
use neptu_settlement::instruction::CLAIM_SIGNATURE_LEN;
use neptu_settlement::ledger::rpc::RpcTransport;
use neptu_settlement::ledger::LifetimeFetcher;
use neptu_settlement::pricing::{
    calculate_coin_payment_reward, calculate_third_party_payment, calculate_token_payment_burn,
    price_of,
};
use neptu_settlement::units::{format_raw, to_raw_token};
use neptu_settlement::verification::{verify, wait_for_confirmation};
use neptu_settlement::{
    Address, Network, NetworkConfig, PaymentMethod, PaymentService, ProgramContext, ReadingType,
    Signature, TransactionLifetime,
};

use cli::{BuildCommand, ClaimArgs, Commands, LifetimeArgs, NeptuCli, NetworkArgs};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NeptuCli::parse();
    logging::init_logging(
        logging::DEFAULT_DIRECTIVES,
        LogFormat::from_str_lossy(&cli.log_format),
    );

    let config = network_config(&cli.network)?;
    tracing::debug!(network = %config.network, rpc = %config.rpc_url, "configuration resolved");

    match cli.command {
        Commands::Pricing(args) => show_pricing(args.reading_type.as_deref()),
        Commands::Derive(args) => derive(&config, args.owner.as_deref()),
        Commands::Build { kind } => build(config, kind).await,
        Commands::Lifetime => lifetime(&config).await,
        Commands::Verify(args) => verify_payment(&config, &args.signature, args.wait).await,
        Commands::ClaimRecord(args) => claim_record(&config, &args.owner).await,
        Commands::Balance(args) => balance(&config, &args.owner).await,
        Commands::State => state(&config).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn network_config(args: &NetworkArgs) -> Result<NetworkConfig> {
    let network: Network = args
        .network
        .parse()
        .with_context(|| format!("unsupported network `{}`", args.network))?;
    let mut config = NetworkConfig::new(network);
    if let Some(url) = &args.rpc_url {
        config = config.with_rpc_url(url.clone());
    }
    if let Some(treasury) = &args.treasury {
        config = config.with_treasury(parse_address("treasury", treasury)?);
    }
    if let Some(pool) = &args.ecosystem_pool {
        config = config.with_ecosystem_pool(parse_address("ecosystem pool", pool)?);
    }
    if let Some(treasury) = &args.third_party_treasury {
        config = config.with_third_party_treasury(parse_address("third-party treasury", treasury)?);
    }
    Ok(config)
}

fn parse_address(label: &str, value: &str) -> Result<Address> {
    value
        .parse()
        .with_context(|| format!("invalid {label} address `{value}`"))
}

fn parse_reading_type(value: &str) -> Result<ReadingType> {
    value
        .parse()
        .with_context(|| format!("unknown reading type `{value}`"))
}

fn supplied_lifetime(args: LifetimeArgs) -> Option<TransactionLifetime> {
    match (args.blockhash, args.valid_until) {
        (Some(recent_hash), Some(valid_until_height)) => Some(TransactionLifetime {
            recent_hash,
            valid_until_height,
        }),
        _ => None,
    }
}

fn rpc(config: &NetworkConfig) -> Result<RpcTransport> {
    RpcTransport::new(config.rpc_url.clone())
        .with_context(|| format!("failed to create RPC client for {}", config.rpc_url))
}

fn context(config: &NetworkConfig) -> Result<ProgramContext> {
    ProgramContext::derive(config.network)
        .with_context(|| format!("failed to derive program context for {}", config.network))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn show_pricing(reading_type: Option<&str>) -> Result<()> {
    let Some(name) = reading_type else {
        println!(
            "{:<15} {:>10} {:>10} {:>10} {:>12}",
            "READING", "SOL", "NEPTU", "SUDIGITAL", "SOL REWARD"
        );
        for rt in ReadingType::ALL {
            println!(
                "{:<15} {:>10} {:>10} {:>10} {:>12}",
                rt.as_str(),
                price_of(rt, PaymentMethod::Coin),
                price_of(rt, PaymentMethod::Token),
                price_of(rt, PaymentMethod::ThirdPartyToken),
                calculate_coin_payment_reward(rt).token_reward_formatted,
            );
        }
        return Ok(());
    };

    let rt = parse_reading_type(name)?;
    print_json(&json!({
        "readingType": rt,
        "coinPayment": calculate_coin_payment_reward(rt),
        "tokenPayment": calculate_token_payment_burn(rt),
        "thirdPartyPayment": calculate_third_party_payment(rt),
    }))
}

fn derive(config: &NetworkConfig, owner: Option<&str>) -> Result<()> {
    let ctx = context(config)?;
    let Some(owner) = owner else {
        return print_json(&ctx);
    };
    let owner = parse_address("owner", owner)?;
    let token_account = ctx.token_account(&owner)?;
    let claim_record = ctx.claim_record(&owner)?;
    print_json(&json!({
        "context": ctx,
        "owner": owner,
        "tokenAccount": token_account,
        "claimRecord": claim_record,
    }))
}

async fn build(config: NetworkConfig, kind: BuildCommand) -> Result<()> {
    let (method, args) = match kind {
        BuildCommand::Coin(args) => (PaymentMethod::Coin, args),
        BuildCommand::Token(args) => (PaymentMethod::Token, args),
        BuildCommand::ThirdParty(args) => (PaymentMethod::ThirdPartyToken, args),
        BuildCommand::Claim(args) => return build_claim(config, args).await,
    };
    let wallet = parse_address("wallet", &args.wallet)?;
    let reading_type = parse_reading_type(&args.reading_type)?;

    let service = PaymentService::from_config(config)?;
    let payload = service
        .build_payment(method, reading_type, &wallet, supplied_lifetime(args.lifetime))
        .await
        .with_context(|| format!("failed to build {method} payment"))?;
    print_json(&payload)
}

async fn build_claim(config: NetworkConfig, args: ClaimArgs) -> Result<()> {
    let wallet = parse_address("wallet", &args.wallet)?;
    let amount_raw = to_raw_token(args.amount);

    let authorization: [u8; CLAIM_SIGNATURE_LEN] = match &args.authority_key {
        Some(key) => {
            let authorizer = ClaimAuthorizer::from_hex(key).context("invalid authority key")?;
            tracing::info!(authority = %authorizer.authority(), "signing claim authorization");
            authorizer.authorize(&wallet, amount_raw, args.nonce)
        }
        None => {
            tracing::warn!("no authority key configured, claim authorization is all zeros");
            [0u8; CLAIM_SIGNATURE_LEN]
        }
    };

    let observed = if args.offline {
        None
    } else {
        let transport = rpc(&config)?;
        fetch_claim_record(&transport, &context(&config)?, &wallet)
            .await
            .context("failed to read claim record")?
    };

    let service = PaymentService::from_config(config)?;
    let payload = service
        .build_claim(
            &wallet,
            amount_raw,
            args.nonce,
            &authorization,
            observed.as_ref(),
            supplied_lifetime(args.lifetime),
        )
        .await
        .context("failed to build claim")?;
    print_json(&payload)
}

async fn lifetime(config: &NetworkConfig) -> Result<()> {
    let fetcher = LifetimeFetcher::for_config(config)?;
    let lifetime = fetcher
        .fetch()
        .await
        .context("failed to fetch transaction lifetime")?;
    print_json(&lifetime)
}

async fn verify_payment(config: &NetworkConfig, signature: &str, wait: bool) -> Result<()> {
    let transport = rpc(config)?;

    if wait {
        let parsed: Signature = signature.parse()?;
        let confirmed = wait_for_confirmation(
            &transport,
            &parsed,
            CONFIRMATION_MAX_RETRIES,
            CONFIRMATION_POLL_INTERVAL,
        )
        .await
        .context("failed to poll signature status")?;
        if !confirmed {
            tracing::warn!(%parsed, "signature not confirmed, verifying anyway");
        }
    }

    let verification = verify(&transport, signature, config)
        .await
        .context("failed to verify transaction")?;
    print_json(&verification)?;
    if let Some(failure) = verification.error {
        bail!("{failure}");
    }
    Ok(())
}

async fn claim_record(config: &NetworkConfig, owner: &str) -> Result<()> {
    let owner = parse_address("owner", owner)?;
    let ctx = context(config)?;
    let transport = rpc(config)?;

    let record = fetch_claim_record(&transport, &ctx, &owner)
        .await
        .context("failed to read claim record")?;
    let next_nonce = ClaimGuard::new().next_nonce(&owner, record.as_ref())?;
    print_json(&json!({
        "owner": owner,
        "address": ctx.claim_record(&owner)?.address,
        "record": record,
        "nextNonce": next_nonce,
    }))
}

async fn balance(config: &NetworkConfig, owner: &str) -> Result<()> {
    let owner = parse_address("owner", owner)?;
    let ctx = context(config)?;
    let transport = rpc(config)?;

    let lamports = coin_balance(&transport, &owner)
        .await
        .context("failed to read SOL balance")?;
    let neptu = token_balance(&transport, &owner, &ctx.mint.address)
        .await
        .context("failed to read NEPTU balance")?;
    print_json(&json!({
        "owner": owner,
        "lamports": lamports,
        "sol": format_raw(lamports, SOL_DECIMALS),
        "neptu": neptu.as_ref().map(|b| format_raw(b.amount_raw, b.decimals)),
        "tokenAccount": neptu.map(|b| b.account),
    }))
}

async fn state(config: &NetworkConfig) -> Result<()> {
    let ctx = context(config)?;
    let transport = rpc(config)?;

    let pricing = fetch_pricing_config(&transport, &ctx)
        .await
        .context("failed to read pricing config")?;
    let economy = fetch_economy_state(&transport, &ctx)
        .await
        .context("failed to read economy state")?;
    if let Some(drift) = pricing.as_ref().map(|p| p.drift()).filter(|d| !d.is_empty()) {
        tracing::warn!(?drift, "on-chain prices differ from the local pricing table");
    }
    print_json(&json!({
        "network": config.network,
        "pricingConfig": pricing,
        "economyState": economy,
    }))
}

fn print_version() {
    println!("neptu          {}", env!("CARGO_PKG_VERSION"));
    for network in Network::ALL {
        println!("{:<14} {}", network.as_str(), network.economy_program_id());
    }
}
