//! End-to-end settlement flows against an in-memory ledger.
//!
//! Each test wires a `PaymentService` to a `MemoryLedger`, builds the
//! payload a wallet would sign, seeds the ledger with what the signed
//! transaction would have produced, and checks the verifier and the claim
//! guard agree with the builder.

use std::sync::Arc;

use neptu_settlement::accounts::{fetch_pricing_config, PRICING_CONFIG_DISCRIMINATOR};
use neptu_settlement::authorization::{verify_claim_authorization, ClaimAuthorizer};
use neptu_settlement::claim::{
    fetch_claim_record, ClaimGuard, EconomyProgramError, CLAIM_RECORD_DISCRIMINATOR,
};
use neptu_settlement::config::{Network, NetworkConfig, SUDIGITAL_MINT};
use neptu_settlement::instruction::PAY_WITH_NEPTU_DISCRIMINATOR;
use neptu_settlement::ledger::memory::{LifetimeStep, MemoryLedger};
use neptu_settlement::ledger::{
    AccountData, FinalizedTransaction, LifetimeFetcher, ParsedInstruction, RetryPolicy,
};
use neptu_settlement::pricing::{calculate_token_payment_burn, PaymentMethod, ReadingType};
use neptu_settlement::program::{ProgramContext, ProgramContextCache};
use neptu_settlement::verification::verify;
use neptu_settlement::{
    Address, PaymentService, SettlementError, Signature, TransactionLifetime, TransportError,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn addr(n: u8) -> Address {
    Address::new_from_array([n; 32])
}

fn sig(n: u8) -> Signature {
    Signature::new_from_array([n; 64])
}

const TREASURY: u8 = 90;
const POOL: u8 = 91;
const THIRD_PARTY_TREASURY: u8 = 92;

fn config() -> NetworkConfig {
    NetworkConfig::new(Network::Devnet)
        .with_treasury(addr(TREASURY))
        .with_ecosystem_pool(addr(POOL))
        .with_third_party_treasury(addr(THIRD_PARTY_TREASURY))
}

fn lifetime(height: u64) -> TransactionLifetime {
    TransactionLifetime {
        recent_hash: "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N".into(),
        valid_until_height: height,
    }
}

/// A service whose primary ledger is `ledger` and whose fallback is down.
fn service(ledger: Arc<MemoryLedger>) -> PaymentService {
    let fallback = Arc::new(
        MemoryLedger::new()
            .with_label("fallback")
            .with_idle_lifetime(LifetimeStep::Fail(TransportError::Http("down".into()))),
    );
    PaymentService::new(
        config(),
        Arc::new(ProgramContextCache::new()),
        LifetimeFetcher::new(ledger, fallback, RetryPolicy::default()),
        Arc::new(ClaimGuard::new()),
    )
}

fn finalized(
    instructions: Vec<ParsedInstruction>,
    error: Option<serde_json::Value>,
) -> FinalizedTransaction {
    FinalizedTransaction {
        slot: 42,
        block_time: None,
        fee: 5_000,
        error,
        instructions,
    }
}

fn claim_record_data(owner: &Address, last_nonce: u64, total_claimed: u64) -> Vec<u8> {
    let mut data = CLAIM_RECORD_DISCRIMINATOR.to_vec();
    data.extend_from_slice(owner.as_bytes());
    data.extend_from_slice(&last_nonce.to_le_bytes());
    data.extend_from_slice(&total_claimed.to_le_bytes());
    data
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[tokio::test]
async fn coin_payment_builds_and_verifies() {
    let ledger = Arc::new(MemoryLedger::new().with_lifetime(lifetime(1_000)));
    let svc = service(ledger.clone());
    let payer = addr(1);

    let payload = svc
        .build_payment(PaymentMethod::Coin, ReadingType::Compatibility, &payer, None)
        .await
        .unwrap();
    assert_eq!(payload.transaction, lifetime(1_000));
    let json = serde_json::to_value(&payload).unwrap();
    let price = json["pricing"]["coin_amount_raw"].as_u64().unwrap();
    assert!(price > 0);

    // What the network records once the wallet signs and submits.
    ledger.insert_transaction(
        sig(7),
        finalized(
            vec![
                ParsedInstruction::Other {
                    program_id: svc.context().unwrap().economy_program,
                    instruction_type: None,
                },
                ParsedInstruction::SystemTransfer {
                    source: payer,
                    destination: addr(TREASURY),
                    lamports: price,
                },
            ],
            None,
        ),
    );

    let verification = verify(ledger.as_ref(), &sig(7).to_string(), svc.config())
        .await
        .unwrap();
    assert!(verification.is_valid);
    assert_eq!(verification.sender, Some(payer));
    assert!(verification.pays_at_least(PaymentMethod::Coin, price));
}

#[tokio::test]
async fn token_payment_instruction_and_third_party_transfer() {
    let ledger = Arc::new(MemoryLedger::new().with_lifetime(lifetime(2_000)));
    let svc = service(ledger.clone());
    let payer = addr(2);

    let token = svc
        .build_payment(PaymentMethod::Token, ReadingType::Peluang, &payer, None)
        .await
        .unwrap();
    let ix = token.instruction.unwrap();
    assert_eq!(ix.discriminator(), Some(PAY_WITH_NEPTU_DISCRIMINATOR));
    assert_eq!(ix.data()[8], ReadingType::Peluang.index());
    let burn = calculate_token_payment_burn(ReadingType::Peluang);
    assert_eq!(burn.burn_raw + burn.treasury_raw, burn.total_raw);

    let third_party = svc
        .build_payment(PaymentMethod::ThirdPartyToken, ReadingType::Peluang, &payer, None)
        .await
        .unwrap();
    let transfer = third_party.transfer.unwrap();
    assert_eq!(transfer.mint, SUDIGITAL_MINT);

    ledger.insert_transaction(
        sig(8),
        finalized(
            vec![ParsedInstruction::TokenTransferChecked {
                source: addr(3),
                destination: addr(THIRD_PARTY_TREASURY),
                authority: Some(payer),
                mint: SUDIGITAL_MINT,
                amount: transfer.amount_raw,
                decimals: transfer.decimals,
            }],
            None,
        ),
    );
    let verification = verify(ledger.as_ref(), &sig(8).to_string(), svc.config())
        .await
        .unwrap();
    assert!(verification.pays_at_least(PaymentMethod::ThirdPartyToken, transfer.amount_raw));
    assert_eq!(ledger.lifetime_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn payment_survives_a_flaky_primary() {
    let ledger =
        Arc::new(MemoryLedger::new().with_idle_lifetime(LifetimeStep::Ok(lifetime(3_000))));
    ledger.script_lifetime([
        LifetimeStep::Hang,
        LifetimeStep::Fail(TransportError::Http("503".into())),
    ]);
    let svc = service(ledger.clone());

    let payload = svc
        .build_payment(PaymentMethod::Coin, ReadingType::Potensi, &addr(1), None)
        .await
        .unwrap();
    assert_eq!(payload.transaction.valid_until_height, 3_000);
    assert_eq!(ledger.lifetime_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn payment_fails_when_both_ledgers_are_down() {
    let ledger = Arc::new(
        MemoryLedger::new()
            .with_idle_lifetime(LifetimeStep::Fail(TransportError::Http("refused".into()))),
    );
    let svc = service(ledger.clone());

    let err = svc
        .build_payment(PaymentMethod::Coin, ReadingType::Potensi, &addr(1), None)
        .await
        .unwrap_err();
    match err {
        SettlementError::LedgerUnreachable { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Program context
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_context_requests_derive_once() {
    let cache = Arc::new(ProgramContextCache::new());

    let tasks = (0..32).map(|i| {
        let cache = Arc::clone(&cache);
        let network = if i % 2 == 0 { Network::Devnet } else { Network::Mainnet };
        tokio::spawn(async move { cache.get(network) })
    });
    let results = futures::future::join_all(tasks).await;

    let devnet = ProgramContext::derive(Network::Devnet).unwrap();
    for result in results {
        let ctx = result.unwrap().unwrap();
        if ctx.network == Network::Devnet {
            assert_eq!(*ctx, devnet);
        }
    }
    assert_eq!(cache.build_count(), 2);
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn pricing_config_is_read_from_the_derived_address() {
    let ledger = MemoryLedger::new();
    let ctx = ProgramContext::derive(Network::Devnet).unwrap();

    let mut data = PRICING_CONFIG_DISCRIMINATOR.to_vec();
    data.extend_from_slice(addr(5).as_bytes());
    for price in [10_000_000u64, 20_000_000, 5_000_000, 30_000_000, 10, 20, 5, 30] {
        data.extend_from_slice(&price.to_le_bytes());
    }
    ledger.insert_account(
        ctx.pricing_config.address,
        AccountData {
            owner: ctx.economy_program,
            lamports: 1,
            data,
        },
    );

    let pricing = fetch_pricing_config(&ledger, &ctx).await.unwrap().unwrap();
    assert_eq!(pricing.authority, addr(5));
    assert_eq!(pricing.coin_price(ReadingType::Potensi), 10_000_000);
    assert_eq!(pricing.token_price(ReadingType::Compatibility), 30);
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[tokio::test]
async fn authorized_claim_against_on_chain_record() {
    let ledger = Arc::new(MemoryLedger::new().with_lifetime(lifetime(4_000)));
    let svc = service(ledger.clone());
    let claimant = addr(3);
    let ctx = svc.context().unwrap();

    ledger.insert_account(
        ctx.claim_record(&claimant).unwrap().address,
        AccountData {
            owner: ctx.economy_program,
            lamports: 1,
            data: claim_record_data(&claimant, 4, 12_000_000),
        },
    );
    let record = fetch_claim_record(ledger.as_ref(), &ctx, &claimant)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.last_nonce, 4);
    assert_eq!(svc.claims().next_nonce(&claimant, Some(&record)).unwrap(), 5);

    let authorizer = ClaimAuthorizer::generate();
    let stale = authorizer.authorize(&claimant, 1_000_000, 4);
    assert!(matches!(
        svc.build_claim(&claimant, 1_000_000, 4, &stale, Some(&record), None).await,
        Err(SettlementError::NonceAlreadyUsed { nonce: 4, last_nonce: 4 })
    ));

    let auth = authorizer.authorize(&claimant, 1_000_000, 5);
    let payload = svc
        .build_claim(&claimant, 1_000_000, 5, &auth, Some(&record), None)
        .await
        .unwrap();
    assert_eq!(payload.claim.last_nonce, 4);
    assert_eq!(payload.serialized_transaction.len(), 524);
    assert_eq!(&payload.serialized_transaction[70..102], claimant.as_bytes());
    assert_eq!(&payload.instruction.data()[24..], &auth[..]);
    verify_claim_authorization(&authorizer.authority(), &claimant, 1_000_000, 5, &auth).unwrap();

    // Replaying the same nonce before the chain catches up is caught locally.
    let err = svc
        .build_claim(&claimant, 1_000_000, 5, &auth, Some(&record), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::NonceAlreadyUsed { nonce: 5, last_nonce: 5 }));
}

#[tokio::test]
async fn rejected_claim_surfaces_program_error() {
    let ledger = MemoryLedger::new();
    ledger.insert_transaction(
        sig(9),
        finalized(
            Vec::new(),
            Some(serde_json::json!({ "InstructionError": [0, { "Custom": 6001 }] })),
        ),
    );

    let verification = verify(&ledger, &sig(9).to_string(), &config()).await.unwrap();
    assert!(!verification.is_valid);
    assert_eq!(verification.error.unwrap().to_string(), "Transaction failed");

    let err = serde_json::json!({ "InstructionError": [0, { "Custom": 6001 }] });
    assert_eq!(
        EconomyProgramError::from_transaction_error(&err),
        Some(EconomyProgramError::NonceAlreadyUsed)
    );
}
