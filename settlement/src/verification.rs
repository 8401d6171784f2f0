//! # Payment Verification
//!
//! After the user signs and submits a payment, the caller hands us the
//! signature and we check the ledger for a transfer that actually paid:
//!
//! 1. Fetch the finalized transaction (`jsonParsed`).
//! 2. Missing → `Transaction not found`; on-chain error → `Transaction failed`.
//! 3. Scan the top-level instructions in order. The first system transfer
//!    into the configured treasury, or the first SPL token transfer of a
//!    known mint, wins. A plain `transfer` carries no mint and is taken
//!    as NEPTU.
//! 4. Nothing matched → `No valid transfer found`.
//!
//! Terminal outcomes come back as `Ok` with `is_valid = false`; only a
//! failed ledger call is an `Err`. Nothing here writes anywhere, so a
//! signature may be verified any number of times.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::address::{pda, Address};
use crate::config::{NetworkConfig, NEPTU_DECIMALS, SOL_DECIMALS, SUDIGITAL_MINT};
use crate::error::SettlementResult;
use crate::ledger::{LedgerTransport, ParsedInstruction, Signature};
use crate::pricing::PaymentMethod;
use crate::units::from_raw;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Why a signature did not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationFailure {
    NotFound,
    Failed,
    NoValidTransfer,
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerificationFailure::NotFound => "Transaction not found",
            VerificationFailure::Failed => "Transaction failed",
            VerificationFailure::NoValidTransfer => "No valid transfer found",
        })
    }
}

impl Serialize for VerificationFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of verifying one signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionVerification {
    pub is_valid: bool,
    pub signature: Signature,
    /// Lamport source, or the signing authority of a token transfer.
    pub sender: Option<Address>,
    /// Treasury wallet, or the destination token account.
    pub recipient: Option<Address>,
    pub amount_raw: u64,
    pub amount_formatted: f64,
    pub asset_type: Option<PaymentMethod>,
    /// Only known for `transferChecked`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<VerificationFailure>,
}

impl TransactionVerification {
    fn rejected(signature: Signature, failure: VerificationFailure) -> Self {
        Self {
            is_valid: false,
            signature,
            sender: None,
            recipient: None,
            amount_raw: 0,
            amount_formatted: 0.0,
            asset_type: None,
            mint: None,
            error: Some(failure),
        }
    }

    /// Valid and moved at least `expected_raw` of `asset`.
    pub fn pays_at_least(&self, asset: PaymentMethod, expected_raw: u64) -> bool {
        self.is_valid && self.asset_type == Some(asset) && self.amount_raw >= expected_raw
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verifies that `signature` settled a payment on `config`'s network.
pub async fn verify<T>(
    transport: &T,
    signature: &str,
    config: &NetworkConfig,
) -> SettlementResult<TransactionVerification>
where
    T: LedgerTransport + ?Sized,
{
    let signature: Signature = signature.parse()?;

    let Some(transaction) = transport.transaction(&signature).await? else {
        info!(%signature, "payment transaction not found");
        return Ok(TransactionVerification::rejected(
            signature,
            VerificationFailure::NotFound,
        ));
    };

    if transaction.failed() {
        info!(%signature, slot = transaction.slot, "payment transaction failed on-chain");
        return Ok(TransactionVerification::rejected(
            signature,
            VerificationFailure::Failed,
        ));
    }

    for instruction in &transaction.instructions {
        if let Some(verification) = match_transfer(signature, instruction, config)? {
            info!(
                %signature,
                asset = ?verification.asset_type,
                amount_raw = verification.amount_raw,
                "payment verified"
            );
            return Ok(verification);
        }
    }

    info!(
        %signature,
        instructions = transaction.instructions.len(),
        "no qualifying transfer in transaction"
    );
    Ok(TransactionVerification::rejected(
        signature,
        VerificationFailure::NoValidTransfer,
    ))
}

fn match_transfer(
    signature: Signature,
    instruction: &ParsedInstruction,
    config: &NetworkConfig,
) -> SettlementResult<Option<TransactionVerification>> {
    let verified = |sender: Address,
                    recipient: Address,
                    amount_raw: u64,
                    decimals: u8,
                    asset: PaymentMethod,
                    mint: Option<Address>| TransactionVerification {
        is_valid: true,
        signature,
        sender: Some(sender),
        recipient: Some(recipient),
        amount_raw,
        amount_formatted: from_raw(amount_raw, decimals),
        asset_type: Some(asset),
        mint,
        error: None,
    };

    let matched = match instruction {
        ParsedInstruction::SystemTransfer {
            source,
            destination,
            lamports,
        } => {
            if config.treasury.as_ref() != Some(destination) {
                debug!(%destination, "system transfer not addressed to treasury");
                return Ok(None);
            }
            verified(
                *source,
                *destination,
                *lamports,
                SOL_DECIMALS,
                PaymentMethod::Coin,
                None,
            )
        }
        ParsedInstruction::TokenTransfer {
            source,
            destination,
            authority,
            amount,
        } => verified(
            authority.unwrap_or(*source),
            *destination,
            *amount,
            NEPTU_DECIMALS,
            PaymentMethod::Token,
            None,
        ),
        ParsedInstruction::TokenTransferChecked {
            source,
            destination,
            authority,
            mint,
            amount,
            decimals,
        } => {
            let Some(asset) = classify_mint(mint, config)? else {
                debug!(%mint, "checked transfer of an unrecognised mint");
                return Ok(None);
            };
            verified(
                authority.unwrap_or(*source),
                *destination,
                *amount,
                *decimals,
                asset,
                Some(*mint),
            )
        }
        ParsedInstruction::Other { .. } => return Ok(None),
    };
    Ok(Some(matched))
}

/// NEPTU is the network's derived mint; SUDIGITAL is fixed. Any other
/// mint is not a payment asset.
fn classify_mint(
    mint: &Address,
    config: &NetworkConfig,
) -> SettlementResult<Option<PaymentMethod>> {
    if *mint == SUDIGITAL_MINT {
        return Ok(Some(PaymentMethod::ThirdPartyToken));
    }
    let neptu = pda::mint_address(&config.network.token_program_id())?;
    Ok((*mint == neptu.address).then_some(PaymentMethod::Token))
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

/// One signature status probe: true once the transaction landed at
/// `confirmed` or better without an error.
pub async fn confirm_transaction<T>(transport: &T, signature: &Signature) -> SettlementResult<bool>
where
    T: LedgerTransport + ?Sized,
{
    let status = transport.signature_status(signature).await?;
    Ok(status.is_some_and(|s| !s.is_failed() && s.is_confirmed()))
}

/// Polls the signature status up to `max_retries` times, `delay` apart.
///
/// Returns `true` on `confirmed`/`finalized`, `false` as soon as the
/// transaction is seen failing, and `false` when the retries run out.
pub async fn wait_for_confirmation<T>(
    transport: &T,
    signature: &Signature,
    max_retries: u32,
    delay: Duration,
) -> SettlementResult<bool>
where
    T: LedgerTransport + ?Sized,
{
    for poll in 1..=max_retries {
        if let Some(status) = transport.signature_status(signature).await? {
            if status.is_failed() {
                info!(%signature, poll, "transaction failed while awaiting confirmation");
                return Ok(false);
            }
            if status.is_confirmed() {
                debug!(%signature, poll, "transaction confirmed");
                return Ok(true);
            }
        }
        if poll < max_retries {
            tokio::time::sleep(delay).await;
        }
    }
    info!(%signature, max_retries, "gave up waiting for confirmation");
    Ok(false)
}
