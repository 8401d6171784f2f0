//! Unsigned payment payloads.
//!
//! Ties the pieces together the way a route handler uses them: quote the
//! price, build the instruction (or transfer descriptor), attach a fresh
//! transaction lifetime, and hand the whole thing back for the wallet to
//! sign. Input is validated before any ledger I/O happens.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::address::Address;
use crate::claim::{ClaimGuard, ClaimRecord, ClaimTicket};
use crate::config::{NetworkConfig, SUDIGITAL_DECIMALS, SUDIGITAL_MINT};
use crate::error::SettlementResult;
use crate::instruction::{
    build_claim, build_coin_payment, build_third_party_token_transfer, build_token_payment,
    serialize_unsigned_transaction, TransferDescriptor, UnsignedInstruction,
};
use crate::ledger::{LifetimeFetcher, TransactionLifetime};
use crate::pricing::{
    calculate_coin_payment_reward, calculate_third_party_payment, calculate_token_payment_burn,
    BurnCalculation, PaymentMethod, ReadingType, RewardCalculation, ThirdPartyPaymentCalculation,
};
use crate::program::{ProgramContext, ProgramContextCache};

/// The price side of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PaymentQuote {
    Coin(RewardCalculation),
    Token(BurnCalculation),
    ThirdParty(ThirdPartyPaymentCalculation),
}

/// What the wallet needs to sign one payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentPayload {
    pub method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<UnsignedInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferDescriptor>,
    pub transaction: TransactionLifetime,
    pub pricing: PaymentQuote,
}

/// What the wallet needs to sign a reward claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimPayload {
    pub instruction: UnsignedInstruction,
    /// Unsigned v0 transaction with a zeroed signature slot for the
    /// claimant. Serialized as a JSON byte array.
    #[serde(rename = "serializedTransaction")]
    pub serialized_transaction: Vec<u8>,
    pub transaction: TransactionLifetime,
    pub claim: ClaimTicket,
    #[serde(rename = "amountRaw")]
    pub amount_raw: u64,
}

/// Builds payment and claim payloads for one network.
#[derive(Debug, Clone)]
pub struct PaymentService {
    config: NetworkConfig,
    contexts: Arc<ProgramContextCache>,
    lifetimes: LifetimeFetcher,
    claims: Arc<ClaimGuard>,
}

impl PaymentService {
    pub fn new(
        config: NetworkConfig,
        contexts: Arc<ProgramContextCache>,
        lifetimes: LifetimeFetcher,
        claims: Arc<ClaimGuard>,
    ) -> Self {
        Self {
            config,
            contexts,
            lifetimes,
            claims,
        }
    }

    /// Service over the configured RPC endpoint with its own caches.
    pub fn from_config(config: NetworkConfig) -> SettlementResult<Self> {
        let lifetimes = LifetimeFetcher::for_config(&config)?;
        Ok(Self::new(
            config,
            Arc::new(ProgramContextCache::new()),
            lifetimes,
            Arc::new(ClaimGuard::new()),
        ))
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn context(&self) -> SettlementResult<Arc<ProgramContext>> {
        self.contexts.get(self.config.network)
    }

    pub fn claims(&self) -> &ClaimGuard {
        &self.claims
    }

    /// Builds the payload for `payer` paying for `reading_type` with
    /// `method`. `supplied` is a lifetime the client already holds.
    pub async fn build_payment(
        &self,
        method: PaymentMethod,
        reading_type: ReadingType,
        payer: &Address,
        supplied: Option<TransactionLifetime>,
    ) -> SettlementResult<PaymentPayload> {
        let (instruction, transfer, pricing) = match method {
            PaymentMethod::Coin => {
                let ctx = self.context()?;
                let treasury = self.config.require_treasury()?;
                let payer_token_account = ctx.token_account(payer)?;
                let ix = build_coin_payment(&ctx, payer, &treasury, &payer_token_account, reading_type);
                let quote = PaymentQuote::Coin(calculate_coin_payment_reward(reading_type));
                (Some(ix), None, quote)
            }
            PaymentMethod::Token => {
                let ctx = self.context()?;
                let pool = self.config.require_ecosystem_pool()?;
                let payer_token_account = ctx.token_account(payer)?;
                let ix = build_token_payment(&ctx, payer, &payer_token_account, &pool, reading_type);
                let quote = PaymentQuote::Token(calculate_token_payment_burn(reading_type));
                (Some(ix), None, quote)
            }
            PaymentMethod::ThirdPartyToken => {
                let treasury = self.config.require_third_party_treasury()?;
                let calc = calculate_third_party_payment(reading_type);
                let transfer = build_third_party_token_transfer(
                    &SUDIGITAL_MINT,
                    payer,
                    &treasury,
                    calc.amount_raw,
                    SUDIGITAL_DECIMALS,
                )?;
                (None, Some(transfer), PaymentQuote::ThirdParty(calc))
            }
        };

        let transaction = self.lifetimes.resolve(supplied).await?;
        info!(
            %payer,
            %method,
            %reading_type,
            valid_until = transaction.valid_until_height,
            "payment payload built"
        );
        Ok(PaymentPayload {
            method,
            instruction,
            transfer,
            transaction,
            pricing,
        })
    }

    /// Builds a claim payload with its unsigned v0 transaction, paid for
    /// by the claimant.
    ///
    /// Everything fallible or awaited happens before the nonce is reserved,
    /// so a failed or abandoned build leaves nothing behind. Once reserved,
    /// a second request with the same nonce is rejected.
    pub async fn build_claim(
        &self,
        claimant: &Address,
        amount_raw: u64,
        nonce: u64,
        auth_signature: &[u8],
        observed: Option<&ClaimRecord>,
        supplied: Option<TransactionLifetime>,
    ) -> SettlementResult<ClaimPayload> {
        let ctx = self.context()?;
        let instruction = build_claim(
            &ctx,
            claimant,
            &ctx.token_account(claimant)?,
            &ctx.claim_record(claimant)?.address,
            amount_raw,
            nonce,
            auth_signature,
        )?;
        // Cheap replay rejection before any ledger I/O.
        self.claims.check(claimant, observed, nonce)?;

        let transaction = self.lifetimes.resolve(supplied).await?;
        let serialized_transaction = serialize_unsigned_transaction(
            claimant,
            &transaction.recent_hash,
            std::slice::from_ref(&instruction),
        )?;

        let claim = self.claims.reserve(claimant, observed, nonce)?;
        info!(
            %claimant,
            nonce,
            amount_raw,
            bytes = serialized_transaction.len(),
            "claim payload built"
        );
        Ok(ClaimPayload {
            instruction,
            serialized_transaction,
            transaction,
            claim,
            amount_raw,
        })
    }
}
