//! Economy program instructions: `pay_with_sol`, `pay_with_neptu` and
//! `claim_rewards`.

use tracing::debug;

use super::{
    AccountMeta, UnsignedInstruction, CLAIM_REWARDS_DISCRIMINATOR, DISCRIMINATOR_LEN,
    PAY_WITH_NEPTU_DISCRIMINATOR, PAY_WITH_SOL_DISCRIMINATOR,
};
use crate::address::Address;
use crate::config::{ASSOCIATED_TOKEN_PROGRAM_ID, SPL_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID};
use crate::error::{SettlementError, SettlementResult};
use crate::pricing::ReadingType;
use crate::program::ProgramContext;

/// Length of the authorization signature carried by a claim.
pub const CLAIM_SIGNATURE_LEN: usize = 64;

/// `disc ‖ amount u64 ‖ nonce u64 ‖ signature [u8; 64]`
pub const CLAIM_DATA_LEN: usize = DISCRIMINATOR_LEN + 8 + 8 + CLAIM_SIGNATURE_LEN;

fn reading_data(discriminator: [u8; 8], reading_type: ReadingType) -> Vec<u8> {
    let mut data = Vec::with_capacity(DISCRIMINATOR_LEN + 1);
    data.extend_from_slice(&discriminator);
    data.push(reading_type.index());
    data
}

/// `pay_with_sol(reading_type)`: the payer sends the SOL price to the
/// treasury and receives the NEPTU reward from the rewards pool. The
/// payer's token account is created on the fly if missing, hence the
/// associated token and system programs.
pub fn build_coin_payment(
    ctx: &ProgramContext,
    payer: &Address,
    recipient: &Address,
    payer_token_account: &Address,
    reading_type: ReadingType,
) -> UnsignedInstruction {
    let accounts = vec![
        AccountMeta::writable_signer(*payer),
        AccountMeta::readonly(ctx.pricing_config.address),
        AccountMeta::writable(*recipient),
        AccountMeta::writable(ctx.mint.address),
        AccountMeta::writable(*payer_token_account),
        AccountMeta::writable(ctx.rewards_pool.address),
        AccountMeta::readonly(ctx.economy_authority.address),
        AccountMeta::readonly(SPL_TOKEN_PROGRAM_ID),
        AccountMeta::readonly(ASSOCIATED_TOKEN_PROGRAM_ID),
        AccountMeta::readonly(SYSTEM_PROGRAM_ID),
    ];
    debug!(%payer, %recipient, %reading_type, "built pay_with_sol");
    UnsignedInstruction::new(
        ctx.economy_program,
        accounts,
        reading_data(PAY_WITH_SOL_DISCRIMINATOR, reading_type),
    )
}

/// `pay_with_neptu(reading_type)`: the program burns its share of the
/// price from the payer's token account and moves the rest to the
/// ecosystem pool.
pub fn build_token_payment(
    ctx: &ProgramContext,
    payer: &Address,
    payer_token_account: &Address,
    ecosystem_account: &Address,
    reading_type: ReadingType,
) -> UnsignedInstruction {
    let accounts = vec![
        AccountMeta::writable_signer(*payer),
        AccountMeta::readonly(ctx.pricing_config.address),
        AccountMeta::writable(ctx.mint.address),
        AccountMeta::writable(*payer_token_account),
        AccountMeta::writable(*ecosystem_account),
        AccountMeta::readonly(SPL_TOKEN_PROGRAM_ID),
    ];
    debug!(%payer, %ecosystem_account, %reading_type, "built pay_with_neptu");
    UnsignedInstruction::new(
        ctx.economy_program,
        accounts,
        reading_data(PAY_WITH_NEPTU_DISCRIMINATOR, reading_type),
    )
}

/// `claim_rewards(amount, nonce, signature)`.
///
/// The nonce is written exactly as given. Whether it is fresh is the
/// business of `claim::ClaimGuard` and, finally, of the program itself.
///
/// Rejects a zero amount, a signature that is not 64 bytes, and a claim
/// record that is not the claimant's derived record.
pub fn build_claim(
    ctx: &ProgramContext,
    claimant: &Address,
    claimant_token_account: &Address,
    claim_record_address: &Address,
    amount_raw: u64,
    nonce: u64,
    auth_signature: &[u8],
) -> SettlementResult<UnsignedInstruction> {
    if amount_raw == 0 {
        return Err(SettlementError::invalid_input(
            "amount",
            "claim amount must be greater than zero",
        ));
    }
    if auth_signature.len() != CLAIM_SIGNATURE_LEN {
        return Err(SettlementError::invalid_input(
            "signature",
            format!(
                "expected {} bytes, got {}",
                CLAIM_SIGNATURE_LEN,
                auth_signature.len()
            ),
        ));
    }
    let expected = ctx.claim_record(claimant)?.address;
    if expected != *claim_record_address {
        return Err(SettlementError::invalid_input(
            "claim record",
            format!("{claim_record_address} is not the claim record of {claimant} ({expected})"),
        ));
    }

    let mut data = Vec::with_capacity(CLAIM_DATA_LEN);
    data.extend_from_slice(&CLAIM_REWARDS_DISCRIMINATOR);
    data.extend_from_slice(&amount_raw.to_le_bytes());
    data.extend_from_slice(&nonce.to_le_bytes());
    data.extend_from_slice(auth_signature);

    let accounts = vec![
        AccountMeta::writable_signer(*claimant),
        AccountMeta::writable(*claim_record_address),
        AccountMeta::writable(ctx.mint.address),
        AccountMeta::writable(*claimant_token_account),
        AccountMeta::writable(ctx.rewards_pool.address),
        AccountMeta::readonly(ctx.economy_authority.address),
        AccountMeta::readonly(SPL_TOKEN_PROGRAM_ID),
        AccountMeta::readonly(ASSOCIATED_TOKEN_PROGRAM_ID),
        AccountMeta::readonly(SYSTEM_PROGRAM_ID),
    ];
    debug!(%claimant, amount_raw, nonce, "built claim_rewards");
    Ok(UnsignedInstruction::new(ctx.economy_program, accounts, data))
}
