//! Third-party token transfers.
//!
//! SUDIGITAL is an ordinary SPL token with no program of ours in the loop,
//! so instead of an instruction we hand the client a description of the
//! `transferChecked` it should sign. `from` and `to` are wallet owners;
//! the client resolves their associated token accounts.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::{SettlementError, SettlementResult};

/// A token transfer for the client to build and sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDescriptor {
    pub mint: Address,
    pub from: Address,
    pub to: Address,
    /// Amount in raw units of `mint`.
    #[serde(rename = "amount")]
    pub amount_raw: u64,
    pub decimals: u8,
}

pub fn build_third_party_token_transfer(
    mint: &Address,
    from: &Address,
    to: &Address,
    amount_raw: u64,
    decimals: u8,
) -> SettlementResult<TransferDescriptor> {
    if amount_raw == 0 {
        return Err(SettlementError::invalid_input(
            "amount",
            "transfer amount must be greater than zero",
        ));
    }
    if from == to {
        return Err(SettlementError::invalid_input(
            "recipient",
            format!("sender and recipient are both {from}"),
        ));
    }
    Ok(TransferDescriptor {
        mint: *mint,
        from: *from,
        to: *to,
        amount_raw,
        decimals,
    })
}
