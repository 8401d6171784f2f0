//! # Instruction Construction
//!
//! Unsigned instructions for every settlement path. The wallet signs and
//! submits; we only have to get the bytes right.
//!
//! Economy program instructions are Anchor instructions:
//!
//! ```text
//!   data = sha256("global:<name>")[..8] ‖ borsh(args)
//! ```
//!
//! Borsh encodes enums as a one-byte variant index, integers little-endian
//! and fixed arrays verbatim. The account list must follow the program's
//! `Accounts` struct field order exactly; a swapped pair fails on-chain
//! with a constraint error and costs the user a fee.
//!
//! Claims also ship as a compiled v0 message (see [`compile_message`]) so
//! the wallet only has to sign.
//!
//! SUDIGITAL payments do not touch our programs at all. They are described
//! as a [`TransferDescriptor`] the client turns into an SPL transfer.

mod economy;
mod message;
mod transfer;

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::address::Address;

pub use economy::{
    build_claim, build_coin_payment, build_token_payment, CLAIM_DATA_LEN, CLAIM_SIGNATURE_LEN,
};
pub use message::{
    compile_message, serialize_unsigned_transaction, CompiledInstruction, CompiledMessage,
    MessageHeader, MESSAGE_VERSION_0, SIGNATURE_LEN,
};
pub use transfer::{build_third_party_token_transfer, TransferDescriptor};

// ---------------------------------------------------------------------------
// Discriminators
// ---------------------------------------------------------------------------

/// Length of an Anchor discriminator.
pub const DISCRIMINATOR_LEN: usize = 8;

/// `sha256("global:pay_with_sol")[..8]`
pub const PAY_WITH_SOL_DISCRIMINATOR: [u8; 8] = [90, 168, 147, 44, 140, 41, 241, 76];

/// `sha256("global:pay_with_neptu")[..8]`
pub const PAY_WITH_NEPTU_DISCRIMINATOR: [u8; 8] = [233, 24, 33, 196, 202, 106, 226, 79];

/// `sha256("global:claim_rewards")[..8]`
pub const CLAIM_REWARDS_DISCRIMINATOR: [u8; 8] = [4, 144, 132, 71, 116, 23, 151, 80];

/// Anchor instruction discriminator for a snake_case instruction name.
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    anchor_hash("global", name)
}

/// Anchor account discriminator for a CamelCase account type name.
pub fn account_discriminator(name: &str) -> [u8; 8] {
    anchor_hash("account", name)
}

fn anchor_hash(namespace: &str, name: &str) -> [u8; 8] {
    let digest = Sha256::new()
        .chain_update(namespace.as_bytes())
        .chain_update(b":")
        .chain_update(name.as_bytes())
        .finalize();
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

// ---------------------------------------------------------------------------
// AccountMeta
// ---------------------------------------------------------------------------

/// Signer/writable flags of an account, numbered the way the web client
/// library numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountRole {
    Readonly = 0,
    Writable = 1,
    ReadonlySigner = 2,
    WritableSigner = 3,
}

/// One account reference of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountMeta {
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn readonly(address: Address) -> Self {
        Self {
            address,
            is_signer: false,
            is_writable: false,
        }
    }

    pub fn writable(address: Address) -> Self {
        Self {
            address,
            is_signer: false,
            is_writable: true,
        }
    }

    /// A fee-paying signer: signs and is debited.
    pub fn writable_signer(address: Address) -> Self {
        Self {
            address,
            is_signer: true,
            is_writable: true,
        }
    }

    pub fn role(&self) -> AccountRole {
        match (self.is_signer, self.is_writable) {
            (false, false) => AccountRole::Readonly,
            (false, true) => AccountRole::Writable,
            (true, false) => AccountRole::ReadonlySigner,
            (true, true) => AccountRole::WritableSigner,
        }
    }
}

impl Serialize for AccountMeta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AccountMeta", 2)?;
        state.serialize_field("address", &self.address)?;
        state.serialize_field("role", &(self.role() as u8))?;
        state.end()
    }
}

// ---------------------------------------------------------------------------
// UnsignedInstruction
// ---------------------------------------------------------------------------

/// A complete instruction awaiting a wallet signature. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedInstruction {
    program_id: Address,
    accounts: Vec<AccountMeta>,
    data: Vec<u8>,
}

impl UnsignedInstruction {
    pub(crate) fn new(program_id: Address, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Self {
        Self {
            program_id,
            accounts,
            data,
        }
    }

    pub fn program_id(&self) -> &Address {
        &self.program_id
    }

    pub fn accounts(&self) -> &[AccountMeta] {
        &self.accounts
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Leading eight bytes of the data, if present.
    pub fn discriminator(&self) -> Option<[u8; 8]> {
        self.data.get(..DISCRIMINATOR_LEN)?.try_into().ok()
    }

    /// Accounts that must sign the transaction carrying this instruction.
    pub fn signers(&self) -> impl Iterator<Item = &Address> {
        self.accounts
            .iter()
            .filter(|meta| meta.is_signer)
            .map(|meta| &meta.address)
    }
}

impl fmt::Display for UnsignedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} accounts={} data={}",
            self.program_id,
            self.accounts.len(),
            hex::encode(&self.data)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminators_match_anchor_hashing() {
        assert_eq!(
            instruction_discriminator("pay_with_sol"),
            PAY_WITH_SOL_DISCRIMINATOR
        );
        assert_eq!(
            instruction_discriminator("pay_with_neptu"),
            PAY_WITH_NEPTU_DISCRIMINATOR
        );
        assert_eq!(
            instruction_discriminator("claim_rewards"),
            CLAIM_REWARDS_DISCRIMINATOR
        );
    }

    #[test]
    fn account_roles() {
        let a = Address::new_from_array([1u8; 32]);
        assert_eq!(AccountMeta::readonly(a).role(), AccountRole::Readonly);
        assert_eq!(AccountMeta::writable(a).role(), AccountRole::Writable);
        assert_eq!(AccountMeta::writable_signer(a).role(), AccountRole::WritableSigner);
        let signer_only = AccountMeta {
            address: a,
            is_signer: true,
            is_writable: false,
        };
        assert_eq!(signer_only.role() as u8, 2);
    }

    #[test]
    fn serializes_to_client_shape() {
        let program = Address::new_from_array([9u8; 32]);
        let payer = Address::new_from_array([1u8; 32]);
        let ix = UnsignedInstruction::new(
            program,
            vec![AccountMeta::writable_signer(payer), AccountMeta::readonly(program)],
            vec![1, 2, 3],
        );
        let json = serde_json::to_value(&ix).unwrap();
        assert_eq!(json["programId"], program.to_string());
        assert_eq!(json["accounts"][0]["address"], payer.to_string());
        assert_eq!(json["accounts"][0]["role"], 3);
        assert_eq!(json["accounts"][1]["role"], 0);
        assert_eq!(json["data"], serde_json::json!([1, 2, 3]));
        assert_eq!(ix.signers().collect::<Vec<_>>(), vec![&payer]);
        assert_eq!(ix.discriminator(), None);
    }
}
