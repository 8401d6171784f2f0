//! # Ledger Addresses
//!
//! An [`Address`] is a 32-byte Solana public key. Its text form is base58,
//! which is also how it serializes. Program-derived addresses live in
//! [`pda`].

pub mod pda;

use std::fmt;
use std::str::FromStr;

use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SettlementError, SettlementResult};

pub use pda::{
    associated_token_address, claim_record_address, create_program_address,
    economy_authority_address, economy_state_address, find_program_address, metadata_address,
    mint_address, pricing_config_address, DerivedAddress, PdaError,
};

/// A 32-byte ledger public key.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 32]);

impl Address {
    /// Byte length of an address.
    pub const LEN: usize = 32;

    pub const fn new_from_array(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }

    /// Copies an address out of a 32-byte slice.
    pub fn try_from_slice(bytes: &[u8]) -> SettlementResult<Self> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            SettlementError::invalid_input(
                "address",
                format!("expected {} bytes, got {}", Self::LEN, bytes.len()),
            )
        })?;
        Ok(Address(array))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True if the bytes decompress to an ed25519 point, i.e. a private key
    /// could exist for this address. Program-derived addresses never are.
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Address(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| SettlementError::invalid_input("address", format!("`{s}`: {e}")))?;
        Self::try_from_slice(&bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    const USER: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

    #[test]
    fn base58_round_trip() {
        let addr: Address = USER.parse().unwrap();
        assert_eq!(addr.to_string(), USER);
        assert_eq!(Address::try_from_slice(addr.as_ref()).unwrap(), addr);
    }

    #[test]
    fn rejects_malformed_text() {
        for bad in ["", "0OIl", "abc", "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU7xKX"] {
            match bad.parse::<Address>() {
                Err(SettlementError::InvalidInput { field: "address", .. }) => {}
                other => panic!("expected InvalidInput for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn serde_uses_base58() {
        let addr: Address = USER.parse().unwrap();
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{USER}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert!(serde_json::from_str::<Address>("\"nope\"").is_err());
    }

    #[test]
    fn wallet_keys_are_on_curve() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let addr = Address::new_from_array(key.verifying_key().to_bytes());
        assert!(addr.is_on_curve());
    }
}
