//! Backend authorization of reward claims.
//!
//! Rewards are earned off-chain, so a claim is only as good as the
//! backend's word that the claimant is owed `amount`. The backend signs
//!
//! ```text
//!   claimant (32) ‖ amount_raw (u64 LE) ‖ nonce (u64 LE)
//! ```
//!
//! with an Ed25519 key and the 64-byte signature travels in the claim
//! instruction. Binding the nonce means a signature cannot be replayed for
//! a later claim; binding the claimant means it cannot be lifted into
//! someone else's.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;

use crate::address::Address;
use crate::error::{SettlementError, SettlementResult};
use crate::instruction::CLAIM_SIGNATURE_LEN;

/// Length of the signed claim message.
pub const CLAIM_MESSAGE_LEN: usize = 32 + 8 + 8;

/// The exact bytes a claim authorization signs.
pub fn claim_message(claimant: &Address, amount_raw: u64, nonce: u64) -> [u8; CLAIM_MESSAGE_LEN] {
    let mut message = [0u8; CLAIM_MESSAGE_LEN];
    message[..32].copy_from_slice(claimant.as_bytes());
    message[32..40].copy_from_slice(&amount_raw.to_le_bytes());
    message[40..].copy_from_slice(&nonce.to_le_bytes());
    message
}

/// Holds the backend's claim signing key.
pub struct ClaimAuthorizer {
    signing_key: SigningKey,
}

impl ClaimAuthorizer {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(secret: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Loads a hex-encoded 32-byte secret key.
    pub fn from_hex(secret_hex: &str) -> SettlementResult<Self> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| SettlementError::invalid_input("authority key", e.to_string()))?;
        let secret: [u8; SECRET_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            SettlementError::invalid_input(
                "authority key",
                format!("expected {SECRET_KEY_LENGTH} bytes, got {}", bytes.len()),
            )
        })?;
        Ok(Self::from_bytes(&secret))
    }

    /// The public key claim programs and auditors check against.
    pub fn authority(&self) -> Address {
        Address::new_from_array(self.signing_key.verifying_key().to_bytes())
    }

    /// Signs a claim of `amount_raw` at `nonce` for `claimant`.
    pub fn authorize(
        &self,
        claimant: &Address,
        amount_raw: u64,
        nonce: u64,
    ) -> [u8; CLAIM_SIGNATURE_LEN] {
        self.signing_key
            .sign(&claim_message(claimant, amount_raw, nonce))
            .to_bytes()
    }
}

impl fmt::Debug for ClaimAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClaimAuthorizer(authority={})", self.authority())
    }
}

/// Checks that `signature` is `authority`'s signature over this claim.
pub fn verify_claim_authorization(
    authority: &Address,
    claimant: &Address,
    amount_raw: u64,
    nonce: u64,
    signature: &[u8],
) -> SettlementResult<()> {
    let key = VerifyingKey::from_bytes(authority.as_bytes())
        .map_err(|_| SettlementError::invalid_input("authority", "not an ed25519 public key"))?;
    let signature = Signature::from_slice(signature).map_err(|_| {
        SettlementError::invalid_input(
            "signature",
            format!("expected {CLAIM_SIGNATURE_LEN} bytes, got {}", signature.len()),
        )
    })?;
    key.verify_strict(&claim_message(claimant, amount_raw, nonce), &signature)
        .map_err(|_| SettlementError::invalid_input("signature", "does not authorize this claim"))
}
