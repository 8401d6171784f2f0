//! # Program-Derived Addresses
//!
//! Solana's derivation: hash the seeds, the program id and the literal
//! `"ProgramDerivedAddress"` with SHA-256, and accept the digest only if it
//! is *not* a point on ed25519 (so no private key can sign for it). The
//! canonical address is the first hit when appending a bump seed counting
//! down from 255.
//!
//! The seed layouts below are frozen by the deployed Neptu programs. Each
//! one is pinned by a fixture test; a silent change here yields accounts
//! the programs will never accept.
//!
//! ```text
//!   mint            ["mint"]                          token program
//!   economy         ["economy"]                       economy program
//!   economy state   ["economy_state"]                 economy program
//!   pricing config  ["pricing_config"]                economy program
//!   claim record    ["claim", owner]                  economy program
//!   metadata        ["metadata", metadata prog, mint] metadata program
//!   token account   [owner, spl token prog, mint]     associated token program
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::Address;
use crate::config::{ASSOCIATED_TOKEN_PROGRAM_ID, SPL_TOKEN_PROGRAM_ID, TOKEN_METADATA_PROGRAM_ID};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a single seed.
pub const MAX_SEED_LEN: usize = 32;

/// Maximum number of seeds, bump included.
pub const MAX_SEEDS: usize = 16;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

pub const MINT_SEED: &[u8] = b"mint";
pub const ECONOMY_SEED: &[u8] = b"economy";
pub const ECONOMY_STATE_SEED: &[u8] = b"economy_state";
pub const PRICING_CONFIG_SEED: &[u8] = b"pricing_config";
pub const CLAIM_SEED: &[u8] = b"claim";
pub const METADATA_SEED: &[u8] = b"metadata";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why a set of seeds cannot produce a program address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PdaError {
    /// A seed is longer than [`MAX_SEED_LEN`].
    #[error("seed {index} is {len} bytes, max is {MAX_SEED_LEN}")]
    MaxSeedLengthExceeded { index: usize, len: usize },

    /// More seeds than [`MAX_SEEDS`].
    #[error("{count} seeds given, max is {MAX_SEEDS}")]
    TooManySeeds { count: usize },

    /// The digest landed on the curve. Try another bump.
    #[error("derived address is on the ed25519 curve")]
    InvalidSeeds,

    /// All 256 bumps produced on-curve digests.
    #[error("no viable bump seed")]
    NoViableBump,
}

/// An address found by bump search, together with its bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivedAddress {
    pub address: Address,
    pub bump: u8,
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

fn check_seeds(seeds: &[&[u8]], max: usize) -> Result<(), PdaError> {
    if seeds.len() > max {
        return Err(PdaError::TooManySeeds { count: seeds.len() });
    }
    for (index, seed) in seeds.iter().enumerate() {
        if seed.len() > MAX_SEED_LEN {
            return Err(PdaError::MaxSeedLengthExceeded {
                index,
                len: seed.len(),
            });
        }
    }
    Ok(())
}

fn hash_to_address(seeds: &[&[u8]], bump: Option<u8>, program_id: &Address) -> Address {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    if let Some(bump) = bump {
        hasher.update([bump]);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);
    Address::new_from_array(hasher.finalize().into())
}

/// Derives the address for an exact seed list (bump, if any, already
/// included). Fails with [`PdaError::InvalidSeeds`] when the result is on
/// the curve.
pub fn create_program_address(seeds: &[&[u8]], program_id: &Address) -> Result<Address, PdaError> {
    check_seeds(seeds, MAX_SEEDS)?;
    let address = hash_to_address(seeds, None, program_id);
    if address.is_on_curve() {
        return Err(PdaError::InvalidSeeds);
    }
    Ok(address)
}

/// Searches bumps 255..=0 for the canonical program address of `seeds`.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<DerivedAddress, PdaError> {
    check_seeds(seeds, MAX_SEEDS - 1)?;
    for bump in (0..=u8::MAX).rev() {
        let address = hash_to_address(seeds, Some(bump), program_id);
        if !address.is_on_curve() {
            return Ok(DerivedAddress { address, bump });
        }
    }
    Err(PdaError::NoViableBump)
}

// ---------------------------------------------------------------------------
// Frozen seed contracts
// ---------------------------------------------------------------------------

/// The NEPTU mint, owned by the token program.
pub fn mint_address(token_program: &Address) -> Result<DerivedAddress, PdaError> {
    find_program_address(&[MINT_SEED], token_program)
}

/// The economy program's signing authority. Owns the rewards pool.
pub fn economy_authority_address(economy_program: &Address) -> Result<DerivedAddress, PdaError> {
    find_program_address(&[ECONOMY_SEED], economy_program)
}

pub fn economy_state_address(economy_program: &Address) -> Result<DerivedAddress, PdaError> {
    find_program_address(&[ECONOMY_STATE_SEED], economy_program)
}

pub fn pricing_config_address(economy_program: &Address) -> Result<DerivedAddress, PdaError> {
    find_program_address(&[PRICING_CONFIG_SEED], economy_program)
}

/// Per-user claim record holding the last accepted nonce.
pub fn claim_record_address(
    owner: &Address,
    economy_program: &Address,
) -> Result<DerivedAddress, PdaError> {
    find_program_address(&[CLAIM_SEED, owner.as_ref()], economy_program)
}

/// Metaplex metadata account of a mint.
pub fn metadata_address(mint: &Address) -> Result<DerivedAddress, PdaError> {
    find_program_address(
        &[METADATA_SEED, TOKEN_METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &TOKEN_METADATA_PROGRAM_ID,
    )
}

/// The associated token account of `owner` for `mint`.
pub fn associated_token_address(
    owner: &Address,
    mint: &Address,
) -> Result<DerivedAddress, PdaError> {
    find_program_address(
        &[owner.as_ref(), SPL_TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NEPTU_ECONOMY_PROGRAM_ID, NEPTU_TOKEN_PROGRAM_ID, SUDIGITAL_MINT};

    const USER: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn assert_derived(derived: DerivedAddress, address: &str, bump: u8) {
        assert_eq!(derived.address.to_string(), address);
        assert_eq!(derived.bump, bump);
        assert!(!derived.address.is_on_curve());
    }

    // Published vectors for the ledger's create_program_address.
    #[test]
    fn create_program_address_vectors() {
        let program = addr("BPFLoaderUpgradeab1e11111111111111111111111");
        let public_key = addr("SeedPubey1111111111111111111111111111111111");

        assert_eq!(
            create_program_address(&[b"", &[1]], &program).unwrap().to_string(),
            "BwqrghZA2htAcqq8dzP1WDAhTXYTYWj7CHxF5j7TDBAe"
        );
        assert_eq!(
            create_program_address(&["☉".as_bytes(), &[0]], &program)
                .unwrap()
                .to_string(),
            "13yWmRpaTR4r5nAktwLqMpRNr28tnVUZw26rTvPSSB19"
        );
        assert_eq!(
            create_program_address(&[b"Talking", b"Squirrels"], &program)
                .unwrap()
                .to_string(),
            "2fnQrngrQT4SeLcdToJAD96phoEjNL2man2kfRLCASVk"
        );
        assert_eq!(
            create_program_address(&[public_key.as_ref(), &[1]], &program)
                .unwrap()
                .to_string(),
            "976ymqVnfE32QFe6NfGDctSvVa36LWnvYxhU6G2232YL"
        );
        assert_ne!(
            create_program_address(&[b"Talking", b"Squirrels"], &program).unwrap(),
            create_program_address(&[b"Talking"], &program).unwrap()
        );
    }

    #[test]
    fn seed_limits() {
        let program = NEPTU_ECONOMY_PROGRAM_ID;
        let long = [0u8; MAX_SEED_LEN + 1];
        assert_eq!(
            create_program_address(&[&long], &program),
            Err(PdaError::MaxSeedLengthExceeded { index: 0, len: 33 })
        );
        let seeds: Vec<&[u8]> = vec![&b"x"[..]; MAX_SEEDS + 1];
        assert_eq!(
            create_program_address(&seeds, &program),
            Err(PdaError::TooManySeeds { count: 17 })
        );
        let seeds: Vec<&[u8]> = vec![&b"x"[..]; MAX_SEEDS];
        assert_eq!(
            find_program_address(&seeds, &program),
            Err(PdaError::TooManySeeds { count: 16 })
        );
    }

    #[test]
    fn find_agrees_with_create() {
        let derived = find_program_address(&[b"Lil'", b"Bits"], &NEPTU_TOKEN_PROGRAM_ID).unwrap();
        let recreated =
            create_program_address(&[b"Lil'", b"Bits", &[derived.bump]], &NEPTU_TOKEN_PROGRAM_ID)
                .unwrap();
        assert_eq!(derived.address, recreated);
    }

    #[test]
    fn derivation_is_deterministic() {
        let owner = addr(USER);
        let a = claim_record_address(&owner, &NEPTU_ECONOMY_PROGRAM_ID).unwrap();
        let b = claim_record_address(&owner, &NEPTU_ECONOMY_PROGRAM_ID).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn frozen_program_accounts() {
        let mint = mint_address(&NEPTU_TOKEN_PROGRAM_ID).unwrap();
        assert_derived(mint, "J4rUwfHS74XKTcNAX5wh5vuwYH4Fv5MR4Pdo4Gt4dhrq", 255);

        let authority = economy_authority_address(&NEPTU_ECONOMY_PROGRAM_ID).unwrap();
        assert_derived(authority, "BRW7fxvTcnnzi6dvgfiCoTnWJRFSMCirKAGRVn41Co4E", 255);

        assert_derived(
            economy_state_address(&NEPTU_ECONOMY_PROGRAM_ID).unwrap(),
            "2xwDMxJM6iH4F4arSmWBKQ5NNAKRrsVW7dDXFDN7GGSt",
            253,
        );
        assert_derived(
            pricing_config_address(&NEPTU_ECONOMY_PROGRAM_ID).unwrap(),
            "2d8ojCTHXskZm64gdEeoztPmDfAQMXuJ48GJDYwZUYUY",
            254,
        );
        assert_derived(
            metadata_address(&mint.address).unwrap(),
            "BsPKqNxZnVuHaKEvsYe79P3mh9VjGWehXWC7vkoVDBaU",
            255,
        );
        assert_derived(
            associated_token_address(&authority.address, &mint.address).unwrap(),
            "74ghaUNLKLaFvLN74G8yex8hougvJkqwJEBYxpSJ1ZL",
            254,
        );
    }

    #[test]
    fn frozen_user_accounts() {
        let mint = mint_address(&NEPTU_TOKEN_PROGRAM_ID).unwrap().address;
        let user = addr(USER);

        assert_derived(
            associated_token_address(&user, &mint).unwrap(),
            "E2nJPAG2XcDngJWKZzaDpQFtAxncvwxAQKKFkBkKNFv3",
            255,
        );
        assert_derived(
            associated_token_address(&user, &SUDIGITAL_MINT).unwrap(),
            "uanUGhwce6hgRhsRFUkJbGsijLY7hQx93oBgRXKQkc2",
            255,
        );
        assert_derived(
            claim_record_address(&user, &NEPTU_ECONOMY_PROGRAM_ID).unwrap(),
            "GsoX6erQbDnZ9XazEeYdVEUYULYxGwzEoRf4JsYLpSNy",
            255,
        );
        assert_derived(
            claim_record_address(
                &addr("2VNKqH3aL3xQkZGZ7wj3F6GWZ5E6VSovs3svLesaxwCo"),
                &NEPTU_ECONOMY_PROGRAM_ID,
            )
            .unwrap(),
            "9JBnwGDK56BbyfMUbn473BYfi3nk3n3ydT937NXTAvoG",
            251,
        );
    }
}
