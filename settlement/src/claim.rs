//! # Claim Replay Guard
//!
//! Every reward claim carries a nonce, and the economy program only accepts
//! a claim whose nonce is strictly above the `last_nonce` stored in the
//! claimant's claim record. This module reads those records and applies
//! the same rule before an instruction is handed out, so that a replay is
//! reported as [`SettlementError::NonceAlreadyUsed`] instead of a failed
//! transaction the user paid a fee for.
//!
//! The guard also remembers nonces it has prepared in this process. Two
//! requests racing with the same nonce therefore cannot both get an
//! instruction, even before either lands on-chain. The program stays the
//! final arbiter; nonces are always used exactly as the caller gave them.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::accounts::{fetch_owned, AccountReader};
use crate::address::Address;
use crate::error::{SettlementError, SettlementResult};
use crate::instruction::{build_claim, UnsignedInstruction};
use crate::ledger::LedgerTransport;
use crate::program::ProgramContext;

/// `sha256("account:ClaimRecord")[..8]`
pub const CLAIM_RECORD_DISCRIMINATOR: [u8; 8] = [57, 229, 0, 9, 65, 62, 96, 7];

// ---------------------------------------------------------------------------
// ClaimRecord
// ---------------------------------------------------------------------------

/// A claimant's on-chain claim record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub owner: Address,
    pub last_nonce: u64,
    pub total_claimed_raw: u64,
}

impl ClaimRecord {
    pub const BODY_LEN: usize = 32 + 8 + 8;

    pub fn decode(data: &[u8]) -> SettlementResult<Self> {
        let mut reader =
            AccountReader::open(data, &CLAIM_RECORD_DISCRIMINATOR, Self::BODY_LEN, "claim record")?;
        Ok(Self {
            owner: reader.address()?,
            last_nonce: reader.u64()?,
            total_claimed_raw: reader.u64()?,
        })
    }
}

/// Reads `owner`'s claim record. `None` before the first claim.
pub async fn fetch_claim_record<T>(
    transport: &T,
    ctx: &ProgramContext,
    owner: &Address,
) -> SettlementResult<Option<ClaimRecord>>
where
    T: LedgerTransport + ?Sized,
{
    let address = ctx.claim_record(owner)?.address;
    let Some(data) = fetch_owned(transport, &address, &ctx.economy_program, "claim record").await?
    else {
        return Ok(None);
    };
    let record = ClaimRecord::decode(&data)?;
    if record.owner != *owner {
        return Err(SettlementError::invalid_input(
            "claim record",
            format!("{address} belongs to {}, not {owner}", record.owner),
        ));
    }
    debug!(%owner, last_nonce = record.last_nonce, "claim record loaded");
    Ok(Some(record))
}

// ---------------------------------------------------------------------------
// ClaimGuard
// ---------------------------------------------------------------------------

/// Proof that a nonce cleared the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimTicket {
    pub claimant: Address,
    pub nonce: u64,
    /// Highest nonce known before this one: observed on-chain or
    /// prepared locally.
    pub last_nonce: u64,
}

/// Nonce discipline for claims, shared by all requests of a process.
#[derive(Debug, Default)]
pub struct ClaimGuard {
    reserved: RwLock<HashMap<Address, u64>>,
}

impl ClaimGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn floor(&self, claimant: &Address, observed: Option<&ClaimRecord>) -> SettlementResult<u64> {
        let on_chain = match observed {
            Some(record) if record.owner != *claimant => {
                return Err(SettlementError::invalid_input(
                    "claim record",
                    format!("record of {} passed for {claimant}", record.owner),
                ));
            }
            Some(record) => record.last_nonce,
            None => 0,
        };
        let local = self.reserved.read().get(claimant).copied().unwrap_or(0);
        Ok(on_chain.max(local))
    }

    /// Accepts `nonce` if it is above everything seen for `claimant`.
    pub fn check(
        &self,
        claimant: &Address,
        observed: Option<&ClaimRecord>,
        nonce: u64,
    ) -> SettlementResult<ClaimTicket> {
        let last_nonce = self.floor(claimant, observed)?;
        if nonce <= last_nonce {
            return Err(SettlementError::NonceAlreadyUsed { nonce, last_nonce });
        }
        Ok(ClaimTicket {
            claimant: *claimant,
            nonce,
            last_nonce,
        })
    }

    /// The smallest nonce `check` would accept right now. A suggestion for
    /// callers that allocate nonces; the guard never substitutes it.
    pub fn next_nonce(
        &self,
        claimant: &Address,
        observed: Option<&ClaimRecord>,
    ) -> SettlementResult<u64> {
        self.floor(claimant, observed)?
            .checked_add(1)
            .ok_or_else(|| SettlementError::invalid_input("nonce", "nonce space exhausted"))
    }

    /// Checks `nonce` and records it as taken for `claimant` in one step.
    /// Callers that still have fallible work to do should do it first and
    /// reserve last, or [`release`](Self::release) the ticket on failure.
    pub fn reserve(
        &self,
        claimant: &Address,
        observed: Option<&ClaimRecord>,
        nonce: u64,
    ) -> SettlementResult<ClaimTicket> {
        if observed.is_some_and(|r| r.owner != *claimant) {
            return Err(SettlementError::invalid_input(
                "claim record",
                format!("record passed for {claimant} belongs to someone else"),
            ));
        }
        let on_chain = observed.map_or(0, |r| r.last_nonce);

        let mut reserved = self.reserved.write();
        let last_nonce = on_chain.max(reserved.get(claimant).copied().unwrap_or(0));
        if nonce <= last_nonce {
            drop(reserved);
            warn!(%claimant, nonce, last_nonce, "rejected claim replay");
            return Err(SettlementError::NonceAlreadyUsed { nonce, last_nonce });
        }
        reserved.insert(*claimant, nonce);
        drop(reserved);

        debug!(%claimant, nonce, "claim nonce reserved");
        Ok(ClaimTicket {
            claimant: *claimant,
            nonce,
            last_nonce,
        })
    }

    /// Builds the claim instruction and reserves its nonce for `claimant`.
    /// Nothing is reserved if the instruction cannot be built.
    pub fn prepare(
        &self,
        ctx: &ProgramContext,
        claimant: &Address,
        amount_raw: u64,
        nonce: u64,
        auth_signature: &[u8],
        observed: Option<&ClaimRecord>,
    ) -> SettlementResult<(ClaimTicket, UnsignedInstruction)> {
        let token_account = ctx.token_account(claimant)?;
        let record = ctx.claim_record(claimant)?.address;
        let instruction = build_claim(
            ctx,
            claimant,
            &token_account,
            &record,
            amount_raw,
            nonce,
            auth_signature,
        )?;
        let ticket = self.reserve(claimant, observed, nonce)?;
        Ok((ticket, instruction))
    }

    /// Forgets a reservation whose transaction was never submitted, so the
    /// same nonce can be prepared again.
    pub fn release(&self, ticket: &ClaimTicket) {
        let mut reserved = self.reserved.write();
        if reserved.get(&ticket.claimant) == Some(&ticket.nonce) {
            if ticket.last_nonce == 0 {
                reserved.remove(&ticket.claimant);
            } else {
                reserved.insert(ticket.claimant, ticket.last_nonce);
            }
        }
    }

    pub fn reserved_nonce(&self, claimant: &Address) -> Option<u64> {
        self.reserved.read().get(claimant).copied()
    }
}

// ---------------------------------------------------------------------------
// On-chain errors
// ---------------------------------------------------------------------------

/// Custom errors of the economy program. Anchor numbers them from 6000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EconomyProgramError {
    InvalidAmount,
    NonceAlreadyUsed,
    Overflow,
    InsufficientBalance,
    Unauthorized,
}

impl EconomyProgramError {
    pub fn code(&self) -> u32 {
        6000 + *self as u32
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            6000 => Some(Self::InvalidAmount),
            6001 => Some(Self::NonceAlreadyUsed),
            6002 => Some(Self::Overflow),
            6003 => Some(Self::InsufficientBalance),
            6004 => Some(Self::Unauthorized),
            _ => None,
        }
    }

    /// Reads `{"InstructionError": [index, {"Custom": code}]}`.
    pub fn from_transaction_error(err: &Value) -> Option<Self> {
        let code = err
            .get("InstructionError")?
            .get(1)?
            .get("Custom")?
            .as_u64()?;
        Self::from_code(code)
    }
}

impl fmt::Display for EconomyProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidAmount => "Invalid amount",
            Self::NonceAlreadyUsed => "Nonce already used",
            Self::Overflow => "Arithmetic overflow",
            Self::InsufficientBalance => "Insufficient balance",
            Self::Unauthorized => "Unauthorized",
        })
    }
}
