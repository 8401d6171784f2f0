// Copyright (c) 2026 Neptu Contributors. MIT License.
// See LICENSE for details.

//! # Neptu Settlement — Core Library
//!
//! The payment settlement and token-economy engine behind Neptu readings.
//! Everything that touches money lives here: prices, burns, rewards, the
//! program-derived accounts of the Neptu programs, the byte-exact
//! instructions those programs expect, and the checks we run before a
//! reading is unlocked for a paying user.
//!
//! ## Architecture
//!
//! ```text
//!   pricing ──► instruction ◄── program (per-network context cache)
//!      │            │                 │
//!    units          │           address::pda
//!                   ▼
//!        caller signs externally ──► ledger (RPC transport)
//!                                       │
//!                  ledger::lifetime ◄───┤───► verification
//!                                       └───► claim / accounts
//! ```
//!
//! - **config** — Network endpoints, program ids and token parameters.
//! - **units** — Fixed-point conversion between human and raw amounts.
//! - **pricing** — Reading prices, rewards and the burn partition.
//! - **address** — Ledger addresses and program-derived address search.
//! - **program** — Per-network context of derived addresses, built once.
//! - **instruction** — Unsigned instructions for every settlement path.
//! - **ledger** — Transport trait, typed RPC decoding, HTTP transport.
//! - **payment** — Unsigned payment and claim payloads for the wallet.
//! - **verification** — Confirms a submitted signature actually paid us.
//! - **claim** — Claim records and nonce discipline for reward claims.
//! - **authorization** — Backend signature over reward claims.
//! - **accounts** — Decoders for on-chain state and balance lookups.
//!
//! Nothing in this crate persists anything. Recording a verified payment,
//! keyed by signature, is the caller's job.

pub mod accounts;
pub mod address;
pub mod authorization;
pub mod claim;
pub mod config;
pub mod error;
pub mod instruction;
pub mod ledger;
pub mod payment;
pub mod pricing;
pub mod program;
pub mod units;
pub mod verification;

pub use address::Address;
pub use config::{Network, NetworkConfig};
pub use error::{SettlementError, SettlementResult, TransportError};
pub use ledger::{LedgerTransport, Signature, TransactionLifetime};
pub use payment::PaymentService;
pub use pricing::{PaymentMethod, ReadingType};
pub use program::{ProgramContext, ProgramContextCache};
