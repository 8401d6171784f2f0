//! # Pricing & Reward Table
//!
//! Every reading has a price in each accepted asset, a NEPTU reward paid
//! out when the user pays in SOL (or SUDIGITAL), and a burn share when the
//! user pays in NEPTU.
//!
//! ```text
//!   SOL payment        ──► treasury      + NEPTU reward from rewards pool
//!   NEPTU payment      ──► burn (50%)    + ecosystem pool (remainder)
//!   SUDIGITAL payment  ──► SUDIGITAL treasury + NEPTU reward
//! ```
//!
//! The burn partition is computed on raw units with integer basis points:
//! the burn share is floored and the treasury takes whatever is left, so
//! `burn + treasury == total` holds exactly for every amount. This is the
//! same arithmetic the economy program runs on-chain.
//!
//! The table is an exhaustive `match` over [`ReadingType`]. Adding a reading
//! without pricing it does not compile.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{BPS_DENOMINATOR, BURN_RATE_BPS, SUDIGITAL_DECIMALS};
use crate::error::{SettlementError, SettlementResult};
use crate::units::{from_raw, from_raw_token, to_raw, to_raw_coin, to_raw_token};

// ---------------------------------------------------------------------------
// Reading types & payment methods
// ---------------------------------------------------------------------------

/// A paid product action.
///
/// The declaration order is the Borsh variant index of the economy
/// program's `ReadingType` enum and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadingType {
    /// Full birth-potential reading.
    Potensi,
    /// Daily opportunity reading.
    Peluang,
    /// One AI oracle chat message.
    AiChat,
    /// Compatibility reading for two people.
    Compatibility,
}

impl ReadingType {
    pub const ALL: [ReadingType; 4] = [
        ReadingType::Potensi,
        ReadingType::Peluang,
        ReadingType::AiChat,
        ReadingType::Compatibility,
    ];

    /// Wire name, as used by the API and the pricing table.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingType::Potensi => "POTENSI",
            ReadingType::Peluang => "PELUANG",
            ReadingType::AiChat => "AI_CHAT",
            ReadingType::Compatibility => "COMPATIBILITY",
        }
    }

    /// Borsh variant index in the economy program's instruction data.
    pub fn index(&self) -> u8 {
        match self {
            ReadingType::Potensi => 0,
            ReadingType::Peluang => 1,
            ReadingType::AiChat => 2,
            ReadingType::Compatibility => 3,
        }
    }

    /// Inverse of [`ReadingType::index`].
    pub fn from_index(index: u8) -> SettlementResult<Self> {
        Self::ALL
            .into_iter()
            .find(|rt| rt.index() == index)
            .ok_or_else(|| SettlementError::UnknownReadingType(format!("index {index}")))
    }
}

impl fmt::Display for ReadingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingType {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|rt| rt.as_str() == wanted)
            .ok_or_else(|| SettlementError::UnknownReadingType(s.to_string()))
    }
}

/// How the user pays for a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Native SOL, through the economy program.
    #[serde(rename = "sol")]
    Coin,
    /// NEPTU, burned in part by the economy program.
    #[serde(rename = "neptu")]
    Token,
    /// SUDIGITAL, a plain SPL transfer to its treasury.
    #[serde(rename = "sudigital")]
    ThirdPartyToken,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Coin => "sol",
            PaymentMethod::Token => "neptu",
            PaymentMethod::ThirdPartyToken => "sudigital",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sol" | "coin" => Ok(PaymentMethod::Coin),
            "neptu" | "token" => Ok(PaymentMethod::Token),
            "sudigital" | "third-party" => Ok(PaymentMethod::ThirdPartyToken),
            other => Err(SettlementError::invalid_input(
                "payment method",
                format!("unknown payment method `{other}`"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Pricing table
// ---------------------------------------------------------------------------

/// Prices and rewards of one reading, in human units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    /// Price in SOL.
    pub coin_price: f64,
    /// Price in NEPTU.
    pub token_price: f64,
    /// NEPTU reward paid when the reading is bought with SOL.
    pub token_reward_on_coin_pay: f64,
    /// Price in SUDIGITAL.
    pub third_party_token_price: f64,
    /// NEPTU reward paid when the reading is bought with SUDIGITAL.
    pub token_reward_on_third_party_pay: f64,
}

/// The pricing table.
pub const fn pricing_entry(reading_type: ReadingType) -> PricingEntry {
    match reading_type {
        ReadingType::Potensi => PricingEntry {
            coin_price: 0.01,
            token_price: 10.0,
            token_reward_on_coin_pay: 10.0,
            third_party_token_price: 10.0,
            token_reward_on_third_party_pay: 10.0,
        },
        ReadingType::Peluang => PricingEntry {
            coin_price: 0.001,
            token_price: 1.0,
            token_reward_on_coin_pay: 1.0,
            third_party_token_price: 1.0,
            token_reward_on_third_party_pay: 1.0,
        },
        ReadingType::AiChat => PricingEntry {
            coin_price: 0.002,
            token_price: 2.0,
            token_reward_on_coin_pay: 2.0,
            third_party_token_price: 2.0,
            token_reward_on_third_party_pay: 2.0,
        },
        ReadingType::Compatibility => PricingEntry {
            coin_price: 0.005,
            token_price: 5.0,
            token_reward_on_coin_pay: 5.0,
            third_party_token_price: 5.0,
            token_reward_on_third_party_pay: 5.0,
        },
    }
}

/// Price of a reading in the given payment asset, in human units.
pub fn price_of(reading_type: ReadingType, method: PaymentMethod) -> f64 {
    let entry = pricing_entry(reading_type);
    match method {
        PaymentMethod::Coin => entry.coin_price,
        PaymentMethod::Token => entry.token_price,
        PaymentMethod::ThirdPartyToken => entry.third_party_token_price,
    }
}

/// NEPTU reward for paying in SOL.
pub fn reward_of(reading_type: ReadingType) -> f64 {
    pricing_entry(reading_type).token_reward_on_coin_pay
}

/// NEPTU reward for paying in SUDIGITAL.
pub fn third_party_reward_of(reading_type: ReadingType) -> f64 {
    pricing_entry(reading_type).token_reward_on_third_party_pay
}

/// Global burn share of NEPTU payments, as a fraction.
pub fn burn_rate_of() -> f64 {
    BURN_RATE_BPS as f64 / BPS_DENOMINATOR as f64
}

/// Splits a raw NEPTU amount into `(burn, treasury)`. The burn share is
/// floored; the remainder goes to the treasury.
pub fn split_burn(total_raw: u64) -> (u64, u64) {
    let burn = (total_raw as u128 * BURN_RATE_BPS as u128 / BPS_DENOMINATOR as u128) as u64;
    (burn, total_raw - burn)
}

// ---------------------------------------------------------------------------
// Calculations
// ---------------------------------------------------------------------------

/// What a SOL payment costs and earns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardCalculation {
    pub reading_type: ReadingType,
    /// Price in lamports.
    pub coin_amount_raw: u64,
    /// NEPTU reward in raw units.
    pub token_reward_raw: u64,
    /// NEPTU reward in whole tokens.
    pub token_reward_formatted: f64,
}

/// How a NEPTU payment is partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BurnCalculation {
    pub reading_type: ReadingType,
    pub total_raw: u64,
    pub burn_raw: u64,
    pub treasury_raw: u64,
    pub burn_formatted: f64,
    pub treasury_formatted: f64,
}

/// What a SUDIGITAL payment costs and earns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThirdPartyPaymentCalculation {
    pub reading_type: ReadingType,
    /// Price in raw SUDIGITAL units.
    pub amount_raw: u64,
    pub amount_formatted: f64,
    /// NEPTU reward in raw units.
    pub token_reward_raw: u64,
    pub token_reward_formatted: f64,
}

pub fn calculate_coin_payment_reward(reading_type: ReadingType) -> RewardCalculation {
    let entry = pricing_entry(reading_type);
    RewardCalculation {
        reading_type,
        coin_amount_raw: to_raw_coin(entry.coin_price),
        token_reward_raw: to_raw_token(entry.token_reward_on_coin_pay),
        token_reward_formatted: entry.token_reward_on_coin_pay,
    }
}

pub fn calculate_token_payment_burn(reading_type: ReadingType) -> BurnCalculation {
    let total_raw = to_raw_token(pricing_entry(reading_type).token_price);
    let (burn_raw, treasury_raw) = split_burn(total_raw);
    BurnCalculation {
        reading_type,
        total_raw,
        burn_raw,
        treasury_raw,
        burn_formatted: from_raw_token(burn_raw),
        treasury_formatted: from_raw_token(treasury_raw),
    }
}

pub fn calculate_third_party_payment(reading_type: ReadingType) -> ThirdPartyPaymentCalculation {
    let entry = pricing_entry(reading_type);
    let amount_raw = to_raw(entry.third_party_token_price, SUDIGITAL_DECIMALS);
    ThirdPartyPaymentCalculation {
        reading_type,
        amount_raw,
        amount_formatted: from_raw(amount_raw, SUDIGITAL_DECIMALS),
        token_reward_raw: to_raw_token(entry.token_reward_on_third_party_pay),
        token_reward_formatted: entry.token_reward_on_third_party_pay,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
