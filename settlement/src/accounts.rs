//! On-chain state decoders and balance lookups.
//!
//! Anchor accounts are stored as an 8-byte discriminator followed by the
//! Borsh encoding of the account struct. We only read them; the economy
//! program owns every write.
//!
//! Lookups return `Ok(None)` when the account does not exist and `Err` when
//! the ledger could not be asked. An empty wallet and an unreachable node
//! are different answers.

use serde::Serialize;
use tracing::debug;

use crate::address::Address;
use crate::error::{SettlementError, SettlementResult};
use crate::ledger::LedgerTransport;
use crate::pricing::{price_of, PaymentMethod, ReadingType};
use crate::program::ProgramContext;
use crate::units::{from_raw, to_raw_coin, to_raw_token};

/// `sha256("account:PricingConfig")[..8]`
pub const PRICING_CONFIG_DISCRIMINATOR: [u8; 8] = [126, 131, 53, 131, 89, 154, 123, 85];

/// `sha256("account:EconomyState")[..8]`
pub const ECONOMY_STATE_DISCRIMINATOR: [u8; 8] = [49, 66, 19, 7, 163, 237, 109, 109];

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Cursor over Anchor account bytes.
pub(crate) struct AccountReader<'a> {
    data: &'a [u8],
    offset: usize,
    what: &'static str,
}

impl<'a> AccountReader<'a> {
    /// Checks length and discriminator and positions after the latter.
    /// Accounts may carry trailing space, so only a minimum is enforced.
    pub(crate) fn open(
        data: &'a [u8],
        discriminator: &[u8; 8],
        body_len: usize,
        what: &'static str,
    ) -> SettlementResult<Self> {
        let needed = discriminator.len() + body_len;
        if data.len() < needed {
            return Err(SettlementError::invalid_input(
                what,
                format!("expected at least {needed} bytes, got {}", data.len()),
            ));
        }
        if &data[..8] != discriminator {
            return Err(SettlementError::invalid_input(
                what,
                format!("discriminator mismatch: {}", hex::encode(&data[..8])),
            ));
        }
        Ok(Self {
            data,
            offset: 8,
            what,
        })
    }

    fn take<const N: usize>(&mut self) -> SettlementResult<[u8; N]> {
        let end = self.offset + N;
        let bytes: [u8; N] = self
            .data
            .get(self.offset..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| SettlementError::invalid_input(self.what, "truncated account data"))?;
        self.offset = end;
        Ok(bytes)
    }

    pub(crate) fn address(&mut self) -> SettlementResult<Address> {
        Ok(Address::new_from_array(self.take::<32>()?))
    }

    pub(crate) fn u64(&mut self) -> SettlementResult<u64> {
        Ok(u64::from_le_bytes(self.take::<8>()?))
    }
}

// ---------------------------------------------------------------------------
// PricingConfig
// ---------------------------------------------------------------------------

/// The economy program's price list, in raw units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingConfigAccount {
    pub authority: Address,
    /// Lamports, indexed by [`ReadingType::index`].
    pub coin_prices: [u64; 4],
    /// Raw NEPTU, indexed by [`ReadingType::index`].
    pub token_prices: [u64; 4],
}

impl PricingConfigAccount {
    pub const BODY_LEN: usize = 32 + 8 * 8;

    pub fn decode(data: &[u8]) -> SettlementResult<Self> {
        let mut reader =
            AccountReader::open(data, &PRICING_CONFIG_DISCRIMINATOR, Self::BODY_LEN, "pricing config")?;
        let authority = reader.address()?;
        let mut coin_prices = [0u64; 4];
        for price in &mut coin_prices {
            *price = reader.u64()?;
        }
        let mut token_prices = [0u64; 4];
        for price in &mut token_prices {
            *price = reader.u64()?;
        }
        Ok(Self {
            authority,
            coin_prices,
            token_prices,
        })
    }

    pub fn coin_price(&self, reading_type: ReadingType) -> u64 {
        self.coin_prices[usize::from(reading_type.index())]
    }

    pub fn token_price(&self, reading_type: ReadingType) -> u64 {
        self.token_prices[usize::from(reading_type.index())]
    }

    /// Reading types whose on-chain price differs from the local table.
    pub fn drift(&self) -> Vec<ReadingType> {
        ReadingType::ALL
            .into_iter()
            .filter(|rt| {
                self.coin_price(*rt) != to_raw_coin(price_of(*rt, PaymentMethod::Coin))
                    || self.token_price(*rt) != to_raw_token(price_of(*rt, PaymentMethod::Token))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// EconomyState
// ---------------------------------------------------------------------------

/// Global economy counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EconomyStateAccount {
    pub authority: Address,
    pub neptu_mint: Address,
    pub treasury: Address,
    pub ecosystem_pool: Address,
    pub total_coin_collected: u64,
    pub total_token_burned: u64,
    pub total_token_rewarded: u64,
}

impl EconomyStateAccount {
    pub const BODY_LEN: usize = 4 * 32 + 3 * 8;

    pub fn decode(data: &[u8]) -> SettlementResult<Self> {
        let mut reader =
            AccountReader::open(data, &ECONOMY_STATE_DISCRIMINATOR, Self::BODY_LEN, "economy state")?;
        Ok(Self {
            authority: reader.address()?,
            neptu_mint: reader.address()?,
            treasury: reader.address()?,
            ecosystem_pool: reader.address()?,
            total_coin_collected: reader.u64()?,
            total_token_burned: reader.u64()?,
            total_token_rewarded: reader.u64()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Loads an account owned by `owner_program`. A foreign owner means the
/// address is not the account we think it is.
pub(crate) async fn fetch_owned<T>(
    transport: &T,
    address: &Address,
    owner_program: &Address,
    what: &'static str,
) -> SettlementResult<Option<Vec<u8>>>
where
    T: LedgerTransport + ?Sized,
{
    let Some(account) = transport.account(address).await? else {
        debug!(%address, what, "account does not exist");
        return Ok(None);
    };
    if account.owner != *owner_program {
        return Err(SettlementError::invalid_input(
            what,
            format!("{address} is owned by {}, not {owner_program}", account.owner),
        ));
    }
    Ok(Some(account.data))
}

pub async fn fetch_pricing_config<T>(
    transport: &T,
    ctx: &ProgramContext,
) -> SettlementResult<Option<PricingConfigAccount>>
where
    T: LedgerTransport + ?Sized,
{
    fetch_owned(
        transport,
        &ctx.pricing_config.address,
        &ctx.economy_program,
        "pricing config",
    )
    .await?
    .map(|data| PricingConfigAccount::decode(&data))
    .transpose()
}

pub async fn fetch_economy_state<T>(
    transport: &T,
    ctx: &ProgramContext,
) -> SettlementResult<Option<EconomyStateAccount>>
where
    T: LedgerTransport + ?Sized,
{
    fetch_owned(
        transport,
        &ctx.economy_state.address,
        &ctx.economy_program,
        "economy state",
    )
    .await?
    .map(|data| EconomyStateAccount::decode(&data))
    .transpose()
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// Balance of one token account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub account: Address,
    pub amount_raw: u64,
    pub decimals: u8,
    pub amount: f64,
}

/// Balance of the first token account `owner` holds for `mint`, or `None`
/// if there is no such account.
pub async fn token_balance<T>(
    transport: &T,
    owner: &Address,
    mint: &Address,
) -> SettlementResult<Option<TokenBalance>>
where
    T: LedgerTransport + ?Sized,
{
    let accounts = transport.token_accounts(owner, mint).await?;
    Ok(accounts.into_iter().next().map(|account| TokenBalance {
        account: account.address,
        amount_raw: account.amount_raw,
        decimals: account.decimals,
        amount: from_raw(account.amount_raw, account.decimals),
    }))
}

/// Address of the first token account `owner` holds for `mint`.
pub async fn find_token_account<T>(
    transport: &T,
    owner: &Address,
    mint: &Address,
) -> SettlementResult<Option<Address>>
where
    T: LedgerTransport + ?Sized,
{
    let accounts = transport.token_accounts(owner, mint).await?;
    Ok(accounts.first().map(|account| account.address))
}

/// Lamport balance of `owner`.
pub async fn coin_balance<T>(transport: &T, owner: &Address) -> SettlementResult<u64>
where
    T: LedgerTransport + ?Sized,
{
    Ok(transport.balance(owner).await?)
}
