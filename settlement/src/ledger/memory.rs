//! In-process ledger.
//!
//! [`MemoryLedger`] answers every [`LedgerTransport`] call from maps filled
//! in by the caller, and lets lifetime answers be scripted step by step
//! (including calls that never return) so that retry and timeout paths can
//! be driven under a paused tokio clock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    AccountData, FinalizedTransaction, LedgerTransport, LifetimeSource, Signature,
    SignatureStatus, TokenAccount, TransactionLifetime,
};
use crate::address::Address;
use crate::error::TransportError;

/// What a single `latest_lifetime` call does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifetimeStep {
    Ok(TransactionLifetime),
    Fail(TransportError),
    /// Never completes; only a timeout gets the caller out.
    Hang,
}

#[derive(Debug)]
struct LifetimeScript {
    queued: VecDeque<LifetimeStep>,
    /// Used once the queue is drained.
    idle: LifetimeStep,
}

#[derive(Debug, Default)]
struct Store {
    transactions: HashMap<Signature, FinalizedTransaction>,
    /// Successive answers; the last one repeats.
    statuses: HashMap<Signature, VecDeque<SignatureStatus>>,
    accounts: HashMap<Address, AccountData>,
    balances: HashMap<Address, u64>,
    token_accounts: HashMap<(Address, Address), Vec<TokenAccount>>,
    read_failure: Option<TransportError>,
}

/// A scripted ledger.
#[derive(Debug)]
pub struct MemoryLedger {
    label: String,
    lifetime: Mutex<LifetimeScript>,
    store: Mutex<Store>,
    lifetime_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            label: "memory".to_string(),
            lifetime: Mutex::new(LifetimeScript {
                queued: VecDeque::new(),
                idle: LifetimeStep::Fail(TransportError::Http("no lifetime scripted".into())),
            }),
            store: Mutex::new(Store::default()),
            lifetime_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Answer every unscripted lifetime call with `lifetime`.
    pub fn with_lifetime(self, lifetime: TransactionLifetime) -> Self {
        self.with_idle_lifetime(LifetimeStep::Ok(lifetime))
    }

    pub fn with_idle_lifetime(self, step: LifetimeStep) -> Self {
        self.lifetime.lock().idle = step;
        self
    }

    /// Queue steps consumed one per call before the idle step applies.
    pub fn script_lifetime(&self, steps: impl IntoIterator<Item = LifetimeStep>) {
        self.lifetime.lock().queued.extend(steps);
    }

    pub fn lifetime_calls(&self) -> usize {
        self.lifetime_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn insert_transaction(&self, signature: Signature, transaction: FinalizedTransaction) {
        self.store.lock().transactions.insert(signature, transaction);
    }

    /// Queue a status answer for `signature`. Answers are returned in
    /// order and the last one keeps being returned.
    pub fn push_status(&self, signature: Signature, status: SignatureStatus) {
        self.store
            .lock()
            .statuses
            .entry(signature)
            .or_default()
            .push_back(status);
    }

    pub fn insert_account(&self, address: Address, account: AccountData) {
        self.store.lock().accounts.insert(address, account);
    }

    pub fn set_balance(&self, address: Address, lamports: u64) {
        self.store.lock().balances.insert(address, lamports);
    }

    pub fn insert_token_account(&self, owner: Address, mint: Address, account: TokenAccount) {
        self.store
            .lock()
            .token_accounts
            .entry((owner, mint))
            .or_default()
            .push(account);
    }

    /// Make every read other than the lifetime fail with `error`, or clear
    /// the failure with `None`.
    pub fn fail_reads(&self, error: Option<TransportError>) {
        self.store.lock().read_failure = error;
    }

    fn read<T>(&self, f: impl FnOnce(&mut Store) -> T) -> Result<T, TransportError> {
        let mut store = self.store.lock();
        if let Some(err) = store.read_failure.clone() {
            return Err(err);
        }
        Ok(f(&mut store))
    }
}

#[async_trait]
impl LifetimeSource for MemoryLedger {
    async fn latest_lifetime(&self) -> Result<TransactionLifetime, TransportError> {
        self.lifetime_calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.lifetime.lock();
            match script.queued.pop_front() {
                Some(step) => step,
                None => script.idle.clone(),
            }
        };
        match step {
            LifetimeStep::Ok(lifetime) => Ok(lifetime),
            LifetimeStep::Fail(err) => Err(err),
            LifetimeStep::Hang => std::future::pending().await,
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

#[async_trait]
impl LedgerTransport for MemoryLedger {
    async fn transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<FinalizedTransaction>, TransportError> {
        self.read(|store| store.transactions.get(signature).cloned())
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, TransportError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.read(|store| {
            let queue = store.statuses.get_mut(signature)?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        })
    }

    async fn account(&self, address: &Address) -> Result<Option<AccountData>, TransportError> {
        self.read(|store| store.accounts.get(address).cloned())
    }

    async fn balance(&self, address: &Address) -> Result<u64, TransportError> {
        self.read(|store| store.balances.get(address).copied().unwrap_or_default())
    }

    async fn token_accounts(
        &self,
        owner: &Address,
        mint: &Address,
    ) -> Result<Vec<TokenAccount>, TransportError> {
        self.read(|store| {
            store
                .token_accounts
                .get(&(*owner, *mint))
                .cloned()
                .unwrap_or_default()
        })
    }
}
