//! In-memory transactional store.
//!
//! Committed rows live in one shared map. Each `(account, currency)` row
//! has its own async mutex acting as the row lock: `get_for_update` takes
//! it and the transaction keeps it until commit, rollback, or drop. Rows a
//! transaction creates or writes stay private to it until commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use walletd_common::{AccountId, Currency, Result, WalletError};

use crate::store::{StoreTransaction, TransactionalStore, WalletBalance};

type RowKey = (AccountId, Currency);

#[derive(Default)]
struct Shared {
    rows: RwLock<HashMap<RowKey, Decimal>>,
    locks: DashMap<RowKey, Arc<Mutex<()>>>,
}

/// Default bound on waiting for a row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// In-memory [`TransactionalStore`] with row-level locking.
///
/// A transaction waiting longer than the lock timeout for a row fails with
/// a store failure, which breaks lock cycles such as two opposite
/// exchanges on the same account.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            shared: Arc::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how long a transaction may wait for a row lock.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Number of committed rows across all accounts.
    pub fn row_count(&self) -> usize {
        self.shared.rows.read().len()
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        Ok(MemoryTransaction {
            shared: self.shared.clone(),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            writes: HashMap::new(),
            created: HashSet::new(),
        })
    }

    async fn get_all(&self, account: &AccountId) -> Result<Vec<WalletBalance>> {
        let mut balances: Vec<WalletBalance> = self
            .shared
            .rows
            .read()
            .iter()
            .filter(|((owner, _), _)| owner == account)
            .map(|((_, currency), balance)| WalletBalance {
                currency: currency.clone(),
                balance: *balance,
            })
            .collect();
        balances.sort_by(|a, b| a.currency.cmp(&b.currency));
        Ok(balances)
    }
}

/// Open transaction against a [`MemoryStore`].
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    lock_timeout: Duration,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
    writes: HashMap<RowKey, Decimal>,
    created: HashSet<RowKey>,
}

impl MemoryTransaction {
    fn key(account: &AccountId, currency: &Currency) -> RowKey {
        (account.clone(), currency.clone())
    }

    /// Balance as seen by this transaction: own writes, then committed
    /// rows, then rows it created.
    fn visible(&self, key: &RowKey) -> Option<Decimal> {
        if let Some(balance) = self.writes.get(key) {
            return Some(*balance);
        }
        if let Some(balance) = self.shared.rows.read().get(key) {
            return Some(*balance);
        }
        self.created.contains(key).then_some(Decimal::ZERO)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn is_exist_currency(&mut self, account: &AccountId, currency: &Currency) -> Result<bool> {
        Ok(self.visible(&Self::key(account, currency)).is_some())
    }

    async fn create(&mut self, account: &AccountId, currency: &Currency) -> Result<()> {
        let key = Self::key(account, currency);
        if self.visible(&key).is_none() {
            self.created.insert(key);
        }
        Ok(())
    }

    async fn get_for_update(
        &mut self,
        account: &AccountId,
        currency: &Currency,
    ) -> Result<Option<Decimal>> {
        let key = Self::key(account, currency);

        if !self.held.contains_key(&key) {
            let lock = self.shared.locks.entry(key.clone()).or_default().clone();
            let guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    WalletError::store(format!(
                        "lock wait on {account}/{currency} exceeded {:?}",
                        self.lock_timeout
                    ))
                })?;
            debug!(account = %account, currency = %currency, "Row locked");
            self.held.insert(key.clone(), guard);
        }

        Ok(self.visible(&key))
    }

    async fn update(
        &mut self,
        account: &AccountId,
        currency: &Currency,
        balance: Decimal,
    ) -> Result<()> {
        let key = Self::key(account, currency);

        if !self.held.contains_key(&key) {
            return Err(WalletError::store(format!(
                "row {account}/{currency} updated without being locked"
            )));
        }
        if self.visible(&key).is_none() {
            return Err(WalletError::store(format!("row {account}/{currency} not found")));
        }
        if balance < Decimal::ZERO {
            return Err(WalletError::store(format!(
                "row {account}/{currency} balance would become negative"
            )));
        }

        self.writes.insert(key, balance);
        Ok(())
    }

    async fn commit(mut self) -> Result<()> {
        {
            let mut rows = self.shared.rows.write();
            for key in self.created.drain() {
                rows.entry(key).or_insert(Decimal::ZERO);
            }
            for (key, balance) in self.writes.drain() {
                rows.insert(key, balance);
            }
        }
        // Row locks are released when `self.held` drops.
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
