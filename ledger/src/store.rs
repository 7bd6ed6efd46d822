//! Transactional store capabilities consumed by the ledger.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use walletd_common::{AccountId, AccountWallets, Currency, Result};

/// Committed balance of one currency held by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    /// Currency of the wallet.
    pub currency: Currency,
    /// Current balance, never negative.
    pub balance: Decimal,
}

/// Assemble a balance snapshot from store rows.
pub fn to_wallets(rows: Vec<WalletBalance>) -> AccountWallets {
    rows.into_iter().map(|row| (row.currency, row.balance)).collect()
}

/// Store of per-(account, currency) balance rows with row-locking
/// transactions.
#[async_trait]
pub trait TransactionalStore: Send + Sync + 'static {
    /// Transaction handle produced by [`TransactionalStore::begin`].
    type Tx: StoreTransaction;

    /// Open a transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Committed balances of every currency the account holds, in currency
    /// order. An unknown account has no rows.
    async fn get_all(&self, account: &AccountId) -> Result<Vec<WalletBalance>>;
}

/// One open transaction.
///
/// Dropping a transaction without committing rolls it back and releases
/// every row lock it holds.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Whether a row exists for `(account, currency)`, as seen by this
    /// transaction.
    async fn is_exist_currency(&mut self, account: &AccountId, currency: &Currency) -> Result<bool>;

    /// Create a zero-balance row. Creating an existing row is a no-op.
    async fn create(&mut self, account: &AccountId, currency: &Currency) -> Result<()>;

    /// Lock the row exclusively until the transaction ends and read its
    /// balance. `None` when the row does not exist.
    async fn get_for_update(
        &mut self,
        account: &AccountId,
        currency: &Currency,
    ) -> Result<Option<Decimal>>;

    /// Write a new balance to a row locked by this transaction.
    async fn update(&mut self, account: &AccountId, currency: &Currency, balance: Decimal)
        -> Result<()>;

    /// Make every change of this transaction durable and visible.
    async fn commit(self) -> Result<()>;

    /// Discard every change of this transaction.
    async fn rollback(self) -> Result<()>;
}
