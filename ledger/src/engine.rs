//! Wallet ledger: deposit, withdraw and exchange under row locks.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use walletd_common::{AccountId, AccountWallets, Currency, RateTable, Result, WalletError};
use walletd_fx::RateResolver;

use crate::store::{to_wallets, StoreTransaction, TransactionalStore};

/// Direction of a balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Deposit,
    Withdraw,
}

/// Result of a successful exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOutcome {
    /// Currency withdrawn.
    pub from: Currency,
    /// Currency deposited.
    pub to: Currency,
    /// Amount withdrawn from `from`.
    pub amount: Decimal,
    /// Rate applied, `rate(to) / rate(from)`.
    pub rate: Decimal,
    /// Amount deposited into `to`: `amount * rate`.
    pub exchanged: Decimal,
    /// Balances of the account after commit.
    pub balances: AccountWallets,
}

/// Performs balance mutations against a [`TransactionalStore`], validating
/// currencies and resolving rates through a [`RateResolver`].
///
/// Every mutation runs in a single store transaction. Any failure rolls the
/// whole transaction back, so an exchange never leaves one leg applied.
pub struct WalletLedger<S: TransactionalStore> {
    store: S,
    resolver: Arc<RateResolver>,
}

impl<S: TransactionalStore> WalletLedger<S> {
    /// Create a new ledger.
    pub fn new(store: S, resolver: Arc<RateResolver>) -> Self {
        Self { store, resolver }
    }

    /// Add `amount` of `currency` to the account, creating the wallet on
    /// first use. Returns the balances after commit.
    #[instrument(skip(self), fields(account = %account, currency = %currency, amount = %amount))]
    pub async fn deposit(
        &self,
        account: &AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> Result<AccountWallets> {
        let mut tx = self.store.begin().await?;
        let applied = self
            .apply(&mut tx, account, currency, amount, Direction::Deposit)
            .await;
        let new_balance = self.finish(tx, applied).await?;

        info!(new_balance = %new_balance, "Deposit committed");
        self.balances(account).await
    }

    /// Take `amount` of `currency` from the account. Returns the balances
    /// after commit.
    #[instrument(skip(self), fields(account = %account, currency = %currency, amount = %amount))]
    pub async fn withdraw(
        &self,
        account: &AccountId,
        currency: &Currency,
        amount: Decimal,
    ) -> Result<AccountWallets> {
        let mut tx = self.store.begin().await?;
        let applied = self
            .apply(&mut tx, account, currency, amount, Direction::Withdraw)
            .await;
        let new_balance = self.finish(tx, applied).await?;

        info!(new_balance = %new_balance, "Withdrawal committed");
        self.balances(account).await
    }

    /// Convert `amount` of `from` into `to` at the current rate.
    ///
    /// Both legs run in one transaction: the withdrawal from `from` first,
    /// then the deposit of `amount * rate` into `to`.
    #[instrument(skip(self), fields(account = %account, from = %from, to = %to, amount = %amount))]
    pub async fn exchange(
        &self,
        account: &AccountId,
        from: &Currency,
        to: &Currency,
        amount: Decimal,
    ) -> Result<ExchangeOutcome> {
        let mut tx = self.store.begin().await?;
        let applied = self.exchange_legs(&mut tx, account, from, to, amount).await;
        let (rate, exchanged) = self.finish(tx, applied).await?;

        info!(rate = %rate, exchanged = %exchanged, "Exchange committed");

        Ok(ExchangeOutcome {
            from: from.clone(),
            to: to.clone(),
            amount,
            rate,
            exchanged,
            balances: self.balances(account).await?,
        })
    }

    /// Committed balances of every currency the account holds. An account
    /// without wallets yields an empty map.
    pub async fn balances(&self, account: &AccountId) -> Result<AccountWallets> {
        let rows = self.store.get_all(account).await?;
        Ok(to_wallets(rows))
    }

    /// The current rate table.
    pub async fn rates(&self) -> Result<Arc<RateTable>> {
        Ok(self.resolver.get_rates().await?)
    }

    async fn exchange_legs(
        &self,
        tx: &mut S::Tx,
        account: &AccountId,
        from: &Currency,
        to: &Currency,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal)> {
        let rate = self.resolver.get_rate(from, to).await?;
        let exchanged = amount.checked_mul(rate).ok_or_else(|| {
            WalletError::AmountOverflow(format!("{amount} {from} at rate {rate}"))
        })?;

        self.apply(tx, account, from, amount, Direction::Withdraw)
            .await?;
        self.apply(tx, account, to, exchanged, Direction::Deposit)
            .await?;

        Ok((rate, exchanged))
    }

    /// Validate and apply one balance mutation inside `tx`, returning the
    /// new balance.
    async fn apply(
        &self,
        tx: &mut S::Tx,
        account: &AccountId,
        currency: &Currency,
        amount: Decimal,
        direction: Direction,
    ) -> Result<Decimal> {
        if !self.resolver.is_exist_currency(currency).await? {
            return Err(WalletError::NonExistentCurrency(currency.clone()));
        }

        if !tx.is_exist_currency(account, currency).await? {
            debug!(currency = %currency, "Creating wallet");
            tx.create(account, currency).await?;
        }

        let balance = tx.get_for_update(account, currency).await?.ok_or_else(|| {
            WalletError::store(format!("wallet {account}/{currency} missing after create"))
        })?;

        if amount.is_zero() {
            return Err(WalletError::ZeroAmount);
        }
        if amount < Decimal::ZERO {
            return Err(WalletError::NegativeAmount);
        }

        let new_balance = match direction {
            Direction::Deposit => balance.checked_add(amount).ok_or_else(|| {
                WalletError::AmountOverflow(format!("{currency} balance {balance} + {amount}"))
            })?,
            Direction::Withdraw => {
                if balance < amount {
                    return Err(WalletError::InsufficientBalance {
                        required: amount,
                        available: balance,
                    });
                }
                balance - amount
            }
        };

        tx.update(account, currency, new_balance).await?;
        Ok(new_balance)
    }

    /// Commit on success; otherwise roll back and return the original error.
    async fn finish<T>(&self, tx: S::Tx, applied: Result<T>) -> Result<T> {
        match applied {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                match &err {
                    WalletError::StoreFailure(_) => error!(error = %err, "Store failure"),
                    e if e.is_validation() => debug!(code = e.error_code(), "Rejected"),
                    e => warn!(error = %e, "Operation failed"),
                }
                Err(err)
            }
        }
    }
}
