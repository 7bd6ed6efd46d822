//! Postgres-backed transactional store.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{error, info};
use walletd_common::{AccountId, Currency, Result, WalletError};

use crate::store::{StoreTransaction, TransactionalStore, WalletBalance};

const CREATE_WALLETS: &str = r#"
CREATE TABLE IF NOT EXISTS wallets (
    email      TEXT        NOT NULL,
    currency   TEXT        NOT NULL,
    balance    NUMERIC     NOT NULL DEFAULT 0 CHECK (balance >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (email, currency)
)
"#;

fn db_error(err: sqlx::Error) -> WalletError {
    error!(error = %err, "Database error");
    WalletError::store(err)
}

/// [`TransactionalStore`] over a Postgres pool. Row locks are
/// `SELECT ... FOR UPDATE`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `wallets` table when missing.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(CREATE_WALLETS)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        info!("Wallet schema ready");
        Ok(())
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionalStore for PgStore {
    type Tx = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(PgTransaction { tx })
    }

    async fn get_all(&self, account: &AccountId) -> Result<Vec<WalletBalance>> {
        let rows: Vec<(String, Decimal)> = sqlx::query_as(
            "SELECT currency, balance FROM wallets WHERE email = $1 ORDER BY currency",
        )
        .bind(account.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|(currency, balance)| WalletBalance {
                currency: Currency::new(currency),
                balance,
            })
            .collect())
    }
}

/// Open Postgres transaction. Dropping it uncommitted rolls it back.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn is_exist_currency(&mut self, account: &AccountId, currency: &Currency) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM wallets WHERE email = $1 AND currency = $2)",
        )
        .bind(account.as_str())
        .bind(currency.code())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn create(&mut self, account: &AccountId, currency: &Currency) -> Result<()> {
        sqlx::query(
            "INSERT INTO wallets (email, currency, balance) VALUES ($1, $2, 0) \
             ON CONFLICT (email, currency) DO NOTHING",
        )
        .bind(account.as_str())
        .bind(currency.code())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_for_update(
        &mut self,
        account: &AccountId,
        currency: &Currency,
    ) -> Result<Option<Decimal>> {
        sqlx::query_scalar(
            "SELECT balance FROM wallets WHERE email = $1 AND currency = $2 FOR UPDATE",
        )
        .bind(account.as_str())
        .bind(currency.code())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)
    }

    async fn update(
        &mut self,
        account: &AccountId,
        currency: &Currency,
        balance: Decimal,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE wallets SET balance = $3, updated_at = now() \
             WHERE email = $1 AND currency = $2",
        )
        .bind(account.as_str())
        .bind(currency.code())
        .bind(balance)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(WalletError::store(format!("row {account}/{currency} not found")));
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(db_error)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(db_error)
    }
}
