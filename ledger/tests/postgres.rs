//! Ledger tests against a live Postgres.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -p walletd-ledger -- --ignored`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;

use walletd_common::{AccountId, Currency, WalletError};
use walletd_fx::{FixedRateSource, RateResolver, ResolverConfig};
use walletd_ledger::{PgStore, StoreTransaction, TransactionalStore, WalletLedger};

async fn pg_store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(&url)
        .await
        .unwrap();
    let store = PgStore::new(pool);
    store.migrate().await.unwrap();
    Some(store)
}

/// Fresh account per test run so reruns never see old rows.
fn account(tag: &str) -> AccountId {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    AccountId::new(format!("{tag}-{nanos}@pg.walletd"))
}

async fn cleanup(store: &PgStore, account: &AccountId) {
    sqlx::query("DELETE FROM wallets WHERE email = $1")
        .bind(account.as_str())
        .execute(store.pool())
        .await
        .unwrap();
}

async fn ledger(store: PgStore) -> WalletLedger<PgStore> {
    let source = Arc::new(FixedRateSource::new([
        ("USD", dec!(1)),
        ("EUR", dec!(0.92)),
        ("RUB", dec!(92.5)),
    ]));
    let config = ResolverConfig {
        retry_interval: Duration::from_millis(5),
        ..Default::default()
    };
    let resolver = RateResolver::new(source, config).await.unwrap();
    WalletLedger::new(store, Arc::new(resolver))
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_deposit_withdraw_round_trip() {
    let Some(store) = pg_store().await else { return };
    let bob = account("round-trip");
    let ledger = ledger(store.clone()).await;

    ledger.deposit(&bob, &Currency::usd(), dec!(40.25)).await.unwrap();
    ledger.deposit(&bob, &Currency::usd(), dec!(9.75)).await.unwrap();
    let balances = ledger.withdraw(&bob, &Currency::usd(), dec!(9.75)).await.unwrap();
    assert_eq!(balances.get(&Currency::usd()), Some(&dec!(40.25)));

    let err = ledger.withdraw(&bob, &Currency::eur(), dec!(1)).await.unwrap_err();
    assert!(matches!(err, WalletError::InsufficientBalance { .. }));
    assert!(!ledger.balances(&bob).await.unwrap().contains_key(&Currency::eur()));

    let outcome = ledger
        .exchange(&bob, &Currency::usd(), &Currency::eur(), dec!(10))
        .await
        .unwrap();
    assert_eq!(outcome.exchanged, dec!(9.2));
    assert_eq!(outcome.balances.get(&Currency::usd()), Some(&dec!(30.25)));

    cleanup(&store, &bob).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_concurrent_deposits_lose_no_updates() {
    let Some(store) = pg_store().await else { return };
    let bob = account("concurrent");
    let ledger = Arc::new(ledger(store.clone()).await);

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let ledger = ledger.clone();
            let bob = bob.clone();
            tokio::spawn(async move { ledger.deposit(&bob, &Currency::rub(), dec!(1.5)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let balances = ledger.balances(&bob).await.unwrap();
    assert_eq!(balances.get(&Currency::rub()), Some(&dec!(30)));

    cleanup(&store, &bob).await;
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_pg_transaction_semantics() {
    let Some(store) = pg_store().await else { return };
    let bob = account("semantics");
    let usd = Currency::usd();

    // Dropped without commit: nothing persists.
    {
        let mut tx = store.begin().await.unwrap();
        tx.create(&bob, &usd).await.unwrap();
        tx.update(&bob, &usd, dec!(5)).await.unwrap();
    }
    assert!(store.get_all(&bob).await.unwrap().is_empty());

    // Creating an existing row is a no-op.
    let mut tx = store.begin().await.unwrap();
    tx.create(&bob, &usd).await.unwrap();
    tx.create(&bob, &usd).await.unwrap();
    assert!(tx.is_exist_currency(&bob, &usd).await.unwrap());
    assert_eq!(tx.get_for_update(&bob, &usd).await.unwrap(), Some(dec!(0)));
    tx.update(&bob, &usd, dec!(7)).await.unwrap();
    tx.commit().await.unwrap();

    // The CHECK constraint rejects negative balances.
    let mut tx = store.begin().await.unwrap();
    tx.get_for_update(&bob, &usd).await.unwrap();
    let err = tx.update(&bob, &usd, dec!(-1)).await.unwrap_err();
    assert_eq!(err.error_code(), "STORE_FAILURE");
    tx.rollback().await.unwrap();

    let rows = store.get_all(&bob).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].balance, dec!(7));

    cleanup(&store, &bob).await;
}
