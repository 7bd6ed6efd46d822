//! Simulation controller.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use walletd_common::{AccountId, AccountWallets, Currency, WalletError};
use walletd_fx::{FixedRateSource, RateResolver, ResolverConfig};
use walletd_ledger::{MemoryStore, WalletLedger};

use crate::metrics::SimulationMetrics;
use crate::scenario::{Operation, Scenario};

type Expected = HashMap<AccountId, AccountWallets>;

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub accounts: usize,
    pub workers: usize,
    pub operations: u64,
    pub seed: Option<u64>,
    pub resolver: ResolverConfig,
    /// Row lock wait bound; breaks cycles between opposite exchanges.
    pub lock_timeout: Duration,
}

/// Outcome of comparing ledger balances with the sum of committed deltas.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub accounts_checked: usize,
    pub wallets_checked: usize,
    pub mismatches: Vec<String>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub scenario: crate::scenario::ScenarioKind,
    pub seed: u64,
    pub elapsed_ms: u128,
    pub metrics: SimulationMetrics,
    pub rate_fetches: u64,
    pub reconciliation: Reconciliation,
}

/// Controls the simulation.
pub struct SimulationController {
    config: SimulationConfig,
    scenario: Scenario,
    accounts: Vec<AccountId>,
    source: Arc<FixedRateSource>,
    metrics: Arc<RwLock<SimulationMetrics>>,
    expected: Arc<RwLock<Expected>>,
    completed: Arc<AtomicU64>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(config: SimulationConfig, scenario: Scenario) -> Self {
        let accounts = (0..config.accounts.max(1))
            .map(|i| AccountId::new(format!("user{i}@sim.walletd")))
            .collect();
        let source = Arc::new(FixedRateSource::new(scenario.rates.clone()));

        Self {
            config,
            scenario,
            accounts,
            source,
            metrics: Arc::new(RwLock::new(SimulationMetrics::new())),
            expected: Arc::new(RwLock::new(HashMap::new())),
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Run the scenario to completion and reconcile balances.
    pub async fn run(&self) -> anyhow::Result<SimulationReport> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        info!(
            scenario = ?self.scenario.kind,
            description = self.scenario.description,
            accounts = self.accounts.len(),
            workers = self.config.workers,
            operations = self.config.operations,
            seed,
            "Starting simulation"
        );

        let resolver =
            RateResolver::new(self.source.clone(), self.config.resolver.clone()).await?;
        let store = MemoryStore::new().with_lock_timeout(self.config.lock_timeout);
        let ledger = Arc::new(WalletLedger::new(store, Arc::new(resolver)));

        self.fund_accounts(&ledger).await?;

        let start = Instant::now();
        let rollout = self.spawn_rollout();

        let workers = self.config.workers.max(1) as u64;
        let per_worker = self.config.operations / workers;
        let remainder = self.config.operations % workers;

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let count = per_worker + u64::from(worker < remainder);
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(worker));
                let ledger = ledger.clone();
                let scenario = self.scenario.clone();
                let accounts = self.accounts.clone();
                let metrics = self.metrics.clone();
                let expected = self.expected.clone();
                let completed = self.completed.clone();

                tokio::spawn(async move {
                    for _ in 0..count {
                        let op = scenario.next_operation(&mut rng, &accounts);
                        execute(&ledger, op, &metrics, &expected).await;
                        completed.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        futures::future::try_join_all(handles).await?;
        let elapsed = start.elapsed();

        if let Some(rollout) = rollout {
            rollout.abort();
        }

        let reconciliation = self.reconcile(&ledger).await?;
        let metrics = self.metrics.read().await.clone();

        Ok(SimulationReport {
            scenario: self.scenario.kind,
            seed,
            elapsed_ms: elapsed.as_millis(),
            rate_fetches: self.source.fetch_count(),
            metrics,
            reconciliation,
        })
    }

    /// Give every account an opening balance in each listed currency.
    async fn fund_accounts(&self, ledger: &WalletLedger<MemoryStore>) -> anyhow::Result<()> {
        let opening = Decimal::from(1_000);
        let mut expected = self.expected.write().await;

        for account in &self.accounts {
            for (currency, _) in &self.scenario.rates {
                ledger.deposit(account, currency, opening).await?;
                credit(&mut expected, account, currency, opening);
            }
        }

        debug!(accounts = self.accounts.len(), "Accounts funded");
        Ok(())
    }

    /// List the rollout currency once enough operations have completed.
    fn spawn_rollout(&self) -> Option<tokio::task::JoinHandle<()>> {
        let rollout = self.scenario.rollout.clone()?;
        let source = self.source.clone();
        let completed = self.completed.clone();

        Some(tokio::spawn(async move {
            while completed.load(Ordering::SeqCst) < rollout.after_operations {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            source.set_rate(rollout.currency.clone(), rollout.rate);
            info!(currency = %rollout.currency, rate = %rollout.rate, "Currency listed upstream");
        }))
    }

    /// Compare every account's ledger balances with the committed deltas.
    async fn reconcile(&self, ledger: &WalletLedger<MemoryStore>) -> anyhow::Result<Reconciliation> {
        let expected = self.expected.read().await;
        let mut mismatches = Vec::new();
        let mut wallets_checked = 0;

        for account in &self.accounts {
            let actual = ledger.balances(account).await?;
            let wanted = expected.get(account).cloned().unwrap_or_default();
            wallets_checked += actual.len();

            if !balances_match(&actual, &wanted) {
                let detail = format!("{account}: ledger {actual:?}, expected {wanted:?}");
                warn!(%detail, "Balance mismatch");
                mismatches.push(detail);
            }

            if let Some((currency, balance)) = actual.iter().find(|(_, b)| **b < Decimal::ZERO) {
                mismatches.push(format!("{account}: negative {currency} balance {balance}"));
            }
        }

        Ok(Reconciliation {
            accounts_checked: self.accounts.len(),
            wallets_checked,
            mismatches,
        })
    }
}

/// Allowed drift between ledger and tallied balances. Exchanged amounts
/// carry up to 28 significant digits, so additions round and the result
/// depends on the order deltas were applied in.
fn tolerance() -> Decimal {
    Decimal::new(1, 15)
}

fn balances_match(actual: &AccountWallets, wanted: &AccountWallets) -> bool {
    actual.len() == wanted.len()
        && actual.iter().all(|(currency, balance)| {
            wanted
                .get(currency)
                .is_some_and(|expected| (*balance - *expected).abs() <= tolerance())
        })
}

fn credit(expected: &mut Expected, account: &AccountId, currency: &Currency, delta: Decimal) {
    *expected
        .entry(account.clone())
        .or_insert_with(BTreeMap::new)
        .entry(currency.clone())
        .or_insert(Decimal::ZERO) += delta;
}

async fn execute(
    ledger: &WalletLedger<MemoryStore>,
    op: Operation,
    metrics: &RwLock<SimulationMetrics>,
    expected: &RwLock<Expected>,
) {
    let kind = op.kind();
    let started = Instant::now();

    let result: Result<Vec<(&AccountId, &Currency, Decimal)>, WalletError> = match &op {
        Operation::Deposit {
            account,
            currency,
            amount,
        } => ledger
            .deposit(account, currency, *amount)
            .await
            .map(|_| vec![(account, currency, *amount)]),
        Operation::Withdraw {
            account,
            currency,
            amount,
        } => ledger
            .withdraw(account, currency, *amount)
            .await
            .map(|_| vec![(account, currency, -*amount)]),
        Operation::Exchange {
            account,
            from,
            to,
            amount,
        } => ledger
            .exchange(account, from, to, *amount)
            .await
            .map(|outcome| vec![(account, from, -*amount), (account, to, outcome.exchanged)]),
    };
    let latency = started.elapsed();

    match result {
        Ok(deltas) => {
            {
                let mut expected = expected.write().await;
                for (account, currency, delta) in deltas {
                    credit(&mut expected, account, currency, delta);
                }
            }
            metrics.write().await.record_success(kind, latency);
        }
        Err(err) => {
            debug!(kind, code = err.error_code(), "Operation rejected");
            metrics.write().await.record_failure(err.error_code(), latency);
        }
    }
}
