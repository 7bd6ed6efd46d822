//! Simulation scenarios.

use clap::ValueEnum;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;

use walletd_common::{AccountId, Currency};

/// Built-in scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Random deposits, withdrawals and exchanges over every account.
    SteadyMix,
    /// Every worker hammers one account's wallets.
    HotWallet,
    /// A currency is listed upstream mid-run.
    CurrencyRollout,
}

/// A currency listed upstream once enough operations have completed.
#[derive(Debug, Clone)]
pub struct Rollout {
    pub currency: Currency,
    pub rate: Decimal,
    pub after_operations: u64,
}

/// Relative weights of operation kinds.
#[derive(Debug, Clone, Copy)]
pub struct OperationMix {
    pub deposit: u32,
    pub withdraw: u32,
    pub exchange: u32,
    /// Share of operations sent with a zero or negative amount.
    pub invalid: u32,
}

/// One operation issued by a worker.
#[derive(Debug, Clone)]
pub enum Operation {
    Deposit {
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    },
    Withdraw {
        account: AccountId,
        currency: Currency,
        amount: Decimal,
    },
    Exchange {
        account: AccountId,
        from: Currency,
        to: Currency,
        amount: Decimal,
    },
}

impl Operation {
    /// Short name of the operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Deposit { .. } => "deposit",
            Operation::Withdraw { .. } => "withdraw",
            Operation::Exchange { .. } => "exchange",
        }
    }
}

/// A simulation scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub kind: ScenarioKind,
    pub description: &'static str,
    /// Rates served from the start.
    pub rates: Vec<(Currency, Decimal)>,
    /// Currencies workers pick from, including ones not listed yet.
    pub currencies: Vec<Currency>,
    pub mix: OperationMix,
    /// Restrict traffic to the first N accounts.
    pub hot_accounts: Option<usize>,
    pub rollout: Option<Rollout>,
}

fn base_rates() -> Vec<(Currency, Decimal)> {
    vec![
        (Currency::usd(), Decimal::ONE),
        (Currency::eur(), Decimal::new(92, 2)),
        (Currency::rub(), Decimal::new(925, 1)),
    ]
}

impl Scenario {
    /// Load a built-in scenario. `operations` sizes the rollout point.
    pub fn load(kind: ScenarioKind, operations: u64) -> Self {
        let rates = base_rates();
        let currencies: Vec<Currency> = rates.iter().map(|(c, _)| c.clone()).collect();

        match kind {
            ScenarioKind::SteadyMix => Self {
                kind,
                description: "Mixed traffic over all accounts and listed currencies",
                rates,
                currencies,
                mix: OperationMix {
                    deposit: 40,
                    withdraw: 30,
                    exchange: 28,
                    invalid: 2,
                },
                hot_accounts: None,
                rollout: None,
            },
            ScenarioKind::HotWallet => Self {
                kind,
                description: "All workers contend on one account",
                rates,
                currencies: vec![Currency::usd(), Currency::eur()],
                mix: OperationMix {
                    deposit: 45,
                    withdraw: 45,
                    exchange: 10,
                    invalid: 0,
                },
                hot_accounts: Some(1),
                rollout: None,
            },
            ScenarioKind::CurrencyRollout => {
                let gbp = Currency::new("GBP");
                let mut currencies = currencies;
                currencies.push(gbp.clone());
                Self {
                    kind,
                    description: "GBP is listed upstream a third of the way through",
                    rates,
                    currencies,
                    mix: OperationMix {
                        deposit: 35,
                        withdraw: 20,
                        exchange: 45,
                        invalid: 0,
                    },
                    hot_accounts: None,
                    rollout: Some(Rollout {
                        currency: gbp,
                        rate: Decimal::new(79, 2),
                        after_operations: operations / 3,
                    }),
                }
            }
        }
    }

    /// Draw the next operation.
    pub fn next_operation<R: Rng>(&self, rng: &mut R, accounts: &[AccountId]) -> Operation {
        let pool = match self.hot_accounts {
            Some(n) => &accounts[..n.clamp(1, accounts.len())],
            None => accounts,
        };
        let account = pool[rng.gen_range(0..pool.len())].clone();
        let currency = self.currencies[rng.gen_range(0..self.currencies.len())].clone();

        let mix = self.mix;
        let total = mix.deposit + mix.withdraw + mix.exchange + mix.invalid;
        let roll = rng.gen_range(0..total);

        let amount = Decimal::new(rng.gen_range(1..50_000), 2);

        if roll < mix.deposit {
            Operation::Deposit {
                account,
                currency,
                amount,
            }
        } else if roll < mix.deposit + mix.withdraw {
            Operation::Withdraw {
                account,
                currency,
                amount,
            }
        } else if roll < mix.deposit + mix.withdraw + mix.exchange {
            let to = self.currencies[rng.gen_range(0..self.currencies.len())].clone();
            Operation::Exchange {
                account,
                from: currency,
                to,
                amount,
            }
        } else {
            let amount = if rng.gen_bool(0.5) { Decimal::ZERO } else { -amount };
            Operation::Deposit {
                account,
                currency,
                amount,
            }
        }
    }
}
