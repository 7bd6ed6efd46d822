//! walletd Ledger
//!
//! Per-currency wallet balances keyed by account, mutated only inside
//! row-locking store transactions.
//!
//! # Operations
//!
//! - Deposit and withdraw, creating a wallet on first use of a currency
//! - Exchange between two currencies of one account in a single transaction
//! - Balance snapshots per account
//!
//! # Stores
//!
//! - [`MemoryStore`]: in-process rows with per-row async locks
//! - [`PgStore`]: Postgres `wallets` table with `SELECT ... FOR UPDATE`

pub mod engine;
pub mod memory;
pub mod postgres;
pub mod store;

pub use engine::{ExchangeOutcome, WalletLedger};
pub use memory::{MemoryStore, MemoryTransaction};
pub use postgres::{PgStore, PgTransaction};
pub use store::{to_wallets, StoreTransaction, TransactionalStore, WalletBalance};
