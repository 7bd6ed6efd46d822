//! App state shared by handlers.

use walletd_ledger::{TransactionalStore, WalletLedger};

/// State behind every route: the ledger over the configured store.
pub struct AppState<S: TransactionalStore> {
    pub ledger: WalletLedger<S>,
}

impl<S: TransactionalStore> AppState<S> {
    pub fn new(ledger: WalletLedger<S>) -> Self {
        Self { ledger }
    }
}
