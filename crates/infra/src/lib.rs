//! Infrastructure layer: ledger storage, store configuration and the
//! consistency engine that coordinates expenses, payments and balances.

pub mod config;
pub mod ledger_engine;
pub mod ledger_store;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, StoreConfig};
pub use ledger_engine::{EngineError, EngineResult, LedgerEngine};
pub use ledger_store::{
    Committed, InMemoryLedgerStore, LedgerStore, LedgerStoreError, PostgresLedgerStore, WriteOp,
};
