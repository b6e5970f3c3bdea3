//! Transactional storage for accounts, expenses and payments.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{Committed, LedgerStore, LedgerStoreError, Mutation, WriteOp};
