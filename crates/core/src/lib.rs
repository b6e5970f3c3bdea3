//! `expenseflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod money;
pub mod value_object;

pub use aggregate::AggregateRoot;
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, ExpenseId, PaymentId};
pub use lifecycle::Lifecycle;
pub use money::{CurrencyCode, Money};
pub use value_object::ValueObject;
