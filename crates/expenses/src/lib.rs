//! Expense management domain module (accounts, expenses, payments).
//!
//! This crate contains the two linked state machines (expense approval,
//! payment execution) and the checks that bind them to account balances,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod account;
pub mod expense;
pub mod invariants;
pub mod payment;

pub use account::{Account, OpenAccount};
pub use expense::{Expense, ExpenseAction, ExpenseStatus, SubmitExpense};
pub use invariants::check_settlement;
pub use payment::{Payment, PaymentAction, PaymentStatus, reference_code};
