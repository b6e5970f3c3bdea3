use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use expenseflow_core::{AccountId, DomainError, DomainResult, ExpenseId, PaymentId};
use expenseflow_expenses::{Account, Expense, Payment};

/// A change applied to the current state of a record inside a store transaction.
///
/// The closure receives the record as re-read under the transaction, so any
/// check it performs sees the latest committed state. Returning an error
/// aborts the whole transaction.
pub type Mutation<T> = Box<dyn FnOnce(&mut T) -> DomainResult<()> + Send>;

/// One write inside an atomic ledger update.
pub enum WriteOp {
    InsertPayment(Payment),
    UpdateAccount(AccountId, Mutation<Account>),
    UpdateExpense(ExpenseId, Mutation<Expense>),
    UpdatePayment(PaymentId, Mutation<Payment>),
}

impl WriteOp {
    pub fn update_account(
        id: AccountId,
        f: impl FnOnce(&mut Account) -> DomainResult<()> + Send + 'static,
    ) -> Self {
        WriteOp::UpdateAccount(id, Box::new(f))
    }

    pub fn update_expense(
        id: ExpenseId,
        f: impl FnOnce(&mut Expense) -> DomainResult<()> + Send + 'static,
    ) -> Self {
        WriteOp::UpdateExpense(id, Box::new(f))
    }

    pub fn update_payment(
        id: PaymentId,
        f: impl FnOnce(&mut Payment) -> DomainResult<()> + Send + 'static,
    ) -> Self {
        WriteOp::UpdatePayment(id, Box::new(f))
    }
}

impl core::fmt::Debug for WriteOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WriteOp::InsertPayment(p) => f.debug_tuple("InsertPayment").field(&p.id_typed()).finish(),
            WriteOp::UpdateAccount(id, _) => f.debug_tuple("UpdateAccount").field(id).finish(),
            WriteOp::UpdateExpense(id, _) => f.debug_tuple("UpdateExpense").field(id).finish(),
            WriteOp::UpdatePayment(id, _) => f.debug_tuple("UpdatePayment").field(id).finish(),
        }
    }
}

/// Records written by a successful atomic update, in op order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Committed {
    pub accounts: Vec<Account>,
    pub expenses: Vec<Expense>,
    pub payments: Vec<Payment>,
}

impl Committed {
    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.iter().rev().find(|a| a.id_typed() == id)
    }

    pub fn expense(&self, id: ExpenseId) -> Option<&Expense> {
        self.expenses.iter().rev().find(|e| e.id_typed() == id)
    }

    pub fn payment(&self, id: PaymentId) -> Option<&Payment> {
        self.payments.iter().rev().find(|p| p.id_typed() == id)
    }
}

/// Ledger store operation error.
///
/// These are **infrastructure errors** except for `Rejected`, which carries the
/// domain error a mutation (or a store-side invariant check) raised inside the
/// transaction.
#[derive(Debug, Error)]
pub enum LedgerStoreError {
    #[error("write rejected: {0}")]
    Rejected(#[from] DomainError),

    /// Uniqueness violation or a lost serialization race.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Durable, transactional storage for accounts, expenses and payments.
///
/// ## Guarantees
///
/// - `atomic_update` is all-or-nothing. Every mutation sees the state left by
///   the last committed transaction touching the same record, and no other
///   transaction can write that record until this one ends.
/// - At most one non-cancelled payment exists per expense.
/// - Account numbers are unique.
/// - Every expense touched by `atomic_update` is checked against its payments
///   with [`expenseflow_expenses::check_settlement`] before commit.
///
/// Records are never deleted.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn account(&self, id: AccountId) -> Result<Option<Account>, LedgerStoreError>;

    async fn expense(&self, id: ExpenseId) -> Result<Option<Expense>, LedgerStoreError>;

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, LedgerStoreError>;

    /// All accounts, ordered by id (creation order).
    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerStoreError>;

    /// All expenses, ordered by id (creation order).
    async fn list_expenses(&self) -> Result<Vec<Expense>, LedgerStoreError>;

    /// Every payment ever prepared for an expense, cancelled ones included.
    async fn payments_for_expense(&self, id: ExpenseId) -> Result<Vec<Payment>, LedgerStoreError>;

    /// Insert a new account; fails with `Conflict` on a duplicate account number.
    async fn insert_account(&self, account: Account) -> Result<Account, LedgerStoreError>;

    async fn insert_expense(&self, expense: Expense) -> Result<Expense, LedgerStoreError>;

    /// Apply `ops` in order as one transaction.
    ///
    /// Update targets that do not exist reject the transaction with
    /// `DomainError::NotFound`.
    async fn atomic_update(&self, ops: Vec<WriteOp>) -> Result<Committed, LedgerStoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn account(&self, id: AccountId) -> Result<Option<Account>, LedgerStoreError> {
        (**self).account(id).await
    }

    async fn expense(&self, id: ExpenseId) -> Result<Option<Expense>, LedgerStoreError> {
        (**self).expense(id).await
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, LedgerStoreError> {
        (**self).payment(id).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerStoreError> {
        (**self).list_accounts().await
    }

    async fn list_expenses(&self) -> Result<Vec<Expense>, LedgerStoreError> {
        (**self).list_expenses().await
    }

    async fn payments_for_expense(&self, id: ExpenseId) -> Result<Vec<Payment>, LedgerStoreError> {
        (**self).payments_for_expense(id).await
    }

    async fn insert_account(&self, account: Account) -> Result<Account, LedgerStoreError> {
        (**self).insert_account(account).await
    }

    async fn insert_expense(&self, expense: Expense) -> Result<Expense, LedgerStoreError> {
        (**self).insert_expense(expense).await
    }

    async fn atomic_update(&self, ops: Vec<WriteOp>) -> Result<Committed, LedgerStoreError> {
        (**self).atomic_update(ops).await
    }
}
