//! Ledger consistency engine (application-level orchestration).
//!
//! Every operation follows the same pipeline:
//!
//! ```text
//! Request
//!   ↓
//! 1. Load the records involved (NotFound if absent)
//!   ↓
//! 2. Pre-validate against the loaded state (pure domain checks)
//!   ↓
//! 3. Build an explicit list of `WriteOp`s whose mutations re-check the
//!    same rules against the state re-read inside the transaction
//!   ↓
//! 4. `LedgerStore::atomic_update` (all-or-nothing)
//! ```
//!
//! The engine keeps no mutable state between calls; two engines over the same
//! store behave as one.

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use expenseflow_core::{AccountId, DomainError, ExpenseId, PaymentId};
use expenseflow_expenses::{
    Account, Expense, ExpenseAction, ExpenseStatus, OpenAccount, Payment, PaymentAction,
    SubmitExpense,
};

use crate::ledger_store::{Committed, LedgerStore, LedgerStoreError, WriteOp};

/// Caller-facing error taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("not approved: {0}")]
    NotApproved(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// The store refused a commit that would break expense/payment agreement.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl EngineError {
    /// Stable machine-readable code (used as the HTTP `error` field).
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidTransition(_) => "invalid_transition",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::NotApproved(_) => "not_approved",
            EngineError::InsufficientFunds(_) => "insufficient_funds",
            EngineError::Validation(_) => "validation",
            EngineError::InvariantViolation(_) => "invariant_violation",
            EngineError::Conflict(_) => "conflict",
            EngineError::StorageFailure(_) => "storage_failure",
        }
    }

    /// Business-rule rejections, as opposed to infrastructure failures.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidTransition(_)
                | EngineError::InvalidState(_)
                | EngineError::NotApproved(_)
                | EngineError::InsufficientFunds(_)
                | EngineError::Validation(_)
        )
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::NotFound(what) => EngineError::NotFound(what),
            DomainError::InvalidTransition(msg) => EngineError::InvalidTransition(msg),
            DomainError::InvalidState(msg) => EngineError::InvalidState(msg),
            DomainError::NotApproved(msg) => EngineError::NotApproved(msg),
            DomainError::InsufficientFunds(msg) => EngineError::InsufficientFunds(msg),
            DomainError::InvariantViolation(msg) => EngineError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::Conflict(msg) => EngineError::Conflict(msg),
        }
    }
}

impl From<LedgerStoreError> for EngineError {
    fn from(value: LedgerStoreError) -> Self {
        match value {
            LedgerStoreError::Rejected(err) => err.into(),
            LedgerStoreError::Conflict(msg) => EngineError::Conflict(msg),
            LedgerStoreError::Storage(msg) => EngineError::StorageFailure(msg),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Coordinates expenses, payments and account balances over a [`LedgerStore`].
///
/// ## Guarantees
///
/// - A payment is only prepared for an `Approved` expense whose amount the
///   account covers; the expense moves to `InPayment` in the same commit.
/// - Confirming debits the account, marks the payment `Paid` and the expense
///   `Paid` together. Funds are re-checked at confirm time.
/// - Cancelling marks the payment `Cancelled` and releases the expense back
///   to `Approved` together.
/// - Of several concurrent prepares on one expense, exactly one commits.
#[derive(Debug, Clone)]
pub struct LedgerEngine<S> {
    store: S,
}

impl<S> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> LedgerEngine<S>
where
    S: LedgerStore,
{
    #[instrument(skip(self, cmd), fields(account_number = %cmd.account_number))]
    pub async fn open_account(&self, cmd: OpenAccount) -> EngineResult<Account> {
        let account = Account::open(AccountId::new(), cmd)?;
        let account = self.store.insert_account(account).await.inspect_err(|err| {
            tracing::warn!(error = %err, "account rejected");
        })?;
        tracing::info!(
            account_id = %account.id_typed(),
            balance = %account.balance(),
            currency = %account.currency(),
            "account opened"
        );
        Ok(account)
    }

    #[instrument(skip(self, cmd), fields(amount = %cmd.amount))]
    pub async fn submit_expense(&self, cmd: SubmitExpense) -> EngineResult<Expense> {
        let expense = Expense::submit(ExpenseId::new(), cmd, Utc::now().date_naive())?;
        let expense = self.store.insert_expense(expense).await?;
        tracing::info!(
            expense_id = %expense.id_typed(),
            amount = %expense.amount(),
            status = %expense.status(),
            "expense submitted"
        );
        Ok(expense)
    }

    pub async fn account(&self, id: AccountId) -> EngineResult<Account> {
        self.store
            .account(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("account {id}")))
    }

    pub async fn expense(&self, id: ExpenseId) -> EngineResult<Expense> {
        self.store
            .expense(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("expense {id}")))
    }

    pub async fn payment(&self, id: PaymentId) -> EngineResult<Payment> {
        self.store
            .payment(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("payment {id}")))
    }

    pub async fn accounts(&self) -> EngineResult<Vec<Account>> {
        Ok(self.store.list_accounts().await?)
    }

    pub async fn expenses(&self) -> EngineResult<Vec<Expense>> {
        Ok(self.store.list_expenses().await?)
    }

    /// Payment history of an expense, cancelled payments included.
    pub async fn payments_for_expense(&self, expense_id: ExpenseId) -> EngineResult<Vec<Payment>> {
        self.expense(expense_id).await?;
        Ok(self.store.payments_for_expense(expense_id).await?)
    }

    /// Apply a caller-facing workflow action (`send`, `approve`, `reject`).
    #[instrument(skip(self), fields(expense_id = %expense_id, action = %action))]
    pub async fn transition_expense(
        &self,
        expense_id: ExpenseId,
        action: ExpenseAction,
    ) -> EngineResult<ExpenseStatus> {
        let expense = self.expense(expense_id).await?;
        let from = expense.status();

        let result: EngineResult<ExpenseStatus> = async {
            expense.clone().transition(action)?;
            let committed = self
                .store
                .atomic_update(vec![WriteOp::update_expense(expense_id, move |e| {
                    e.transition(action).map(|_| ())
                })])
                .await?;
            committed_expense(&committed, expense_id).map(|e| e.status())
        }
        .await;

        match &result {
            Ok(to) => tracing::info!(from = %from, to = %to, "expense transitioned"),
            Err(err) => tracing::warn!(from = %from, kind = err.kind(), error = %err, "expense transition refused"),
        }
        result
    }

    /// Schedule a `Pending` payment for an approved expense and move the
    /// expense to `InPayment`.
    #[instrument(skip(self), fields(expense_id = %expense_id, account_id = %account_id))]
    pub async fn prepare_payment(
        &self,
        expense_id: ExpenseId,
        account_id: AccountId,
    ) -> EngineResult<Payment> {
        let expense = self.expense(expense_id).await?;
        let account = self.account(account_id).await?;

        let result: EngineResult<Payment> = async {
            let payment = Payment::schedule(PaymentId::new(), &expense, &account, Utc::now())?;
            let payment_id = payment.id_typed();

            // The expense row is locked first; there is no payment row yet.
            let committed = self
                .store
                .atomic_update(vec![
                    WriteOp::update_expense(expense_id, |e| e.begin_payment()),
                    WriteOp::InsertPayment(payment),
                ])
                .await?;
            committed_payment(&committed, payment_id)
        }
        .await;

        match &result {
            Ok(p) => tracing::info!(
                payment_id = %p.id_typed(),
                amount = %p.amount(),
                reference_code = %p.reference_code(),
                "payment prepared"
            ),
            Err(err) => tracing::warn!(
                expense_status = %expense.status(),
                amount = %expense.amount(),
                balance = %account.balance(),
                kind = err.kind(),
                error = %err,
                "payment preparation refused"
            ),
        }
        result
    }

    /// Execute a pending payment: debit the account, mark payment and expense `Paid`.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn confirm_payment(&self, payment_id: PaymentId) -> EngineResult<Payment> {
        let payment = self.payment(payment_id).await?;
        let expense = self.expense(payment.expense_id()).await?;
        let account = self.account(payment.account_id()).await?;
        let expense_id = payment.expense_id();
        let account_id = payment.account_id();
        let amount = payment.amount();

        let result: EngineResult<Payment> = async {
            payment.ensure_pending(PaymentAction::Confirm)?;
            account.ensure_covers(amount)?;

            let now = Utc::now();
            let committed = self
                .store
                .atomic_update(vec![
                    WriteOp::update_payment(payment_id, move |p| p.confirm(now)),
                    WriteOp::update_expense(expense_id, |e| e.settle()),
                    WriteOp::update_account(account_id, move |a| a.debit(amount).map(|_| ())),
                ])
                .await?;

            if let Some(a) = committed.account(account_id) {
                tracing::info!(account_id = %account_id, new_balance = %a.balance(), "account debited");
            }
            committed_payment(&committed, payment_id)
        }
        .await;

        match &result {
            Ok(p) => tracing::info!(
                expense_id = %expense_id,
                amount = %amount,
                status = %p.status(),
                "payment confirmed"
            ),
            Err(err) => tracing::warn!(
                status = %payment.status(),
                expense_status = %expense.status(),
                amount = %amount,
                balance = %account.balance(),
                kind = err.kind(),
                error = %err,
                "payment confirmation refused"
            ),
        }
        result
    }

    /// Cancel a pending payment and release its expense back to `Approved`.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn cancel_payment(&self, payment_id: PaymentId) -> EngineResult<Payment> {
        let payment = self.payment(payment_id).await?;
        let expense_id = payment.expense_id();

        let result: EngineResult<Payment> = async {
            payment.ensure_pending(PaymentAction::Cancel)?;
            let committed = self
                .store
                .atomic_update(vec![
                    WriteOp::update_payment(payment_id, |p| p.cancel()),
                    WriteOp::update_expense(expense_id, |e| e.release()),
                ])
                .await?;
            committed_payment(&committed, payment_id)
        }
        .await;

        match &result {
            Ok(p) => tracing::info!(expense_id = %expense_id, status = %p.status(), "payment cancelled"),
            Err(err) => tracing::warn!(
                status = %payment.status(),
                kind = err.kind(),
                error = %err,
                "payment cancellation refused"
            ),
        }
        result
    }
}

fn committed_payment(committed: &Committed, id: PaymentId) -> EngineResult<Payment> {
    committed
        .payment(id)
        .cloned()
        .ok_or_else(|| EngineError::StorageFailure(format!("commit did not return payment {id}")))
}

fn committed_expense(committed: &Committed, id: ExpenseId) -> EngineResult<Expense> {
    committed
        .expense(id)
        .cloned()
        .ok_or_else(|| EngineError::StorageFailure(format!("commit did not return expense {id}")))
}
