use core::fmt;
use core::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use expenseflow_core::{AggregateRoot, DomainError, DomainResult, ExpenseId, Lifecycle, Money};

/// Expense approval lifecycle.
///
/// ```text
/// Draft --send--> Pending --approve--> Approved --begin_payment--> InPayment --settle--> Paid
///                    \                    ^                            |
///                     --reject--> Rejected  `---------release----------'
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    InPayment,
    Paid,
}

impl ExpenseStatus {
    pub const ALL: [ExpenseStatus; 6] = [
        ExpenseStatus::Draft,
        ExpenseStatus::Pending,
        ExpenseStatus::Approved,
        ExpenseStatus::Rejected,
        ExpenseStatus::InPayment,
        ExpenseStatus::Paid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseStatus::Draft => "draft",
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Rejected => "rejected",
            ExpenseStatus::InPayment => "in_payment",
            ExpenseStatus::Paid => "paid",
        }
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions that move an expense along its lifecycle.
///
/// Only `Send`, `Approve` and `Reject` are caller-facing; the payment actions
/// are driven by the ledger engine while it prepares, confirms or cancels a
/// payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseAction {
    Send,
    Approve,
    Reject,
    BeginPayment,
    Settle,
    Release,
}

impl ExpenseAction {
    pub fn is_caller_facing(self) -> bool {
        matches!(self, ExpenseAction::Send | ExpenseAction::Approve | ExpenseAction::Reject)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExpenseAction::Send => "send",
            ExpenseAction::Approve => "approve",
            ExpenseAction::Reject => "reject",
            ExpenseAction::BeginPayment => "begin_payment",
            ExpenseAction::Settle => "settle",
            ExpenseAction::Release => "release",
        }
    }
}

impl fmt::Display for ExpenseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the caller-facing action names only.
impl FromStr for ExpenseAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "send" => Ok(ExpenseAction::Send),
            "approve" => Ok(ExpenseAction::Approve),
            "reject" => Ok(ExpenseAction::Reject),
            other => Err(DomainError::validation(format!(
                "unknown expense action '{other}' (expected one of: send, approve, reject)"
            ))),
        }
    }
}

impl Lifecycle for ExpenseStatus {
    type Action = ExpenseAction;

    const TRANSITIONS: &'static [(Self, Self::Action, Self)] = &[
        (ExpenseStatus::Draft, ExpenseAction::Send, ExpenseStatus::Pending),
        (ExpenseStatus::Pending, ExpenseAction::Approve, ExpenseStatus::Approved),
        (ExpenseStatus::Pending, ExpenseAction::Reject, ExpenseStatus::Rejected),
        (ExpenseStatus::Approved, ExpenseAction::BeginPayment, ExpenseStatus::InPayment),
        (ExpenseStatus::InPayment, ExpenseAction::Settle, ExpenseStatus::Paid),
        (ExpenseStatus::InPayment, ExpenseAction::Release, ExpenseStatus::Approved),
    ];
}

/// Command: submit a new expense (created in `Draft`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitExpense {
    pub description: String,
    pub amount: Money,
    pub category: String,
    pub date_incurred: Option<NaiveDate>,
}

/// Aggregate root: Expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    id: ExpenseId,
    description: String,
    amount: Money,
    category: String,
    date_incurred: NaiveDate,
    status: ExpenseStatus,
    version: u64,
}

impl Expense {
    /// Create a `Draft` expense. `today` is used when no date was given.
    pub fn submit(id: ExpenseId, cmd: SubmitExpense, today: NaiveDate) -> DomainResult<Self> {
        let description = cmd.description.trim();
        if description.is_empty() {
            return Err(DomainError::validation("description must not be empty"));
        }
        let category = cmd.category.trim();
        if category.is_empty() {
            return Err(DomainError::validation("category must not be empty"));
        }
        if cmd.amount.is_zero() {
            return Err(DomainError::validation("expense amount must be positive"));
        }

        Ok(Self {
            id,
            description: description.to_string(),
            amount: cmd.amount,
            category: category.to_string(),
            date_incurred: cmd.date_incurred.unwrap_or(today),
            status: ExpenseStatus::Draft,
            version: 1,
        })
    }

    pub fn id_typed(&self) -> ExpenseId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn date_incurred(&self) -> NaiveDate {
        self.date_incurred
    }

    pub fn status(&self) -> ExpenseStatus {
        self.status
    }

    /// Apply a caller-facing workflow action (`send`, `approve`, `reject`).
    pub fn transition(&mut self, action: ExpenseAction) -> DomainResult<ExpenseStatus> {
        if !action.is_caller_facing() {
            return Err(DomainError::invalid_transition(format!(
                "'{action}' is reserved for payment processing"
            )));
        }
        self.step(action)
    }

    /// Lock the expense for a payment being prepared.
    pub fn begin_payment(&mut self) -> DomainResult<()> {
        self.ensure_approved()?;
        self.step(ExpenseAction::BeginPayment).map(|_| ())
    }

    /// Mark the expense paid once its payment is confirmed.
    pub fn settle(&mut self) -> DomainResult<()> {
        self.payment_step(ExpenseAction::Settle)
    }

    /// Hand the expense back to `Approved` after its payment is cancelled.
    pub fn release(&mut self) -> DomainResult<()> {
        self.payment_step(ExpenseAction::Release)
    }

    /// Fails with `NotApproved` unless the expense is `Approved`.
    pub fn ensure_approved(&self) -> DomainResult<()> {
        if self.status != ExpenseStatus::Approved {
            return Err(DomainError::not_approved(format!(
                "expense {} is {}; only approved expenses can be paid",
                self.id, self.status
            )));
        }
        Ok(())
    }

    fn step(&mut self, action: ExpenseAction) -> DomainResult<ExpenseStatus> {
        let next = self.status.next(action).ok_or_else(|| {
            DomainError::invalid_transition(format!(
                "cannot {action} expense {} in status {}",
                self.id, self.status
            ))
        })?;
        self.status = next;
        Ok(next)
    }

    // Settle/release only follow a pending payment; anything else means the
    // expense and its payment have drifted apart.
    fn payment_step(&mut self, action: ExpenseAction) -> DomainResult<()> {
        if self.status != ExpenseStatus::InPayment {
            return Err(DomainError::invariant(format!(
                "expense {} is {} but has a pending payment",
                self.id, self.status
            )));
        }
        self.step(action).map(|_| ())
    }
}

impl AggregateRoot for Expense {
    type Id = ExpenseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
    }
}
