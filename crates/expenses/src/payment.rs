use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use expenseflow_core::{
    AccountId, AggregateRoot, DomainError, DomainResult, ExpenseId, Lifecycle, Money, PaymentId,
};

use crate::account::Account;
use crate::expense::Expense;

/// Payment execution lifecycle.
///
/// `Approved` (treasury sign-off) is part of the data model, but no operation
/// moves a payment into it; confirm goes straight from `Pending` to `Paid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Paid,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// Every status except `Cancelled` still claims its expense.
    pub fn is_active(self) -> bool {
        self != PaymentStatus::Cancelled
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAction {
    Confirm,
    Cancel,
}

impl fmt::Display for PaymentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PaymentAction::Confirm => "confirm",
            PaymentAction::Cancel => "cancel",
        })
    }
}

impl Lifecycle for PaymentStatus {
    type Action = PaymentAction;

    const TRANSITIONS: &'static [(Self, Self::Action, Self)] = &[
        (PaymentStatus::Pending, PaymentAction::Confirm, PaymentStatus::Paid),
        (PaymentStatus::Pending, PaymentAction::Cancel, PaymentStatus::Cancelled),
    ];
}

/// Reference code handed to treasury: `PAY-YYYYMMDD-XXXXXXXX`.
///
/// The suffix is the random tail of the (UUIDv7) payment id, so codes stay
/// unique even for payments scheduled in the same millisecond.
pub fn reference_code(id: PaymentId, scheduled_at: DateTime<Utc>) -> String {
    let hex = format!("{:X}", id.as_uuid().simple());
    format!("PAY-{}-{}", scheduled_at.format("%Y%m%d"), &hex[hex.len() - 8..])
}

/// Aggregate root: Payment (settles one expense against one account).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    expense_id: ExpenseId,
    account_id: AccountId,
    amount: Money,
    status: PaymentStatus,
    reference_code: String,
    payment_date: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    version: u64,
}

impl Payment {
    /// Schedule a `Pending` payment for an approved expense.
    ///
    /// The amount is frozen from the expense here and never changes afterwards.
    pub fn schedule(
        id: PaymentId,
        expense: &Expense,
        account: &Account,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        expense.ensure_approved()?;
        account.ensure_covers(expense.amount())?;

        Ok(Self {
            id,
            expense_id: expense.id_typed(),
            account_id: account.id_typed(),
            amount: expense.amount(),
            status: PaymentStatus::Pending,
            reference_code: reference_code(id, now),
            payment_date: None,
            created_at: now,
            version: 1,
        })
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn expense_id(&self) -> ExpenseId {
        self.expense_id
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn reference_code(&self) -> &str {
        &self.reference_code
    }

    pub fn payment_date(&self) -> Option<DateTime<Utc>> {
        self.payment_date
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Fails with `InvalidState` unless the payment is `Pending`.
    pub fn ensure_pending(&self, action: PaymentAction) -> DomainResult<()> {
        if !self.status.allows(action) {
            return Err(DomainError::invalid_state(format!(
                "cannot {action} payment {} in status {}; only pending payments may be {}",
                self.id,
                self.status,
                match action {
                    PaymentAction::Confirm => "confirmed",
                    PaymentAction::Cancel => "cancelled",
                }
            )));
        }
        Ok(())
    }

    /// Mark the payment executed and stamp the payment date.
    pub fn confirm(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.step(PaymentAction::Confirm)?;
        self.payment_date = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        self.step(PaymentAction::Cancel)
    }

    fn step(&mut self, action: PaymentAction) -> DomainResult<()> {
        self.ensure_pending(action)?;
        // ensure_pending guarantees the edge exists.
        if let Some(next) = self.status.next(action) {
            self.status = next;
        }
        Ok(())
    }
}

impl AggregateRoot for Payment {
    type Id = PaymentId;

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
