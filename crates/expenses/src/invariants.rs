//! Cross-entity invariants binding an expense to its payments.

use expenseflow_core::{AggregateRoot, DomainError, DomainResult};

use crate::expense::{Expense, ExpenseStatus};
use crate::payment::{Payment, PaymentStatus};

/// Check that an expense and every payment ever prepared for it agree.
///
/// - at most one payment is not `Cancelled`;
/// - `InPayment` has exactly one active payment, `Pending` or `Approved`;
/// - `Paid` has exactly one active payment, `Paid`;
/// - any other status has no active payment;
/// - an active payment carries the expense amount.
pub fn check_settlement(expense: &Expense, payments: &[Payment]) -> DomainResult<()> {
    if let Some(p) = payments.iter().find(|p| p.expense_id() != expense.id_typed()) {
        return Err(DomainError::invariant(format!(
            "payment {} does not belong to expense {}",
            p.id(),
            expense.id()
        )));
    }

    let active: Vec<&Payment> = payments.iter().filter(|p| p.status().is_active()).collect();
    if active.len() > 1 {
        return Err(DomainError::invariant(format!(
            "expense {} has {} active payments",
            expense.id(),
            active.len()
        )));
    }

    let consistent = match (expense.status(), active.first()) {
        (ExpenseStatus::InPayment, Some(p)) => {
            matches!(p.status(), PaymentStatus::Pending | PaymentStatus::Approved)
        }
        (ExpenseStatus::Paid, Some(p)) => p.status() == PaymentStatus::Paid,
        (ExpenseStatus::InPayment | ExpenseStatus::Paid, None) => false,
        (_, None) => true,
        (_, Some(_)) => false,
    };
    if !consistent {
        return Err(DomainError::invariant(format!(
            "expense {} is {} but its active payment is {}",
            expense.id(),
            expense.status(),
            active
                .first()
                .map(|p| p.status().as_str())
                .unwrap_or("missing")
        )));
    }

    if let Some(p) = active.first() {
        if p.amount() != expense.amount() {
            return Err(DomainError::invariant(format!(
                "payment {} amount {} differs from expense amount {}",
                p.id(),
                p.amount(),
                expense.amount()
            )));
        }
    }

    Ok(())
}
