use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use expenseflow_core::{AggregateRoot, CurrencyCode, DomainResult, Money};
use expenseflow_expenses::{
    Account, Expense, ExpenseStatus, OpenAccount, Payment, PaymentStatus, SubmitExpense,
};

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub name: String,
    pub account_number: String,
    pub balance: Option<Decimal>,
    pub currency: Option<String>,
}

impl OpenAccountRequest {
    pub fn into_command(self) -> DomainResult<OpenAccount> {
        Ok(OpenAccount {
            name: self.name,
            account_number: self.account_number,
            balance: self.balance.map(Money::new).transpose()?.unwrap_or_default(),
            currency: self.currency.map(CurrencyCode::new).transpose()?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitExpenseRequest {
    pub description: String,
    pub amount: Decimal,
    pub category: String,
    pub date_incurred: Option<NaiveDate>,
}

impl SubmitExpenseRequest {
    pub fn into_command(self) -> DomainResult<SubmitExpense> {
        Ok(SubmitExpense {
            description: self.description,
            amount: Money::new(self.amount)?,
            category: self.category,
            date_incurred: self.date_incurred,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct PreparePaymentRequest {
    pub account_id: String,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub name: String,
    pub account_number: String,
    pub balance: Money,
    pub currency: CurrencyCode,
    pub version: u64,
}

impl From<&Account> for AccountResponse {
    fn from(a: &Account) -> Self {
        Self {
            id: a.id_typed().to_string(),
            name: a.name().to_string(),
            account_number: a.account_number().to_string(),
            balance: a.balance(),
            currency: a.currency().clone(),
            version: a.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExpenseResponse {
    pub id: String,
    pub description: String,
    pub amount: Money,
    pub category: String,
    pub date_incurred: NaiveDate,
    pub status: ExpenseStatus,
    pub version: u64,
}

impl From<&Expense> for ExpenseResponse {
    fn from(e: &Expense) -> Self {
        Self {
            id: e.id_typed().to_string(),
            description: e.description().to_string(),
            amount: e.amount(),
            category: e.category().to_string(),
            date_incurred: e.date_incurred(),
            status: e.status(),
            version: e.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub expense_id: String,
    pub account_id: String,
    pub amount: Money,
    pub status: PaymentStatus,
    pub reference_code: String,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl From<&Payment> for PaymentResponse {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id_typed().to_string(),
            expense_id: p.expense_id().to_string(),
            account_id: p.account_id().to_string(),
            amount: p.amount(),
            status: p.status(),
            reference_code: p.reference_code().to_string(),
            payment_date: p.payment_date(),
            created_at: p.created_at(),
            version: p.version(),
        }
    }
}
