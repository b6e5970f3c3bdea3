use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use expenseflow_core::{AccountId, AggregateRoot, DomainError, ExpenseId, PaymentId};
use expenseflow_expenses::{Account, Expense, Payment, check_settlement};

use super::r#trait::{Committed, LedgerStore, LedgerStoreError, WriteOp};

#[derive(Debug, Default, Clone)]
struct Tables {
    accounts: BTreeMap<AccountId, Account>,
    expenses: BTreeMap<ExpenseId, Expense>,
    payments: BTreeMap<PaymentId, Payment>,
}

/// Writes of one transaction, not yet visible to readers.
#[derive(Default)]
struct Staged {
    accounts: BTreeMap<AccountId, Account>,
    expenses: BTreeMap<ExpenseId, Expense>,
    payments: BTreeMap<PaymentId, Payment>,
    touched_expenses: BTreeSet<ExpenseId>,
}

impl Staged {
    fn account(&self, tables: &Tables, id: AccountId) -> Option<Account> {
        self.accounts
            .get(&id)
            .or_else(|| tables.accounts.get(&id))
            .cloned()
    }

    fn expense(&self, tables: &Tables, id: ExpenseId) -> Option<Expense> {
        self.expenses
            .get(&id)
            .or_else(|| tables.expenses.get(&id))
            .cloned()
    }

    fn payment(&self, tables: &Tables, id: PaymentId) -> Option<Payment> {
        self.payments
            .get(&id)
            .or_else(|| tables.payments.get(&id))
            .cloned()
    }

    /// Committed payments of an expense with staged writes laid over them.
    fn payments_for(&self, tables: &Tables, expense_id: ExpenseId) -> Vec<Payment> {
        let mut merged: BTreeMap<PaymentId, Payment> = tables
            .payments
            .values()
            .filter(|p| p.expense_id() == expense_id)
            .map(|p| (p.id_typed(), p.clone()))
            .collect();
        for p in self.payments.values().filter(|p| p.expense_id() == expense_id) {
            merged.insert(p.id_typed(), p.clone());
        }
        merged.into_values().collect()
    }
}

/// In-memory ledger store.
///
/// A single mutex guards all tables, so transactions are fully serialized.
/// Intended for tests/dev and the default API backend.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: Mutex<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, LedgerStoreError> {
        self.tables
            .lock()
            .map_err(|_| LedgerStoreError::Storage("lock poisoned".to_string()))
    }

    fn apply(&self, ops: Vec<WriteOp>) -> Result<Committed, LedgerStoreError> {
        let mut tables = self.lock()?;
        let mut staged = Staged::default();
        let mut committed = Committed::default();

        for op in ops {
            match op {
                WriteOp::InsertPayment(payment) => {
                    let id = payment.id_typed();
                    if staged.payment(&tables, id).is_some() {
                        return Err(LedgerStoreError::Conflict(format!(
                            "payment {id} already exists"
                        )));
                    }
                    if staged.expense(&tables, payment.expense_id()).is_none() {
                        return Err(DomainError::not_found(format!(
                            "expense {}",
                            payment.expense_id()
                        ))
                        .into());
                    }
                    if staged.account(&tables, payment.account_id()).is_none() {
                        return Err(DomainError::not_found(format!(
                            "account {}",
                            payment.account_id()
                        ))
                        .into());
                    }
                    if payment.status().is_active()
                        && staged
                            .payments_for(&tables, payment.expense_id())
                            .iter()
                            .any(|p| p.status().is_active())
                    {
                        return Err(LedgerStoreError::Conflict(format!(
                            "expense {} already has an active payment",
                            payment.expense_id()
                        )));
                    }

                    staged.touched_expenses.insert(payment.expense_id());
                    committed.payments.push(payment.clone());
                    staged.payments.insert(id, payment);
                }
                WriteOp::UpdateAccount(id, mutate) => {
                    let mut account = staged
                        .account(&tables, id)
                        .ok_or_else(|| DomainError::not_found(format!("account {id}")))?;
                    mutate(&mut account)?;
                    account.bump_version();
                    committed.accounts.push(account.clone());
                    staged.accounts.insert(id, account);
                }
                WriteOp::UpdateExpense(id, mutate) => {
                    let mut expense = staged
                        .expense(&tables, id)
                        .ok_or_else(|| DomainError::not_found(format!("expense {id}")))?;
                    mutate(&mut expense)?;
                    expense.bump_version();
                    staged.touched_expenses.insert(id);
                    committed.expenses.push(expense.clone());
                    staged.expenses.insert(id, expense);
                }
                WriteOp::UpdatePayment(id, mutate) => {
                    let mut payment = staged
                        .payment(&tables, id)
                        .ok_or_else(|| DomainError::not_found(format!("payment {id}")))?;
                    mutate(&mut payment)?;
                    payment.bump_version();
                    staged.touched_expenses.insert(payment.expense_id());
                    committed.payments.push(payment.clone());
                    staged.payments.insert(id, payment);
                }
            }
        }

        for expense_id in &staged.touched_expenses {
            let expense = staged
                .expense(&tables, *expense_id)
                .ok_or_else(|| DomainError::not_found(format!("expense {expense_id}")))?;
            check_settlement(&expense, &staged.payments_for(&tables, *expense_id))?;
        }

        // Nothing above touched `tables`; from here on the writes cannot fail.
        let Staged {
            accounts,
            expenses,
            payments,
            ..
        } = staged;
        tables.accounts.extend(accounts);
        tables.expenses.extend(expenses);
        tables.payments.extend(payments);

        Ok(committed)
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn account(&self, id: AccountId) -> Result<Option<Account>, LedgerStoreError> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    async fn expense(&self, id: ExpenseId) -> Result<Option<Expense>, LedgerStoreError> {
        Ok(self.lock()?.expenses.get(&id).cloned())
    }

    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, LedgerStoreError> {
        Ok(self.lock()?.payments.get(&id).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerStoreError> {
        Ok(self.lock()?.accounts.values().cloned().collect())
    }

    async fn list_expenses(&self) -> Result<Vec<Expense>, LedgerStoreError> {
        Ok(self.lock()?.expenses.values().cloned().collect())
    }

    async fn payments_for_expense(&self, id: ExpenseId) -> Result<Vec<Payment>, LedgerStoreError> {
        Ok(self
            .lock()?
            .payments
            .values()
            .filter(|p| p.expense_id() == id)
            .cloned()
            .collect())
    }

    async fn insert_account(&self, account: Account) -> Result<Account, LedgerStoreError> {
        let mut tables = self.lock()?;
        if tables.accounts.contains_key(&account.id_typed()) {
            return Err(LedgerStoreError::Conflict(format!(
                "account {} already exists",
                account.id_typed()
            )));
        }
        if tables
            .accounts
            .values()
            .any(|a| a.account_number() == account.account_number())
        {
            return Err(LedgerStoreError::Conflict(format!(
                "account number {} is already registered",
                account.account_number()
            )));
        }
        tables.accounts.insert(account.id_typed(), account.clone());
        Ok(account)
    }

    async fn insert_expense(&self, expense: Expense) -> Result<Expense, LedgerStoreError> {
        let mut tables = self.lock()?;
        if tables.expenses.contains_key(&expense.id_typed()) {
            return Err(LedgerStoreError::Conflict(format!(
                "expense {} already exists",
                expense.id_typed()
            )));
        }
        tables.expenses.insert(expense.id_typed(), expense.clone());
        Ok(expense)
    }

    async fn atomic_update(&self, ops: Vec<WriteOp>) -> Result<Committed, LedgerStoreError> {
        self.apply(ops)
    }
}
