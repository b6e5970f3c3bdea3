//! Postgres-backed ledger store.
//!
//! Each record is kept as a JSONB document next to the columns the database
//! has to reason about (keys, status, version, account number).
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | LedgerStoreError | Scenario |
//! |------------|----------------------|------------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate account number, second active payment |
//! | Database (serialization failure) | `40001` | `Conflict` | Lost a race against a concurrent transaction |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Lock cycle between concurrent transactions |
//! | Database (foreign key violation) | `23503` | `Rejected(NotFound)` | Payment references a missing expense/account |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | Other | N/A | `Storage` | Pool closed, network errors, decode failures |
//!
//! ## Locking
//!
//! Updates re-read their row with `SELECT ... FOR UPDATE`, so a concurrent
//! transaction touching the same row waits and then sees the committed result.
//! Rows are locked in op order.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use expenseflow_core::{AccountId, AggregateRoot, DomainError, ExpenseId, PaymentId};
use expenseflow_expenses::{Account, Expense, Payment, check_settlement};

use super::r#trait::{Committed, LedgerStore, LedgerStoreError, WriteOp};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id UUID PRIMARY KEY,
        account_number TEXT NOT NULL UNIQUE,
        version BIGINT NOT NULL,
        data JSONB NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expenses (
        id UUID PRIMARY KEY,
        status TEXT NOT NULL,
        version BIGINT NOT NULL,
        data JSONB NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS payments (
        id UUID PRIMARY KEY,
        expense_id UUID NOT NULL REFERENCES expenses (id),
        account_id UUID NOT NULL REFERENCES accounts (id),
        status TEXT NOT NULL,
        version BIGINT NOT NULL,
        data JSONB NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS payments_one_active_per_expense
        ON payments (expense_id)
        WHERE status <> 'cancelled'
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS payments_by_expense ON payments (expense_id)
    "#,
];

/// Postgres-backed ledger store.
///
/// `Send + Sync`; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url` and make sure the schema exists.
    #[instrument(skip(database_url), err)]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, LedgerStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes if they are missing. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), LedgerStoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    async fn fetch_one_doc<T: DeserializeOwned>(
        &self,
        table: Table,
        id: Uuid,
    ) -> Result<Option<T>, LedgerStoreError> {
        let row = sqlx::query(&format!("SELECT data FROM {} WHERE id = $1", table.name()))
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch", e))?;
        row.map(|r| decode(&r)).transpose()
    }

    async fn fetch_all_docs<T: DeserializeOwned>(
        &self,
        table: Table,
    ) -> Result<Vec<T>, LedgerStoreError> {
        let rows = sqlx::query(&format!("SELECT data FROM {} ORDER BY id ASC", table.name()))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;
        rows.iter().map(decode).collect()
    }

    async fn apply_ops(
        tx: &mut Transaction<'_, Postgres>,
        ops: Vec<WriteOp>,
    ) -> Result<Committed, LedgerStoreError> {
        let mut committed = Committed::default();
        let mut touched: BTreeSet<ExpenseId> = BTreeSet::new();

        for op in ops {
            match op {
                WriteOp::InsertPayment(payment) => {
                    insert_payment(tx, &payment).await?;
                    touched.insert(payment.expense_id());
                    committed.payments.push(payment);
                }
                WriteOp::UpdateAccount(id, mutate) => {
                    let mut account: Account = lock_row(tx, Table::Accounts, *id.as_uuid())
                        .await?
                        .ok_or_else(|| DomainError::not_found(format!("account {id}")))?;
                    mutate(&mut account)?;
                    account.bump_version();
                    write_account(tx, &account).await?;
                    committed.accounts.push(account);
                }
                WriteOp::UpdateExpense(id, mutate) => {
                    let mut expense: Expense = lock_row(tx, Table::Expenses, *id.as_uuid())
                        .await?
                        .ok_or_else(|| DomainError::not_found(format!("expense {id}")))?;
                    mutate(&mut expense)?;
                    expense.bump_version();
                    write_expense(tx, &expense).await?;
                    touched.insert(id);
                    committed.expenses.push(expense);
                }
                WriteOp::UpdatePayment(id, mutate) => {
                    let mut payment: Payment = lock_row(tx, Table::Payments, *id.as_uuid())
                        .await?
                        .ok_or_else(|| DomainError::not_found(format!("payment {id}")))?;
                    mutate(&mut payment)?;
                    payment.bump_version();
                    write_payment(tx, &payment).await?;
                    touched.insert(payment.expense_id());
                    committed.payments.push(payment);
                }
            }
        }

        for expense_id in touched {
            let expense: Expense = lock_row(tx, Table::Expenses, *expense_id.as_uuid())
                .await?
                .ok_or_else(|| DomainError::not_found(format!("expense {expense_id}")))?;
            let rows = sqlx::query("SELECT data FROM payments WHERE expense_id = $1 ORDER BY id ASC")
                .bind(expense_id.as_uuid())
                .fetch_all(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("settlement_check", e))?;
            let payments = rows.iter().map(decode).collect::<Result<Vec<Payment>, _>>()?;
            check_settlement(&expense, &payments)?;
        }

        Ok(committed)
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip(self), fields(account_id = %id), err)]
    async fn account(&self, id: AccountId) -> Result<Option<Account>, LedgerStoreError> {
        self.fetch_one_doc(Table::Accounts, *id.as_uuid()).await
    }

    #[instrument(skip(self), fields(expense_id = %id), err)]
    async fn expense(&self, id: ExpenseId) -> Result<Option<Expense>, LedgerStoreError> {
        self.fetch_one_doc(Table::Expenses, *id.as_uuid()).await
    }

    #[instrument(skip(self), fields(payment_id = %id), err)]
    async fn payment(&self, id: PaymentId) -> Result<Option<Payment>, LedgerStoreError> {
        self.fetch_one_doc(Table::Payments, *id.as_uuid()).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerStoreError> {
        self.fetch_all_docs(Table::Accounts).await
    }

    async fn list_expenses(&self) -> Result<Vec<Expense>, LedgerStoreError> {
        self.fetch_all_docs(Table::Expenses).await
    }

    #[instrument(skip(self), fields(expense_id = %id), err)]
    async fn payments_for_expense(&self, id: ExpenseId) -> Result<Vec<Payment>, LedgerStoreError> {
        let rows = sqlx::query("SELECT data FROM payments WHERE expense_id = $1 ORDER BY id ASC")
            .bind(id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("payments_for_expense", e))?;
        rows.iter().map(decode).collect()
    }

    #[instrument(skip(self, account), fields(account_id = %account.id_typed()), err)]
    async fn insert_account(&self, account: Account) -> Result<Account, LedgerStoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, account_number, version, data)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(account.id_typed().as_uuid())
        .bind(account.account_number())
        .bind(account.version() as i64)
        .bind(Json(&account))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;
        Ok(account)
    }

    #[instrument(skip(self, expense), fields(expense_id = %expense.id_typed()), err)]
    async fn insert_expense(&self, expense: Expense) -> Result<Expense, LedgerStoreError> {
        sqlx::query(
            r#"
            INSERT INTO expenses (id, status, version, data)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(expense.id_typed().as_uuid())
        .bind(expense.status().as_str())
        .bind(expense.version() as i64)
        .bind(Json(&expense))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_expense", e))?;
        Ok(expense)
    }

    #[instrument(
        skip(self, ops),
        fields(op_count = ops.len(), committed = tracing::field::Empty),
        err
    )]
    async fn atomic_update(&self, ops: Vec<WriteOp>) -> Result<Committed, LedgerStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        match Self::apply_ops(&mut tx, ops).await {
            Ok(committed) => {
                tx.commit()
                    .await
                    .map_err(|e| map_sqlx_error("commit_transaction", e))?;
                Span::current().record("committed", true);
                Ok(committed)
            }
            Err(err) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Table {
    Accounts,
    Expenses,
    Payments,
}

impl Table {
    fn name(self) -> &'static str {
        match self {
            Table::Accounts => "accounts",
            Table::Expenses => "expenses",
            Table::Payments => "payments",
        }
    }
}

async fn lock_row<T: DeserializeOwned>(
    tx: &mut Transaction<'_, Postgres>,
    table: Table,
    id: Uuid,
) -> Result<Option<T>, LedgerStoreError> {
    let row = sqlx::query(&format!(
        "SELECT data FROM {} WHERE id = $1 FOR UPDATE",
        table.name()
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_row", e))?;
    row.map(|r| decode(&r)).transpose()
}

async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment: &Payment,
) -> Result<(), LedgerStoreError> {
    sqlx::query(
        r#"
        INSERT INTO payments (id, expense_id, account_id, status, version, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(payment.id_typed().as_uuid())
    .bind(payment.expense_id().as_uuid())
    .bind(payment.account_id().as_uuid())
    .bind(payment.status().as_str())
    .bind(payment.version() as i64)
    .bind(Json(payment))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_payment", e))?;
    Ok(())
}

async fn write_account(
    tx: &mut Transaction<'_, Postgres>,
    account: &Account,
) -> Result<(), LedgerStoreError> {
    sqlx::query("UPDATE accounts SET version = $2, data = $3 WHERE id = $1")
        .bind(account.id_typed().as_uuid())
        .bind(account.version() as i64)
        .bind(Json(account))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_account", e))?;
    Ok(())
}

async fn write_expense(
    tx: &mut Transaction<'_, Postgres>,
    expense: &Expense,
) -> Result<(), LedgerStoreError> {
    sqlx::query("UPDATE expenses SET status = $2, version = $3, data = $4 WHERE id = $1")
        .bind(expense.id_typed().as_uuid())
        .bind(expense.status().as_str())
        .bind(expense.version() as i64)
        .bind(Json(expense))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_expense", e))?;
    Ok(())
}

async fn write_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment: &Payment,
) -> Result<(), LedgerStoreError> {
    sqlx::query("UPDATE payments SET status = $2, version = $3, data = $4 WHERE id = $1")
        .bind(payment.id_typed().as_uuid())
        .bind(payment.status().as_str())
        .bind(payment.version() as i64)
        .bind(Json(payment))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_payment", e))?;
    Ok(())
}

fn decode<T: DeserializeOwned>(row: &sqlx::postgres::PgRow) -> Result<T, LedgerStoreError> {
    let Json(value) = row
        .try_get::<Json<T>, _>("data")
        .map_err(|e| LedgerStoreError::Storage(format!("failed to decode row: {e}")))?;
    Ok(value)
}

/// Map SQLx errors to `LedgerStoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => LedgerStoreError::Conflict(msg),
                Some("23503") => LedgerStoreError::Rejected(DomainError::not_found(format!(
                    "record referenced in {operation}"
                ))),
                _ => LedgerStoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            LedgerStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => LedgerStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
