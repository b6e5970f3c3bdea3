//! Integration tests for the ledger consistency engine over the in-memory store.
//!
//! Tests: engine operation → atomic_update → stored accounts/expenses/payments
//!
//! Verifies:
//! - The prepare/confirm split keeps expense, payment and balance in agreement
//! - Rejected operations leave every record untouched
//! - Concurrent prepares on one expense commit exactly once

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use expenseflow_core::{AccountId, AggregateRoot, CurrencyCode, DomainError, Money, PaymentId};
    use expenseflow_expenses::{
        Account, Expense, ExpenseAction, ExpenseStatus, OpenAccount, PaymentStatus, SubmitExpense,
        check_settlement,
    };
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::ledger_engine::{EngineError, LedgerEngine};
    use crate::ledger_store::{InMemoryLedgerStore, LedgerStore, LedgerStoreError, WriteOp};

    type Engine = LedgerEngine<Arc<InMemoryLedgerStore>>;

    fn setup() -> Engine {
        LedgerEngine::new(Arc::new(InMemoryLedgerStore::new()))
    }

    fn money(v: Decimal) -> Money {
        Money::new(v).unwrap()
    }

    async fn open_account(engine: &Engine, balance: Decimal) -> Account {
        engine
            .open_account(OpenAccount {
                name: "BBVA Empresarial".to_string(),
                account_number: AccountId::new().to_string(),
                balance: money(balance),
                currency: CurrencyCode::default(),
            })
            .await
            .unwrap()
    }

    async fn draft_expense(engine: &Engine, amount: Decimal) -> Expense {
        engine
            .submit_expense(SubmitExpense {
                description: "Hospedaje Guadalajara".to_string(),
                amount: money(amount),
                category: "Viáticos".to_string(),
                date_incurred: None,
            })
            .await
            .unwrap()
    }

    async fn approved_expense(engine: &Engine, amount: Decimal) -> Expense {
        let e = draft_expense(engine, amount).await;
        engine.transition_expense(e.id_typed(), ExpenseAction::Send).await.unwrap();
        engine
            .transition_expense(e.id_typed(), ExpenseAction::Approve)
            .await
            .unwrap();
        engine.expense(e.id_typed()).await.unwrap()
    }

    async fn assert_settled(engine: &Engine, expense: &Expense) {
        let expense = engine.expense(expense.id_typed()).await.unwrap();
        let payments = engine.payments_for_expense(expense.id_typed()).await.unwrap();
        check_settlement(&expense, &payments).unwrap();
    }

    #[tokio::test]
    async fn full_payment_cycle_drains_account() {
        let engine = setup();
        let account = open_account(&engine, dec!(1000)).await;
        let expense = approved_expense(&engine, dec!(1000)).await;

        let payment = engine
            .prepare_payment(expense.id_typed(), account.id_typed())
            .await
            .unwrap();
        assert_eq!(payment.status(), PaymentStatus::Pending);
        assert_eq!(payment.amount(), money(dec!(1000)));
        assert!(payment.reference_code().starts_with("PAY-"));
        assert_eq!(
            engine.expense(expense.id_typed()).await.unwrap().status(),
            ExpenseStatus::InPayment
        );
        // Preparing does not move money.
        assert_eq!(
            engine.account(account.id_typed()).await.unwrap().balance(),
            money(dec!(1000))
        );

        let paid = engine.confirm_payment(payment.id_typed()).await.unwrap();
        assert_eq!(paid.status(), PaymentStatus::Paid);
        assert!(paid.payment_date().is_some());

        assert!(engine.account(account.id_typed()).await.unwrap().balance().is_zero());
        assert_eq!(
            engine.expense(expense.id_typed()).await.unwrap().status(),
            ExpenseStatus::Paid
        );
        assert_settled(&engine, &expense).await;
    }

    #[tokio::test]
    async fn prepare_without_funds_leaves_expense_approved() {
        let engine = setup();
        let account = open_account(&engine, dec!(500)).await;
        let expense = approved_expense(&engine, dec!(1000)).await;

        let err = engine
            .prepare_payment(expense.id_typed(), account.id_typed())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds(_)));

        let stored = engine.expense(expense.id_typed()).await.unwrap();
        assert_eq!(stored.status(), ExpenseStatus::Approved);
        assert_eq!(stored.version(), expense.version());
        assert!(engine.payments_for_expense(expense.id_typed()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn approving_a_draft_is_an_invalid_transition() {
        let engine = setup();
        let expense = draft_expense(&engine, dec!(250)).await;

        let err = engine
            .transition_expense(expense.id_typed(), ExpenseAction::Approve)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
        assert_eq!(
            engine.expense(expense.id_typed()).await.unwrap().status(),
            ExpenseStatus::Draft
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_prepares_commit_exactly_once() {
        let engine = Arc::new(setup());
        let account = open_account(&engine, dec!(5000)).await;
        let expense = approved_expense(&engine, dec!(1200)).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let engine = engine.clone();
            let (e, a) = (expense.id_typed(), account.id_typed());
            handles.push(tokio::spawn(async move { engine.prepare_payment(e, a).await }));
        }

        let mut ok = 0;
        let mut not_approved = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(EngineError::NotApproved(_)) => not_approved += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!((ok, not_approved), (1, 1));

        let payments = engine.payments_for_expense(expense.id_typed()).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_settled(&engine, &expense).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_concurrent_prepares_still_commit_once() {
        let engine = Arc::new(setup());
        let account = open_account(&engine, dec!(100)).await;
        let expense = approved_expense(&engine, dec!(10)).await;

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                let (e, a) = (expense.id_typed(), account.id_typed());
                tokio::spawn(async move { engine.prepare_payment(e, a).await })
            })
            .collect();

        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(engine.payments_for_expense(expense.id_typed()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn double_confirm_fails_with_invalid_state() {
        let engine = setup();
        let account = open_account(&engine, dec!(300)).await;
        let expense = approved_expense(&engine, dec!(100)).await;
        let payment = engine
            .prepare_payment(expense.id_typed(), account.id_typed())
            .await
            .unwrap();

        engine.confirm_payment(payment.id_typed()).await.unwrap();
        let err = engine.confirm_payment(payment.id_typed()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));

        // Debited once.
        assert_eq!(
            engine.account(account.id_typed()).await.unwrap().balance(),
            money(dec!(200))
        );
    }

    #[tokio::test]
    async fn prepare_cancel_prepare_issues_a_fresh_payment() {
        let engine = setup();
        let account = open_account(&engine, dec!(300)).await;
        let expense = approved_expense(&engine, dec!(100)).await;

        let first = engine
            .prepare_payment(expense.id_typed(), account.id_typed())
            .await
            .unwrap();
        let cancelled = engine.cancel_payment(first.id_typed()).await.unwrap();
        assert_eq!(cancelled.status(), PaymentStatus::Cancelled);
        assert_eq!(
            engine.expense(expense.id_typed()).await.unwrap().status(),
            ExpenseStatus::Approved
        );

        let second = engine
            .prepare_payment(expense.id_typed(), account.id_typed())
            .await
            .unwrap();
        assert_ne!(second.id_typed(), first.id_typed());
        assert_ne!(second.reference_code(), first.reference_code());
        assert_eq!(second.status(), PaymentStatus::Pending);

        let history = engine.payments_for_expense(expense.id_typed()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_settled(&engine, &expense).await;

        // A cancelled payment can be neither cancelled again nor confirmed.
        assert!(matches!(
            engine.cancel_payment(first.id_typed()).await.unwrap_err(),
            EngineError::InvalidState(_)
        ));
        assert!(matches!(
            engine.confirm_payment(first.id_typed()).await.unwrap_err(),
            EngineError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn cancel_after_confirm_is_refused() {
        let engine = setup();
        let account = open_account(&engine, dec!(100)).await;
        let expense = approved_expense(&engine, dec!(100)).await;
        let payment = engine
            .prepare_payment(expense.id_typed(), account.id_typed())
            .await
            .unwrap();
        engine.confirm_payment(payment.id_typed()).await.unwrap();

        match engine.cancel_payment(payment.id_typed()).await.unwrap_err() {
            EngineError::InvalidState(msg) => {
                assert!(msg.contains("only pending payments may be cancelled"))
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
        assert_eq!(
            engine.expense(expense.id_typed()).await.unwrap().status(),
            ExpenseStatus::Paid
        );
    }

    #[tokio::test]
    async fn confirm_rechecks_funds_drained_by_another_payment() {
        let engine = setup();
        let account = open_account(&engine, dec!(1000)).await;
        let first = approved_expense(&engine, dec!(800)).await;
        let second = approved_expense(&engine, dec!(800)).await;

        // Both prepares pass: each amount alone is covered.
        let p1 = engine
            .prepare_payment(first.id_typed(), account.id_typed())
            .await
            .unwrap();
        let p2 = engine
            .prepare_payment(second.id_typed(), account.id_typed())
            .await
            .unwrap();

        engine.confirm_payment(p1.id_typed()).await.unwrap();
        let err = engine.confirm_payment(p2.id_typed()).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds(_)));

        assert_eq!(
            engine.account(account.id_typed()).await.unwrap().balance(),
            money(dec!(200))
        );
        assert_eq!(
            engine.payment(p2.id_typed()).await.unwrap().status(),
            PaymentStatus::Pending
        );
        assert_eq!(
            engine.expense(second.id_typed()).await.unwrap().status(),
            ExpenseStatus::InPayment
        );
    }

    #[tokio::test]
    async fn debit_inside_the_commit_refuses_a_drained_account() {
        let engine = setup();
        let account = open_account(&engine, dec!(1000)).await;
        let first = approved_expense(&engine, dec!(800)).await;
        let second = approved_expense(&engine, dec!(800)).await;
        engine
            .prepare_payment(first.id_typed(), account.id_typed())
            .await
            .unwrap();
        let p2 = engine
            .prepare_payment(second.id_typed(), account.id_typed())
            .await
            .unwrap();
        let p1 = engine.payments_for_expense(first.id_typed()).await.unwrap().remove(0);
        engine.confirm_payment(p1.id_typed()).await.unwrap();

        let account_before = engine.account(account.id_typed()).await.unwrap();
        let expense_before = engine.expense(second.id_typed()).await.unwrap();
        let payment_before = engine.payment(p2.id_typed()).await.unwrap();

        // Same writes confirm_payment issues, without its pre-transaction funds check.
        let now = Utc::now();
        let amount = p2.amount();
        let err = engine
            .store()
            .atomic_update(vec![
                WriteOp::update_payment(p2.id_typed(), move |p| p.confirm(now)),
                WriteOp::update_expense(second.id_typed(), |e| e.settle()),
                WriteOp::update_account(account.id_typed(), move |a| a.debit(amount).map(|_| ())),
            ])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerStoreError::Rejected(DomainError::InsufficientFunds(_))
        ));
        assert!(matches!(EngineError::from(err), EngineError::InsufficientFunds(_)));

        let account_after = engine.account(account.id_typed()).await.unwrap();
        assert_eq!(account_after.balance(), money(dec!(200)));
        assert_eq!(account_after.version(), account_before.version());
        assert_eq!(engine.expense(second.id_typed()).await.unwrap(), expense_before);
        assert_eq!(engine.payment(p2.id_typed()).await.unwrap(), payment_before);
        assert_settled(&engine, &second).await;
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let engine = setup();
        let account = open_account(&engine, dec!(10)).await;
        let expense = approved_expense(&engine, dec!(10)).await;

        assert!(matches!(
            engine
                .prepare_payment(expenseflow_core::ExpenseId::new(), account.id_typed())
                .await
                .unwrap_err(),
            EngineError::NotFound(_)
        ));
        assert!(matches!(
            engine
                .prepare_payment(expense.id_typed(), AccountId::new())
                .await
                .unwrap_err(),
            EngineError::NotFound(_)
        ));
        assert!(matches!(
            engine.confirm_payment(PaymentId::new()).await.unwrap_err(),
            EngineError::NotFound(_)
        ));
        assert!(matches!(
            engine.cancel_payment(PaymentId::new()).await.unwrap_err(),
            EngineError::NotFound(_)
        ));
        assert!(matches!(
            engine
                .transition_expense(expenseflow_core::ExpenseId::new(), ExpenseAction::Send)
                .await
                .unwrap_err(),
            EngineError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn prepare_requires_approval() {
        let engine = setup();
        let account = open_account(&engine, dec!(10)).await;
        let expense = draft_expense(&engine, dec!(10)).await;
        engine.transition_expense(expense.id_typed(), ExpenseAction::Send).await.unwrap();

        let err = engine
            .prepare_payment(expense.id_typed(), account.id_typed())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotApproved(_)));
    }

    #[tokio::test]
    async fn engine_driven_actions_are_not_caller_facing() {
        let engine = setup();
        let expense = approved_expense(&engine, dec!(10)).await;

        let err = engine
            .transition_expense(expense.id_typed(), ExpenseAction::BeginPayment)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition(_)));
        assert_eq!(
            engine.expense(expense.id_typed()).await.unwrap().status(),
            ExpenseStatus::Approved
        );
    }

    #[tokio::test]
    async fn duplicate_account_number_is_a_conflict() {
        let engine = setup();
        let cmd = OpenAccount {
            name: "Caja".to_string(),
            account_number: "CAJA-01".to_string(),
            balance: Money::zero(),
            currency: CurrencyCode::default(),
        };
        engine.open_account(cmd.clone()).await.unwrap();
        let err = engine.open_account(cmd).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert_eq!(engine.accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listings_follow_creation_order() {
        let engine = setup();
        let a = draft_expense(&engine, dec!(1)).await;
        let b = draft_expense(&engine, dec!(2)).await;
        let ids: Vec<_> = engine
            .expenses()
            .await
            .unwrap()
            .iter()
            .map(|e| e.id_typed())
            .collect();
        assert_eq!(ids, vec![a.id_typed(), b.id_typed()]);
        assert!(engine.store().list_accounts().await.unwrap().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn confirm_debits_exactly_the_amount(
            balance_cents in 0u64..10_000_000,
            amount_cents in 1u64..10_000_000,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let engine = setup();
                let balance = Decimal::new(balance_cents as i64, 2);
                let amount = Decimal::new(amount_cents as i64, 2);
                let account = open_account(&engine, balance).await;
                let expense = approved_expense(&engine, amount).await;

                match engine.prepare_payment(expense.id_typed(), account.id_typed()).await {
                    Ok(p) => {
                        prop_assert!(amount <= balance);
                        engine.confirm_payment(p.id_typed()).await.unwrap();
                        let after = engine.account(account.id_typed()).await.unwrap().balance();
                        prop_assert_eq!(after.amount(), balance - amount);
                        prop_assert!(after.amount() >= Decimal::ZERO);
                    }
                    Err(EngineError::InsufficientFunds(_)) => {
                        prop_assert!(amount > balance);
                        let after = engine.account(account.id_typed()).await.unwrap().balance();
                        prop_assert_eq!(after.amount(), balance);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
