use serde::{Deserialize, Serialize};

use expenseflow_core::{AccountId, AggregateRoot, CurrencyCode, DomainError, DomainResult, Money};

/// Command: open a new account (administrative action).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAccount {
    pub name: String,
    pub account_number: String,
    pub balance: Money,
    pub currency: CurrencyCode,
}

/// Aggregate root: a balance-holding account that payments debit.
///
/// The balance is only ever lowered through [`Account::debit`], which refuses
/// to go below zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    name: String,
    account_number: String,
    balance: Money,
    currency: CurrencyCode,
    version: u64,
}

impl Account {
    pub fn open(id: AccountId, cmd: OpenAccount) -> DomainResult<Self> {
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("account name must not be empty"));
        }
        let account_number = cmd.account_number.trim();
        if account_number.is_empty() {
            return Err(DomainError::validation("account number must not be empty"));
        }

        Ok(Self {
            id,
            name: name.to_string(),
            account_number: account_number.to_string(),
            balance: cmd.balance,
            currency: cmd.currency,
            version: 1,
        })
    }

    pub fn id_typed(&self) -> AccountId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Fails with `InsufficientFunds` unless the balance covers `amount`.
    pub fn ensure_covers(&self, amount: Money) -> DomainResult<()> {
        if self.balance < amount {
            return Err(DomainError::insufficient_funds(format!(
                "account {} holds {} {}, needs {}",
                self.account_number, self.balance, self.currency, amount
            )));
        }
        Ok(())
    }

    /// Lower the balance by `amount`; returns the new balance.
    pub fn debit(&mut self, amount: Money) -> DomainResult<Money> {
        self.ensure_covers(amount)?;
        let next = self.balance.checked_sub(amount).ok_or_else(|| {
            DomainError::insufficient_funds(format!(
                "account {} cannot be debited {}",
                self.account_number, amount
            ))
        })?;
        self.balance = next;
        Ok(next)
    }
}

impl AggregateRoot for Account {
    type Id = AccountId;

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
