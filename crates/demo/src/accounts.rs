//! Bank account aggregate, its commands and handlers.

use aggregate_store::{InMemoryAggregateStore, Version};
use async_trait::async_trait;
use common::AggregateId;
use dispatch::{
    AggregateRoot, BoxError, BusMessage, Command, CommandHandler, DomainCommand,
    DomainCommandHandler, Event, UncommittedEvents,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Business rule violations raised by account handlers.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account {0} not found")]
    NotFound(AggregateId),

    #[error("Account {0} already exists")]
    AlreadyOpen(AggregateId),

    #[error("Account {0} is closed")]
    Closed(AggregateId),

    #[error("Deposit amount must be positive")]
    InvalidAmount,

    #[error("Stored account state is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

// Events

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountOpened {
    pub owner: String,
}

impl Event for AccountOpened {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyDeposited {
    pub amount: u64,
}

impl Event for MoneyDeposited {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountClosed {
    pub final_balance: u64,
}

impl Event for AccountClosed {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementRequested {
    pub account_id: AggregateId,
}

impl Event for StatementRequested {}

/// A bank account.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Account {
    id: AggregateId,
    owner: String,
    balance: u64,
    closed: bool,
    #[serde(skip)]
    version: Version,
    #[serde(skip)]
    pending: UncommittedEvents,
}

impl Account {
    /// Opens a new account.
    pub fn open(id: AggregateId, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        let mut account = Self {
            id,
            owner: owner.clone(),
            ..Self::default()
        };
        account.pending.record(AccountOpened { owner });
        account
    }

    pub fn deposit(&mut self, amount: u64) -> Result<(), AccountError> {
        if self.closed {
            return Err(AccountError::Closed(self.id));
        }
        if amount == 0 {
            return Err(AccountError::InvalidAmount);
        }
        self.balance += amount;
        self.pending.record(MoneyDeposited { amount });
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), AccountError> {
        if self.closed {
            return Err(AccountError::Closed(self.id));
        }
        self.closed = true;
        self.pending.record(AccountClosed {
            final_balance: self.balance,
        });
        Ok(())
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl AggregateRoot for Account {
    fn aggregate_type() -> &'static str {
        "Account"
    }

    fn id(&self) -> AggregateId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn uncommitted_events(&self) -> &UncommittedEvents {
        &self.pending
    }

    fn take_uncommitted_events(&mut self) -> Vec<Box<dyn Event>> {
        self.pending.take()
    }
}

// Commands

#[derive(Debug, Clone, Serialize)]
pub struct OpenAccount {
    pub account_id: AggregateId,
    pub owner: String,
}

impl Command for OpenAccount {}

impl DomainCommand for OpenAccount {
    fn aggregate_id(&self) -> AggregateId {
        self.account_id
    }

    fn expected_version(&self) -> Option<Version> {
        Some(Version::initial())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositMoney {
    pub account_id: AggregateId,
    pub amount: u64,
    #[serde(skip)]
    pub expected_version: Option<Version>,
}

impl Command for DepositMoney {}

impl DomainCommand for DepositMoney {
    fn aggregate_id(&self) -> AggregateId {
        self.account_id
    }

    fn expected_version(&self) -> Option<Version> {
        self.expected_version
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseAccount {
    pub account_id: AggregateId,
}

impl Command for CloseAccount {}

impl DomainCommand for CloseAccount {
    fn aggregate_id(&self) -> AggregateId {
        self.account_id
    }
}

/// Asks for a statement; handled without touching the aggregate.
#[derive(Debug, Clone)]
pub struct RequestStatement {
    pub account_id: AggregateId,
}

impl Command for RequestStatement {}

/// Notice sent to other services once an account is closed.
#[derive(Debug, Clone, Serialize)]
pub struct AccountClosedNotice {
    pub account_id: AggregateId,
    pub final_balance: u64,
}

impl BusMessage for AccountClosedNotice {
    fn properties(&self) -> std::collections::HashMap<String, String> {
        std::collections::HashMap::from([("source".to_string(), "demo".to_string())])
    }
}

// Handlers

/// Loads accounts from the aggregate store's latest saved state.
#[derive(Clone)]
pub struct AccountLoader {
    store: InMemoryAggregateStore,
}

impl AccountLoader {
    pub fn new(store: InMemoryAggregateStore) -> Self {
        Self { store }
    }

    pub async fn load(&self, id: AggregateId) -> Result<Option<Account>, AccountError> {
        let Some(stored) = self.store.aggregate(id).await else {
            return Ok(None);
        };
        let mut account: Account = serde_json::from_value(stored.state)?;
        account.version = stored.version;
        Ok(Some(account))
    }

    async fn load_existing(&self, id: AggregateId) -> Result<Account, AccountError> {
        self.load(id).await?.ok_or(AccountError::NotFound(id))
    }
}

/// Handles every account command.
#[derive(Clone)]
pub struct AccountHandler {
    loader: AccountLoader,
}

impl AccountHandler {
    pub fn new(loader: AccountLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl DomainCommandHandler<OpenAccount, Account> for AccountHandler {
    async fn handle(&self, command: &OpenAccount) -> Result<Account, BoxError> {
        if self.loader.load(command.account_id).await?.is_some() {
            return Err(AccountError::AlreadyOpen(command.account_id).into());
        }
        Ok(Account::open(command.account_id, command.owner.clone()))
    }
}

#[async_trait]
impl DomainCommandHandler<DepositMoney, Account> for AccountHandler {
    async fn handle(&self, command: &DepositMoney) -> Result<Account, BoxError> {
        let mut account = self.loader.load_existing(command.account_id).await?;
        account.deposit(command.amount)?;
        Ok(account)
    }
}

#[async_trait]
impl DomainCommandHandler<CloseAccount, Account> for AccountHandler {
    async fn handle(&self, command: &CloseAccount) -> Result<Account, BoxError> {
        let mut account = self.loader.load_existing(command.account_id).await?;
        account.close()?;
        Ok(account)
    }
}

#[async_trait]
impl CommandHandler<RequestStatement> for AccountHandler {
    async fn handle(&self, command: &RequestStatement) -> Result<Vec<Box<dyn Event>>, BoxError> {
        self.loader.load_existing(command.account_id).await?;
        Ok(vec![Box::new(StatementRequested {
            account_id: command.account_id,
        })])
    }
}
