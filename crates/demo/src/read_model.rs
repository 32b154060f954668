//! Account balance read model fed by account events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use dispatch::{BoxError, EventMetadata, EventSubscriber, Query, QueryHandler};
use tokio::sync::RwLock;

use crate::accounts::{AccountClosed, AccountOpened, MoneyDeposited, StatementRequested};

/// Looks up the balance of one open account.
#[derive(Debug, Clone)]
pub struct GetBalance {
    pub account_id: AggregateId,
}

impl Query for GetBalance {}

/// Lists the owners of all open accounts.
#[derive(Debug, Clone)]
pub struct ListOwners;

impl Query for ListOwners {}

#[derive(Debug, Clone)]
struct BalanceRow {
    owner: String,
    balance: u64,
}

/// In-memory projection of open account balances.
#[derive(Clone, Default)]
pub struct AccountBalances {
    rows: Arc<RwLock<HashMap<AggregateId, BalanceRow>>>,
}

impl AccountBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account_count(&self) -> usize {
        self.rows.read().await.len()
    }
}

fn account_of(metadata: Option<&EventMetadata>) -> Result<AggregateId, BoxError> {
    metadata
        .map(|m| m.aggregate_id)
        .ok_or_else(|| "account event without aggregate metadata".into())
}

#[async_trait]
impl EventSubscriber<AccountOpened> for AccountBalances {
    async fn handle(
        &self,
        event: &AccountOpened,
        metadata: Option<&EventMetadata>,
    ) -> Result<(), BoxError> {
        let id = account_of(metadata)?;
        self.rows.write().await.insert(
            id,
            BalanceRow {
                owner: event.owner.clone(),
                balance: 0,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber<MoneyDeposited> for AccountBalances {
    async fn handle(
        &self,
        event: &MoneyDeposited,
        metadata: Option<&EventMetadata>,
    ) -> Result<(), BoxError> {
        let id = account_of(metadata)?;
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| format!("no balance row for account {id}"))?;
        row.balance += event.amount;
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber<AccountClosed> for AccountBalances {
    async fn handle(
        &self,
        _event: &AccountClosed,
        metadata: Option<&EventMetadata>,
    ) -> Result<(), BoxError> {
        let id = account_of(metadata)?;
        self.rows.write().await.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl QueryHandler<GetBalance, Option<u64>> for AccountBalances {
    async fn handle(&self, query: &GetBalance) -> Result<Option<u64>, BoxError> {
        Ok(self
            .rows
            .read()
            .await
            .get(&query.account_id)
            .map(|row| row.balance))
    }
}

#[async_trait]
impl QueryHandler<ListOwners, Vec<String>> for AccountBalances {
    async fn handle(&self, _query: &ListOwners) -> Result<Vec<String>, BoxError> {
        let mut owners: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .map(|row| row.owner.clone())
            .collect();
        owners.sort();
        Ok(owners)
    }
}

/// Logs requested statements.
pub struct StatementPrinter;

#[async_trait]
impl EventSubscriber<StatementRequested> for StatementPrinter {
    async fn handle(
        &self,
        event: &StatementRequested,
        _metadata: Option<&EventMetadata>,
    ) -> Result<(), BoxError> {
        tracing::info!(account_id = %event.account_id, "statement requested");
        Ok(())
    }
}
