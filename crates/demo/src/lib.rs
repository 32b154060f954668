//! Bank account walkthrough for the dispatch core.
//!
//! Wires an account aggregate, a balance read model and an outbound
//! notification queue into one [`Dispatcher`].

pub mod accounts;
pub mod config;
pub mod read_model;

use std::sync::Arc;

use aggregate_store::InMemoryAggregateStore;
use dispatch::{DispatchOptions, Dispatcher, HandlerRegistry};
use message_bus::{Destination, MessageTransport};

use accounts::{
    Account, AccountClosed, AccountClosedNotice, AccountHandler, AccountLoader, AccountOpened,
    CloseAccount, DepositMoney, MoneyDeposited, OpenAccount, RequestStatement, StatementRequested,
};
use read_model::{AccountBalances, GetBalance, ListOwners, StatementPrinter};

/// Queue that receives [`AccountClosedNotice`]s.
pub const ACCOUNT_NOTICES_QUEUE: &str = "account-notices";

/// Registers every account handler, subscriber and route.
pub fn account_registry(
    store: InMemoryAggregateStore,
    balances: AccountBalances,
    transport: Arc<dyn MessageTransport>,
) -> HandlerRegistry {
    let handler = AccountHandler::new(AccountLoader::new(store));

    HandlerRegistry::builder()
        .domain_command::<OpenAccount, Account, _>(handler.clone())
        .domain_command::<DepositMoney, Account, _>(handler.clone())
        .domain_command::<CloseAccount, Account, _>(handler.clone())
        .command::<RequestStatement, _>(handler)
        .subscriber::<AccountOpened, _>(balances.clone())
        .subscriber::<MoneyDeposited, _>(balances.clone())
        .subscriber::<AccountClosed, _>(balances.clone())
        .subscriber::<StatementRequested, _>(StatementPrinter)
        .query::<GetBalance, Option<u64>, _>(balances.clone())
        .query::<ListOwners, Vec<String>, _>(balances)
        .bus_message::<AccountClosedNotice>(Destination::queue(ACCOUNT_NOTICES_QUEUE), transport)
        .build()
}

/// Builds a dispatcher backed by `store` and `transport`.
pub fn account_dispatcher(
    store: InMemoryAggregateStore,
    transport: Arc<dyn MessageTransport>,
    options: DispatchOptions,
) -> (Dispatcher, AccountBalances) {
    let balances = AccountBalances::new();
    let registry = account_registry(store.clone(), balances.clone(), transport);
    (
        Dispatcher::new(registry, Arc::new(store), options),
        balances,
    )
}
