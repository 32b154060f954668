//! End-to-end tests for the account walkthrough.

use std::sync::Arc;

use aggregate_store::{InMemoryAggregateStore, StoreError, Version};
use common::AggregateId;
use demo::accounts::{
    Account, AccountClosedNotice, AccountError, CloseAccount, DepositMoney, OpenAccount,
    RequestStatement,
};
use demo::read_model::{GetBalance, ListOwners};
use demo::{ACCOUNT_NOTICES_QUEUE, account_dispatcher};
use dispatch::{DispatchError, DispatchOptions, Dispatcher};
use message_bus::{Destination, InMemoryTransport};

struct Harness {
    dispatcher: Dispatcher,
    store: InMemoryAggregateStore,
    transport: InMemoryTransport,
}

fn harness(options: DispatchOptions) -> Harness {
    let store = InMemoryAggregateStore::new();
    let transport = InMemoryTransport::new();
    let (dispatcher, _balances) =
        account_dispatcher(store.clone(), Arc::new(transport.clone()), options);
    Harness {
        dispatcher,
        store,
        transport,
    }
}

async fn open(h: &Harness, owner: &str) -> AggregateId {
    let account_id = AggregateId::new();
    h.dispatcher
        .send_domain::<_, Account>(OpenAccount {
            account_id,
            owner: owner.to_string(),
        })
        .await
        .unwrap();
    account_id
}

async fn deposit(h: &Harness, account_id: AggregateId, amount: u64) -> dispatch::Result<()> {
    h.dispatcher
        .send_domain::<_, Account>(DepositMoney {
            account_id,
            amount,
            expected_version: None,
        })
        .await
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn deposits_update_store_and_read_model() {
        let h = harness(DispatchOptions::default());
        let account_id = open(&h, "alice").await;

        deposit(&h, account_id, 100).await.unwrap();
        deposit(&h, account_id, 50).await.unwrap();

        let balance: Option<u64> = h
            .dispatcher
            .process(GetBalance { account_id })
            .await
            .unwrap();
        assert_eq!(balance, Some(150));
        assert_eq!(h.store.version_of(account_id).await, Some(Version::new(3)));
        assert_eq!(h.store.commands_for(account_id).await.len(), 3);
    }

    #[tokio::test]
    async fn closing_removes_the_account_from_the_read_model() {
        let h = harness(DispatchOptions::default());
        let alice = open(&h, "alice").await;
        open(&h, "bob").await;

        h.dispatcher
            .send_domain::<_, Account>(CloseAccount { account_id: alice })
            .await
            .unwrap();
        h.dispatcher
            .dispatch_bus_message(AccountClosedNotice {
                account_id: alice,
                final_balance: 0,
            })
            .await
            .unwrap();

        let owners: Vec<String> = h.dispatcher.process(ListOwners).await.unwrap();
        assert_eq!(owners, ["bob"]);

        let notices = h.transport.sent_to(&Destination::queue(ACCOUNT_NOTICES_QUEUE));
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].properties["source"], "demo");
    }

    #[tokio::test]
    async fn statement_for_unknown_account_fails_in_handler() {
        let h = harness(DispatchOptions::default());

        let err = h
            .dispatcher
            .send(RequestStatement {
                account_id: AggregateId::new(),
            })
            .await
            .unwrap_err();

        match err {
            DispatchError::Handler { source, .. } => {
                assert!(source.downcast_ref::<AccountError>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

mod rules {
    use super::*;

    #[tokio::test]
    async fn opening_twice_is_rejected() {
        let h = harness(DispatchOptions::default());
        let account_id = open(&h, "alice").await;

        let err = h
            .dispatcher
            .send_domain::<_, Account>(OpenAccount {
                account_id,
                owner: "mallory".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "handler");
        assert_eq!(h.store.event_count().await, 1);
    }

    #[tokio::test]
    async fn stale_deposit_conflicts() {
        let h = harness(DispatchOptions::default());
        let account_id = open(&h, "alice").await;
        deposit(&h, account_id, 10).await.unwrap();

        let err = h
            .dispatcher
            .send_domain::<_, Account>(DepositMoney {
                account_id,
                amount: 10,
                expected_version: Some(Version::first()),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Persistence(StoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn read_model_stays_empty_when_publishing_is_disabled() {
        let h = harness(DispatchOptions::default().with_publish_events(false));
        let account_id = open(&h, "alice").await;

        let balance: Option<u64> = h
            .dispatcher
            .process(GetBalance { account_id })
            .await
            .unwrap();

        assert_eq!(balance, None);
        assert_eq!(h.store.event_count().await, 1);
    }
}
