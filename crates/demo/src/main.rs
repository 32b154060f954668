//! Demo entry point.

use std::sync::Arc;

use aggregate_store::InMemoryAggregateStore;
use common::AggregateId;
use demo::accounts::{Account, AccountClosedNotice, CloseAccount, DepositMoney, OpenAccount, RequestStatement};
use demo::config::{Config, LogFormat};
use demo::read_model::{GetBalance, ListOwners};
use message_bus::InMemoryTransport;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> dispatch::Result<()> {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire collaborators
    let store = InMemoryAggregateStore::new();
    let transport = InMemoryTransport::new();
    let (dispatcher, _balances) =
        demo::account_dispatcher(store.clone(), Arc::new(transport.clone()), config.dispatch);

    // 4. Walk one account through its life
    let account_id = AggregateId::new();
    dispatcher
        .send_domain::<_, Account>(OpenAccount {
            account_id,
            owner: "alice".to_string(),
        })
        .await?;
    for amount in [100, 250] {
        dispatcher
            .send_domain::<_, Account>(DepositMoney {
                account_id,
                amount,
                expected_version: store.version_of(account_id).await,
            })
            .await?;
    }
    dispatcher.send(RequestStatement { account_id }).await?;

    let balance: Option<u64> = dispatcher.process(GetBalance { account_id }).await?;
    let owners: Vec<String> = dispatcher.process(ListOwners).await?;
    tracing::info!(%account_id, ?balance, ?owners, "account funded");

    // A zero deposit is rejected by the aggregate and nothing is stored.
    if let Err(error) = dispatcher
        .send_domain::<_, Account>(DepositMoney {
            account_id,
            amount: 0,
            expected_version: None,
        })
        .await
    {
        tracing::info!(%error, kind = error.kind(), "deposit rejected");
    }

    dispatcher
        .send_domain::<_, Account>(CloseAccount { account_id })
        .await?;
    dispatcher
        .dispatch_bus_message(AccountClosedNotice {
            account_id,
            final_balance: balance.unwrap_or_default(),
        })
        .await?;

    tracing::info!(
        events = store.event_count().await,
        notices = transport.sent_count(),
        "walkthrough finished"
    );
    tracing::debug!(metrics = %metrics_handle.render(), "metrics snapshot");

    Ok(())
}
