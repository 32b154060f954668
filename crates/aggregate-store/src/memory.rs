use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, AggregateRecord, CommandRecord, EventEnvelope, Result, StoreError, Version,
    store::{AggregateStore, validate_record},
};

/// Latest persisted state of one aggregate.
#[derive(Debug, Clone)]
pub struct StoredAggregate {
    pub aggregate_type: String,
    pub version: Version,
    pub state: serde_json::Value,
}

#[derive(Debug, Default)]
struct InMemoryState {
    aggregates: HashMap<AggregateId, StoredAggregate>,
    events: Vec<EventEnvelope>,
    commands: Vec<CommandRecord>,
    saves: usize,
    fail_on_save: bool,
}

/// In-memory aggregate store for testing.
///
/// Applies a record atomically under a single write lock and enforces the
/// same version rules a database-backed store would.
#[derive(Clone, Default)]
pub struct InMemoryAggregateStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryAggregateStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to reject every subsequent save.
    pub async fn set_fail_on_save(&self, fail: bool) {
        self.state.write().await.fail_on_save = fail;
    }

    /// Returns the number of successful saves.
    pub async fn save_count(&self) -> usize {
        self.state.read().await.saves
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    /// Returns the stored events of one aggregate in version order.
    pub async fn events_for(&self, aggregate_id: AggregateId) -> Vec<EventEnvelope> {
        let state = self.state.read().await;
        let mut events: Vec<_> = state
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);
        events
    }

    /// Returns the latest saved state of an aggregate.
    pub async fn aggregate(&self, aggregate_id: AggregateId) -> Option<StoredAggregate> {
        self.state.read().await.aggregates.get(&aggregate_id).cloned()
    }

    /// Returns the stored version of an aggregate, if it was ever saved.
    pub async fn version_of(&self, aggregate_id: AggregateId) -> Option<Version> {
        self.state
            .read()
            .await
            .aggregates
            .get(&aggregate_id)
            .map(|a| a.version)
    }

    /// Returns the saved command data of one aggregate, oldest first.
    pub async fn commands_for(&self, aggregate_id: AggregateId) -> Vec<CommandRecord> {
        self.state
            .read()
            .await
            .commands
            .iter()
            .filter(|c| c.aggregate_id == aggregate_id)
            .cloned()
            .collect()
    }

    /// Clears all aggregates, events and commands.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.aggregates.clear();
        state.events.clear();
        state.commands.clear();
        state.saves = 0;
    }
}

#[async_trait]
impl AggregateStore for InMemoryAggregateStore {
    #[tracing::instrument(
        skip(self, record),
        fields(aggregate_id = %record.aggregate_id, aggregate_type = %record.aggregate_type)
    )]
    async fn save(&self, record: AggregateRecord) -> Result<()> {
        validate_record(&record)?;

        let mut state = self.state.write().await;

        if state.fail_on_save {
            return Err(StoreError::Unavailable("store rejected the save".to_string()));
        }

        let aggregate_id = record.aggregate_id;
        let current_version = state
            .aggregates
            .get(&aggregate_id)
            .map(|a| a.version)
            .unwrap_or(Version::initial());

        if let Some(expected) = record.expected_version
            && current_version != expected
        {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current_version,
            });
        }

        // Unique (aggregate, version) constraint simulation
        if record.base_version != current_version {
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id,
                expected: record.base_version,
                actual: current_version,
            });
        }

        let new_version = record.new_version();
        state.aggregates.insert(
            aggregate_id,
            StoredAggregate {
                aggregate_type: record.aggregate_type,
                version: new_version,
                state: record.state,
            },
        );
        state.events.extend(record.events);
        if let Some(command) = record.command {
            state.commands.push(command);
        }
        state.saves += 1;

        metrics::counter!("aggregate_store_saves_total").increment(1);
        tracing::debug!(version = %new_version, "aggregate saved");

        Ok(())
    }
}
