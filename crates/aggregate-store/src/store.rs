use async_trait::async_trait;

use crate::{AggregateRecord, Result, StoreError};

/// Persists aggregate state together with its event history.
///
/// Implementations must save a record atomically: either the new state, all
/// of its events and the optional command data are stored, or nothing is.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Saves one aggregate change.
    ///
    /// Fails with [`StoreError::ConcurrencyConflict`] when
    /// `record.expected_version` is set and does not match the stored version.
    async fn save(&self, record: AggregateRecord) -> Result<()>;
}

/// Checks that a record is internally consistent before it is saved.
pub fn validate_record(record: &AggregateRecord) -> Result<()> {
    let mut expected_version = record.base_version;
    for event in &record.events {
        if event.aggregate_id != record.aggregate_id {
            return Err(StoreError::InvalidRecord(
                "All events must be for the saved aggregate".to_string(),
            ));
        }
        if event.aggregate_type != record.aggregate_type {
            return Err(StoreError::InvalidRecord(
                "All events must have the saved aggregate type".to_string(),
            ));
        }
        expected_version = expected_version.advance(1);
        if event.version != expected_version {
            return Err(StoreError::InvalidRecord(format!(
                "Event versions must be sequential. Expected {}, got {}",
                expected_version, event.version
            )));
        }
    }

    if let Some(command) = &record.command
        && command.aggregate_id != record.aggregate_id
    {
        return Err(StoreError::InvalidRecord(
            "Command data must target the saved aggregate".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AggregateId, EventEnvelope, Version};

    fn event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::new(
            aggregate_id,
            "Account",
            Version::new(version),
            "Deposited",
            serde_json::json!({"amount": 10}),
        )
    }

    #[test]
    fn accepts_sequential_events() {
        let id = AggregateId::new();
        let record = AggregateRecord::new(id, "Account", Version::new(1), serde_json::json!({}))
            .with_events(vec![event(id, 2), event(id, 3)]);
        assert!(validate_record(&record).is_ok());
    }

    #[test]
    fn accepts_record_without_events() {
        let record = AggregateRecord::new(
            AggregateId::new(),
            "Account",
            Version::initial(),
            serde_json::json!({}),
        );
        assert!(validate_record(&record).is_ok());
    }

    #[test]
    fn rejects_version_gap() {
        let id = AggregateId::new();
        let record = AggregateRecord::new(id, "Account", Version::initial(), serde_json::json!({}))
            .with_events(vec![event(id, 1), event(id, 3)]);
        assert!(matches!(
            validate_record(&record),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn rejects_foreign_event() {
        let id = AggregateId::new();
        let record = AggregateRecord::new(id, "Account", Version::initial(), serde_json::json!({}))
            .with_events(vec![event(AggregateId::new(), 1)]);
        assert!(validate_record(&record).is_err());
    }
}
