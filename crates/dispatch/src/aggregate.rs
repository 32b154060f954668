//! Aggregate root contract.

use aggregate_store::Version;
use common::AggregateId;
use serde::Serialize;

use crate::event::Event;

/// Ordered events an aggregate has raised but not yet handed to a store.
#[derive(Debug, Default)]
pub struct UncommittedEvents(Vec<Box<dyn Event>>);

impl UncommittedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(&mut self, event: impl Event) {
        self.0.push(Box::new(event));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the pending events in the order they were raised.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Event> {
        self.0.iter().map(|e| &**e)
    }

    /// Drains the sequence, leaving it empty.
    pub fn take(&mut self) -> Vec<Box<dyn Event>> {
        std::mem::take(&mut self.0)
    }
}

/// An entity whose mutations are expressed as an ordered event sequence.
///
/// Domain command handlers load an aggregate, apply the command and return
/// it with the resulting events still uncommitted. The dispatch core drains
/// those events, publishes them and then hands the aggregate's serialized
/// state to the store.
///
/// Keep the uncommitted events out of the serialized state, e.g. with
/// `#[serde(skip)]` on an [`UncommittedEvents`] field.
pub trait AggregateRoot: Serialize + Send + Sync + 'static {
    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    fn id(&self) -> AggregateId;

    /// Returns the version the aggregate had when it was loaded.
    ///
    /// Starts at 0 for a new aggregate; uncommitted events do not count.
    fn version(&self) -> Version;

    /// Returns the events raised since the aggregate was loaded.
    fn uncommitted_events(&self) -> &UncommittedEvents;

    /// Drains the events raised since the aggregate was loaded.
    fn take_uncommitted_events(&mut self) -> Vec<Box<dyn Event>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize)]
    struct Opened {
        owner: String,
    }

    impl Event for Opened {}

    #[derive(Debug, Serialize)]
    struct Deposited {
        amount: u64,
    }

    impl Event for Deposited {}

    #[derive(Debug, Default, Serialize)]
    struct Account {
        id: AggregateId,
        balance: u64,
        #[serde(skip)]
        version: Version,
        #[serde(skip)]
        pending: UncommittedEvents,
    }

    impl Account {
        fn deposit(&mut self, amount: u64) {
            self.balance += amount;
            self.pending.record(Deposited { amount });
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

    #[test]
    fn records_events_in_order() {
        let mut pending = UncommittedEvents::new();
        pending.record(Opened {
            owner: "alice".to_string(),
        });
        pending.record(Deposited { amount: 10 });

        let types: Vec<_> = pending.iter().map(|e| e.event_type()).collect();
        assert_eq!(types, ["Opened", "Deposited"]);
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn take_drains_the_sequence() {
        let mut account = Account::default();
        account.deposit(5);
        account.deposit(7);

        let events = account.take_uncommitted_events();

        assert_eq!(events.len(), 2);
        assert!(account.uncommitted_events().is_empty());
        assert_eq!(account.balance, 12);
    }

    #[test]
    fn pending_events_are_not_serialized() {
        let mut account = Account::default();
        account.deposit(3);

        let json = serde_json::to_value(&account).unwrap();

        assert_eq!(json["balance"], 3);
        assert!(json.get("pending").is_none());
    }
}
