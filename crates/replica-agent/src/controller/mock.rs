//! In-memory [`ControllerTransport`] that records every call.
//!
//! ```rust
//! use replica_agent::controller::{ControllerTransport, MockControllerTransport};
//! use replica_agent::types::ReplicaRecord;
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = MockControllerTransport::new();
//!     let record = ReplicaRecord {
//!         id: "r1".into(),
//!         info: Default::default(),
//!         addr: ":8001".to_string(),
//!         ready: true,
//!     };
//!     transport.register_replica(&record).await.unwrap();
//!     assert_eq!(transport.registrations().len(), 1);
//! }
//! ```

use super::{ControllerRoute, ControllerTransport};
use crate::error::TransportError;
use crate::types::{Event, LogRecord, Message, ReplicaRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// One call made against the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Register(ReplicaRecord),
    Relay(Message),
    Event(Event),
    Log(LogRecord),
}

impl RecordedCall {
    pub fn route(&self) -> ControllerRoute {
        match self {
            RecordedCall::Register(_) => ControllerRoute::Replica,
            RecordedCall::Relay(_) => ControllerRoute::Message,
            RecordedCall::Event(_) => ControllerRoute::Event,
            RecordedCall::Log(_) => ControllerRoute::Log,
        }
    }
}

/// Recording transport. Cloning shares the recorded calls.
///
/// Routes can be made to fail with [`fail_route`](Self::fail_route); failed
/// calls are not recorded.
#[derive(Debug, Clone, Default)]
pub struct MockControllerTransport {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    failing: Arc<Mutex<HashSet<ControllerRoute>>>,
}

impl MockControllerTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_route(&self, route: ControllerRoute) {
        self.failing.lock().insert(route);
    }

    pub fn restore_route(&self, route: ControllerRoute) {
        self.failing.lock().remove(&route);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn registrations(&self) -> Vec<ReplicaRecord> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Register(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn relayed(&self) -> Vec<Message> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Relay(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Event(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Log(l) => Some(l.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RecordedCall) -> Result<(), TransportError> {
        let route = call.route();
        if self.failing.lock().contains(&route) {
            return Err(TransportError::Unavailable(route.path().to_string()));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl ControllerTransport for MockControllerTransport {
    async fn register_replica(&self, record: &ReplicaRecord) -> Result<(), TransportError> {
        self.record(RecordedCall::Register(record.clone()))
    }

    async fn relay_message(&self, message: &Message) -> Result<(), TransportError> {
        self.record(RecordedCall::Relay(message.clone()))
    }

    async fn publish_event(&self, event: &Event) -> Result<(), TransportError> {
        self.record(RecordedCall::Event(event.clone()))
    }

    async fn publish_log(&self, record: &LogRecord) -> Result<(), TransportError> {
        self.record(RecordedCall::Log(record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message {
            id: "r1_r2_0".into(),
            message_type: "vote".to_string(),
            from: "r1".into(),
            to: "r2".into(),
            data: vec![],
            intercept: false,
        }
    }

    #[tokio::test]
    async fn test_records_in_order() {
        let transport = MockControllerTransport::new();
        transport.relay_message(&message()).await.unwrap();
        transport.relay_message(&message()).await.unwrap();

        assert_eq!(transport.calls().len(), 2);
        assert_eq!(transport.relayed().len(), 2);
        assert!(transport.events().is_empty());
    }

    #[tokio::test]
    async fn test_failing_route() {
        let transport = MockControllerTransport::new();
        transport.fail_route(ControllerRoute::Message);

        let err = transport.relay_message(&message()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(ref r) if r == "/message"));
        assert!(transport.calls().is_empty());

        transport.restore_route(ControllerRoute::Message);
        transport.relay_message(&message()).await.unwrap();
        assert_eq!(transport.relayed().len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_calls() {
        let transport = MockControllerTransport::new();
        let other = transport.clone();
        other.relay_message(&message()).await.unwrap();
        assert_eq!(transport.relayed().len(), 1);
    }
}
