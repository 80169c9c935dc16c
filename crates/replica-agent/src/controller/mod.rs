//! Outbound link to the test controller.
//!
//! Every call the agent makes to the controller goes through the
//! [`ControllerTransport`] trait:
//!
//! | Call | Route | Body |
//! |---|---|---|
//! | `register_replica` | `/replica` | [`ReplicaRecord`] |
//! | `relay_message` | `/message` | [`Message`] |
//! | `publish_event` | `/event` | [`Event`] |
//! | `publish_log` | `/log` | [`LogRecord`] |
//!
//! [`HttpControllerTransport`] posts JSON over HTTP. [`MockControllerTransport`]
//! records calls in memory for tests.

pub mod http;
pub mod mock;

use crate::error::TransportError;
use crate::types::{Event, LogRecord, Message, ReplicaRecord};
use async_trait::async_trait;

pub use http::HttpControllerTransport;
pub use mock::{MockControllerTransport, RecordedCall};

/// Controller routes the agent posts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerRoute {
    Replica,
    Message,
    Event,
    Log,
}

impl ControllerRoute {
    pub fn path(&self) -> &'static str {
        match self {
            ControllerRoute::Replica => "/replica",
            ControllerRoute::Message => "/message",
            ControllerRoute::Event => "/event",
            ControllerRoute::Log => "/log",
        }
    }
}

/// Sends agent traffic to the controller.
///
/// Implementations must treat any non-success answer from the controller as an
/// error. Callers decide whether the error matters.
#[async_trait]
pub trait ControllerTransport: Send + Sync {
    async fn register_replica(&self, record: &ReplicaRecord) -> Result<(), TransportError>;

    async fn relay_message(&self, message: &Message) -> Result<(), TransportError>;

    async fn publish_event(&self, event: &Event) -> Result<(), TransportError>;

    async fn publish_log(&self, record: &LogRecord) -> Result<(), TransportError>;
}
