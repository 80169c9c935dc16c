//! Fire-and-forget reporting to the controller.
//!
//! Telemetry is lossy: failures are logged locally and never returned, and the
//! `_async` variants give no ordering guarantee relative to their caller.

use crate::controller::ControllerTransport;
use crate::types::{Event, EventType, LogRecord, ReplicaId};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Publishes events and controller-side log records on behalf of one replica.
#[derive(Clone)]
pub struct Telemetry {
    replica: ReplicaId,
    transport: Arc<dyn ControllerTransport>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("replica", &self.replica)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    pub fn new(replica: ReplicaId, transport: Arc<dyn ControllerTransport>) -> Self {
        Self { replica, transport }
    }

    /// Builds an event stamped with the current UTC time.
    pub fn event(&self, event_type: EventType, params: HashMap<String, String>) -> Event {
        Event {
            event_type,
            replica: self.replica.clone(),
            params,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Sends an event and waits for the attempt to finish.
    pub async fn publish_event(&self, event_type: EventType, params: HashMap<String, String>) {
        let event = self.event(event_type, params);
        if let Err(e) = self.transport.publish_event(&event).await {
            warn!(replica = %self.replica, event = %event_type, error = %e, "Failed to publish event");
        }
    }

    /// Sends an event from a detached task.
    pub fn publish_event_async(&self, event_type: EventType, params: HashMap<String, String>) {
        let telemetry = self.clone();
        spawn_detached(async move {
            telemetry.publish_event(event_type, params).await;
        });
    }

    /// Posts a log record to the controller.
    pub async fn log(&self, params: Map<String, Value>, message: impl Into<String>) {
        let record = LogRecord {
            replica: self.replica.clone(),
            message: message.into(),
            params,
            timestamp: chrono::Utc::now().timestamp(),
        };
        if let Err(e) = self.transport.publish_log(&record).await {
            warn!(replica = %self.replica, error = %e, "Failed to publish log record");
        }
    }

    pub fn log_async(&self, params: Map<String, Value>, message: impl Into<String>) {
        let telemetry = self.clone();
        let message = message.into();
        spawn_detached(async move {
            telemetry.log(params, message).await;
        });
    }
}

/// Runs `future` on the current runtime without keeping a handle to it.
pub(crate) fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => warn!("No async runtime available, dropping background task"),
    }
}

/// Builds event parameters from key/value pairs.
pub(crate) fn params<const N: usize>(pairs: [(&str, String); N]) -> HashMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
