//! HTTP implementation of [`ControllerTransport`].

use super::{ControllerRoute, ControllerTransport};
use crate::error::TransportError;
use crate::types::{Event, LogRecord, Message, ReplicaRecord};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Posts JSON bodies to `http://<controller-addr><route>`. Anything but a
/// 200 answer is an error.
#[derive(Debug, Clone)]
pub struct HttpControllerTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpControllerTransport {
    /// Creates a transport for the controller at `base_url`
    /// (e.g. `http://ctrl:9000`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(timeout)
            .build()
            .map_err(|source| TransportError::Request {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: ControllerRoute) -> String {
        format!("{}{}", self.base_url, route.path())
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        route: ControllerRoute,
        body: &T,
    ) -> Result<(), TransportError> {
        let url = self.url(route);
        let body = serde_json::to_vec(body)?;

        debug!(url = %url, bytes = body.len(), "Posting to controller");

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TransportError::Status { url, status });
        }
        Ok(())
    }
}

#[async_trait]
impl ControllerTransport for HttpControllerTransport {
    async fn register_replica(&self, record: &ReplicaRecord) -> Result<(), TransportError> {
        self.post(ControllerRoute::Replica, record).await
    }

    async fn relay_message(&self, message: &Message) -> Result<(), TransportError> {
        self.post(ControllerRoute::Message, message).await
    }

    async fn publish_event(&self, event: &Event) -> Result<(), TransportError> {
        self.post(ControllerRoute::Event, event).await
    }

    async fn publish_log(&self, record: &LogRecord) -> Result<(), TransportError> {
        self.post(ControllerRoute::Log, record).await
    }
}
