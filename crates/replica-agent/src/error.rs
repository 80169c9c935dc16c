//! Error types for the replica agent.
//!
//! # Error Hierarchy
//!
//! ```text
//! AgentError (top-level)
//! ├── Config(ConfigError)
//! ├── Transport(TransportError)
//! ├── Directive(DirectiveError)
//! ├── Stopped
//! ├── Stopping
//! ├── Bind { addr, source }
//! ├── Server(String)
//! └── ShutdownTimeout(Duration)
//! ```
//!
//! Synchronous operations return these to their immediate caller. Fire-and-forget
//! work (telemetry, controller logs, readiness re-registration) never surfaces
//! an error; failures there are logged and dropped.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Top-level error type for the replica agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Invalid or missing configuration. Returned from construction only.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Outbound call to the controller failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A controller directive could not be carried out.
    #[error("Directive error: {0}")]
    Directive(#[from] DirectiveError),

    /// The agent has been stopped; outbound sends fail fast.
    #[error("agent stopped")]
    Stopped,

    /// `start` was called while a `stop` is still draining the listener.
    #[error("agent is still stopping")]
    Stopping,

    /// The inbound listener could not bind its address.
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The inbound listener exited with an error.
    #[error("Listener error: {0}")]
    Server(String),

    /// Graceful shutdown of the listener did not finish in time.
    #[error("Listener did not shut down within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Configuration errors, detected once when the agent is constructed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("replica ID config should not be empty")]
    MissingReplicaId,

    #[error("controller address should not be empty")]
    MissingControllerAddr,

    #[error("listen address should not be empty")]
    MissingListenAddr,

    #[error("invalid listen address {addr}: {reason}")]
    InvalidListenAddr { addr: String, reason: String },

    /// Config file could not be read.
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Environment variable has an unusable value.
    #[error("invalid environment variable {var}: {reason}")]
    Env { var: String, reason: String },
}

/// Errors talking to the controller.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request could not be sent or the connection failed.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The controller answered with anything other than 200.
    #[error("controller returned {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// The outbound body could not be encoded.
    #[error("failed to encode body: {0}")]
    Encode(#[from] serde_json::Error),

    /// Failure injected on a route of
    /// [`MockControllerTransport`](crate::controller::MockControllerTransport).
    /// The HTTP transport never returns it.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced while dispatching a controller directive.
#[derive(Debug, Error)]
pub enum DirectiveError {
    /// `ISREADY` was asked while the replica is not ready.
    #[error("replica not ready")]
    NotReady,

    /// Unrecognised action string (strict mode only).
    #[error("unknown directive action: {0}")]
    UnknownAction(String),

    /// The node-supplied handler failed.
    #[error("{action} handler failed: {source}")]
    Handler {
        action: &'static str,
        #[source]
        source: anyhow::Error,
    },
}
