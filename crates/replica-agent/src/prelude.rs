//! Convenient re-exports for embedding the agent in a replica.
//!
//! ```rust
//! use replica_agent::prelude::*;
//! ```

// Agent
pub use crate::agent::{LifecycleState, ReplicaAgent, SendOutcome};
pub use crate::config::{AgentConfig, AgentConfigBuilder, DirectiveMode};

// Wire types
pub use crate::types::{
    Event, EventType, LogRecord, Message, MessageId, ReplicaId, ReplicaRecord,
};

// Timers and directives
pub use crate::directive::{Directive, DirectiveHandler, NoopDirectiveHandler};
pub use crate::timer::{Timeout, TimeoutHandle, TimeoutInfo};

// Controller transports
pub use crate::controller::{
    ControllerRoute, ControllerTransport, HttpControllerTransport, MockControllerTransport,
};

// Errors
pub use crate::error::{AgentError, ConfigError, DirectiveError, Result, TransportError};

// External re-exports for convenience
pub use async_trait::async_trait;
