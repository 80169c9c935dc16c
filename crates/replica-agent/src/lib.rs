//! # Replica Agent
//!
//! In-process agent that puts a test controller between the replicas of a
//! distributed protocol. The controller sees every message, every timer and
//! every lifecycle change, so it can reorder, delay, drop or inject them to
//! explore interleavings.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use replica_agent::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AgentConfig::new("r1", "localhost:7074", ":8001");
//!     let agent = ReplicaAgent::new(config, Arc::new(NoopDirectiveHandler))?;
//!
//!     agent.start().await?;
//!     agent.ready();
//!
//!     agent.send_message("vote", "r2", b"term=3".to_vec(), true).await?;
//!     agent.start_timer(Timeout::new("election", Duration::from_millis(300))).await;
//!
//!     while let Some(fired) = agent.next_timeout().await {
//!         println!("timeout {} fired", fired.key());
//!     }
//!
//!     agent.stop().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`agent`]: the agent handle and its lifecycle
//! - [`controller`]: outbound transport to the controller
//! - [`directive`]: START / STOP / RESTART / ISREADY handling
//! - [`timer`]: controller-fired timeouts
//! - [`queue`]: inbound message queue
//! - [`counter`]: message identifiers
//! - [`telemetry`]: events and controller-side log records
//! - [`config`]: agent configuration
//! - [`error`]: error types

#![warn(clippy::all)]

pub mod agent;
pub mod config;
pub mod controller;
pub mod counter;
pub mod directive;
pub mod error;
pub mod prelude;
pub mod queue;
pub mod telemetry;
pub mod timer;
pub mod types;

mod server;

pub use agent::{LifecycleState, ReplicaAgent, SendOutcome};
pub use config::{AgentConfig, AgentConfigBuilder, DirectiveMode};
pub use controller::{ControllerTransport, HttpControllerTransport, MockControllerTransport};
pub use directive::{Directive, DirectiveHandler, NoopDirectiveHandler};
pub use error::{AgentError, ConfigError, DirectiveError, Result, TransportError};
pub use timer::{Timeout, TimeoutInfo};
pub use types::{Message, MessageId, ReplicaId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
