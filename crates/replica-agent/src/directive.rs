//! Controller directives.
//!
//! The controller drives the replica's lifecycle with four actions:
//!
//! | Action | Effect |
//! |---|---|
//! | `START` | mark ready, then `handler.start()` |
//! | `STOP` | mark not ready, then `handler.stop()` |
//! | `RESTART` | mark not ready, `handler.restart()`, then mark ready (even if it failed) |
//! | `ISREADY` | fails unless the replica is ready |
//!
//! What starting or stopping means is up to the node, which supplies a
//! [`DirectiveHandler`].

use crate::config::DirectiveMode;
use crate::error::DirectiveError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Start,
    Stop,
    Restart,
    IsReady,
}

impl Directive {
    /// Parses a wire action. Actions are upper case.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "START" => Some(Self::Start),
            "STOP" => Some(Self::Stop),
            "RESTART" => Some(Self::Restart),
            "ISREADY" => Some(Self::IsReady),
            _ => None,
        }
    }

    pub fn as_action(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Restart => "RESTART",
            Self::IsReady => "ISREADY",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_action())
    }
}

/// Node-side implementation of the lifecycle actions.
#[async_trait]
pub trait DirectiveHandler: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    async fn restart(&self) -> anyhow::Result<()>;
}

/// Handler that accepts every directive and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDirectiveHandler;

#[async_trait]
impl DirectiveHandler for NoopDirectiveHandler {
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn restart(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The readiness switch a directive flips.
pub trait Readiness: Send + Sync {
    fn ready(&self);

    fn not_ready(&self);

    fn is_ready(&self) -> bool;
}

/// Maps directives onto readiness changes and handler calls.
#[derive(Clone)]
pub struct DirectiveDispatcher {
    handler: Arc<dyn DirectiveHandler>,
    mode: DirectiveMode,
}

impl fmt::Debug for DirectiveDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveDispatcher")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl DirectiveDispatcher {
    pub fn new(handler: Arc<dyn DirectiveHandler>, mode: DirectiveMode) -> Self {
        Self { handler, mode }
    }

    pub fn mode(&self) -> DirectiveMode {
        self.mode
    }

    /// Dispatches a raw action string.
    ///
    /// In lenient mode an unknown action succeeds without doing anything; in
    /// strict mode it is rejected.
    pub async fn dispatch(
        &self,
        action: &str,
        readiness: &dyn Readiness,
    ) -> Result<(), DirectiveError> {
        info!(directive = %action, "Received directive");

        match Directive::from_action(action) {
            Some(directive) => self.execute(directive, readiness).await,
            None => match self.mode {
                DirectiveMode::Lenient => {
                    warn!(directive = %action, "Ignoring unknown directive");
                    Ok(())
                }
                DirectiveMode::Strict => Err(DirectiveError::UnknownAction(action.to_string())),
            },
        }
    }

    /// Executes a parsed directive.
    ///
    /// A failing START or STOP handler leaves readiness as the step before it
    /// set it. RESTART marks the replica ready again even when the handler
    /// fails, and still reports the failure.
    pub async fn execute(
        &self,
        directive: Directive,
        readiness: &dyn Readiness,
    ) -> Result<(), DirectiveError> {
        match directive {
            Directive::Start => {
                readiness.ready();
                self.handler.start().await.map_err(handler_failed("START"))
            }
            Directive::Stop => {
                readiness.not_ready();
                self.handler.stop().await.map_err(handler_failed("STOP"))
            }
            Directive::Restart => {
                readiness.not_ready();
                let restarted = self.handler.restart().await;
                readiness.ready();
                restarted.map_err(handler_failed("RESTART"))
            }
            Directive::IsReady => {
                if readiness.is_ready() {
                    Ok(())
                } else {
                    Err(DirectiveError::NotReady)
                }
            }
        }
    }
}

fn handler_failed(action: &'static str) -> impl FnOnce(anyhow::Error) -> DirectiveError {
    move |source| DirectiveError::Handler { action, source }
}
