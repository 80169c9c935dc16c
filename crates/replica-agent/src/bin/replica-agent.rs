//! Standalone replica agent.
//!
//! Registers with a controller, logs every directive it receives, and drains
//! delivered messages and fired timeouts into the log. Useful for checking a
//! controller deployment without a real protocol implementation.
//!
//! # Usage
//!
//! ```bash
//! replica-agent --id r1 --controller localhost:7074 --listen :8001
//!
//! # From a config file, overriding the id
//! replica-agent --config agent.toml --id r2
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use replica_agent::config::{
    ENV_ADVERTISED_ADDR, ENV_CONTROLLER_ADDR, ENV_DIRECTIVE_MODE, ENV_LISTEN_ADDR, ENV_REPLICA_ID,
};
use replica_agent::{AgentConfig, DirectiveHandler, DirectiveMode, ReplicaAgent, TimeoutInfo};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "replica-agent")]
#[command(about = "Relay a replica's traffic through a test controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Replica identifier
    #[arg(long, env = ENV_REPLICA_ID)]
    id: Option<String>,

    /// Controller address (host:port)
    #[arg(long, env = ENV_CONTROLLER_ADDR)]
    controller: Option<String>,

    /// Listen address for controller callbacks (host:port or :port)
    #[arg(long, env = ENV_LISTEN_ADDR)]
    listen: Option<String>,

    /// Address reported to the controller, if different from --listen
    #[arg(long, env = ENV_ADVERTISED_ADDR)]
    advertised: Option<String>,

    /// Directive handling (lenient, strict)
    #[arg(long, env = ENV_DIRECTIVE_MODE)]
    directive_mode: Option<DirectiveMode>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn load_config(&self) -> Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::from_toml_file(path)
                .with_context(|| format!("Invalid config file {}", path.display()))?,
            None => AgentConfig::new("", "", ""),
        };

        if let Some(id) = &self.id {
            config.replica_id = id.as_str().into();
        }
        if let Some(controller) = &self.controller {
            config.controller_addr = controller.clone();
        }
        if let Some(listen) = &self.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(advertised) = &self.advertised {
            config.advertised_addr = advertised.clone();
        }
        if let Some(mode) = self.directive_mode {
            config.directive_mode = mode;
        }
        Ok(config)
    }
}

/// Accepts every directive and logs it.
struct LoggingHandler;

#[async_trait]
impl DirectiveHandler for LoggingHandler {
    async fn start(&self) -> anyhow::Result<()> {
        info!("Controller requested start");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        info!("Controller requested stop");
        Ok(())
    }

    async fn restart(&self) -> anyhow::Result<()> {
        info!("Controller requested restart");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.load_config()?;
    let agent = ReplicaAgent::new(config, Arc::new(LoggingHandler))?;
    agent.start().await?;

    let mut poll = tokio::time::interval(QUEUE_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            fired = agent.next_timeout() => {
                match fired {
                    Some(timeout) => info!(key = %timeout.key(), "Timeout fired"),
                    None => break,
                }
            }
            _ = poll.tick() => {
                while let Some(message) = agent.receive_message() {
                    info!(
                        message_id = %message.id,
                        from = %message.from,
                        message_type = %message.message_type,
                        bytes = message.data.len(),
                        "Message delivered"
                    );
                }
            }
        }
    }

    if let Err(e) = agent.stop().await {
        warn!(error = %e, "Unclean shutdown");
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if verbose {
        EnvFilter::new("replica_agent=debug,tower_http=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("replica_agent=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
