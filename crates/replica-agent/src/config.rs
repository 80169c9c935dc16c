//! Agent configuration.
//!
//! Configuration is consumed once when a [`ReplicaAgent`](crate::ReplicaAgent) is
//! constructed. It can be assembled with the builder, parsed from TOML, or read
//! from `REPLICA_AGENT_*` environment variables.
//!
//! # Example
//!
//! ```
//! use replica_agent::config::AgentConfig;
//!
//! let mut config = AgentConfig::builder()
//!     .replica_id("r1")
//!     .controller_addr("ctrl:9000")
//!     .listen_addr(":8001")
//!     .build();
//!
//! config.validate().unwrap();
//! assert_eq!(config.advertised_addr, ":8001");
//! assert_eq!(config.bind_target(), "0.0.0.0:8001");
//! ```

use crate::error::ConfigError;
use crate::types::ReplicaId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_REPLICA_ID: &str = "REPLICA_AGENT_ID";
pub const ENV_CONTROLLER_ADDR: &str = "REPLICA_AGENT_CONTROLLER_ADDR";
pub const ENV_LISTEN_ADDR: &str = "REPLICA_AGENT_LISTEN_ADDR";
pub const ENV_ADVERTISED_ADDR: &str = "REPLICA_AGENT_ADVERTISED_ADDR";
pub const ENV_DIRECTIVE_MODE: &str = "REPLICA_AGENT_DIRECTIVE_MODE";

/// Time allowed for the listener to report an immediate failure on start.
pub const DEFAULT_START_GRACE: Duration = Duration::from_secs(1);

/// Time allowed for the listener to drain on stop.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// Per-request timeout for calls to the controller.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How unrecognised directive actions are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveMode {
    /// Unknown actions fall through and are answered as success.
    #[default]
    Lenient,
    /// Unknown actions are rejected.
    Strict,
}

impl FromStr for DirectiveMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(format!("expected 'lenient' or 'strict', got '{}'", other)),
        }
    }
}

/// Configuration for a replica agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Identifier of this replica, unique within a test run
    pub replica_id: ReplicaId,

    /// `host:port` of the controller
    pub controller_addr: String,

    /// Address the inbound listener binds to (`":8001"` binds all interfaces)
    pub listen_addr: String,

    /// Address advertised to the controller; defaults to `listen_addr`
    #[serde(default)]
    pub advertised_addr: String,

    /// Free-form metadata sent with every registration
    #[serde(default)]
    pub info: Map<String, Value>,

    #[serde(default = "default_start_grace", rename = "start_grace_ms", with = "duration_ms")]
    pub start_grace: Duration,

    #[serde(default = "default_stop_grace", rename = "stop_grace_ms", with = "duration_ms")]
    pub stop_grace: Duration,

    #[serde(
        default = "default_request_timeout",
        rename = "request_timeout_ms",
        with = "duration_ms"
    )]
    pub request_timeout: Duration,

    #[serde(default)]
    pub directive_mode: DirectiveMode,
}

fn default_start_grace() -> Duration {
    DEFAULT_START_GRACE
}

fn default_stop_grace() -> Duration {
    DEFAULT_STOP_GRACE
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl AgentConfig {
    pub fn new(
        replica_id: impl Into<ReplicaId>,
        controller_addr: impl Into<String>,
        listen_addr: impl Into<String>,
    ) -> Self {
        Self {
            replica_id: replica_id.into(),
            controller_addr: controller_addr.into(),
            listen_addr: listen_addr.into(),
            advertised_addr: String::new(),
            info: Map::new(),
            start_grace: DEFAULT_START_GRACE,
            stop_grace: DEFAULT_STOP_GRACE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            directive_mode: DirectiveMode::default(),
        }
    }

    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Parses a TOML document. Durations are given in milliseconds
    /// (`start_grace_ms`, `stop_grace_ms`, `request_timeout_ms`).
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads and parses a TOML config file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reads the configuration from `REPLICA_AGENT_*` environment variables.
    ///
    /// Missing required variables are left empty and reported by
    /// [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |name: &str| std::env::var(name).unwrap_or_default();

        let mut config = Self::new(
            var(ENV_REPLICA_ID),
            var(ENV_CONTROLLER_ADDR),
            var(ENV_LISTEN_ADDR),
        );
        config.advertised_addr = var(ENV_ADVERTISED_ADDR);

        if let Ok(mode) = std::env::var(ENV_DIRECTIVE_MODE) {
            config.directive_mode = mode.parse().map_err(|reason| ConfigError::Env {
                var: ENV_DIRECTIVE_MODE.to_string(),
                reason,
            })?;
        }

        Ok(config)
    }

    /// Checks required fields and fills in defaults.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.replica_id.is_empty() {
            return Err(ConfigError::MissingReplicaId);
        }
        if self.controller_addr.is_empty() {
            return Err(ConfigError::MissingControllerAddr);
        }
        if self.listen_addr.is_empty() {
            return Err(ConfigError::MissingListenAddr);
        }

        let port = self
            .listen_addr
            .rsplit_once(':')
            .map(|(_, port)| port)
            .ok_or_else(|| ConfigError::InvalidListenAddr {
                addr: self.listen_addr.clone(),
                reason: "missing port".to_string(),
            })?;
        port.parse::<u16>()
            .map_err(|e| ConfigError::InvalidListenAddr {
                addr: self.listen_addr.clone(),
                reason: e.to_string(),
            })?;

        if self.advertised_addr.is_empty() {
            self.advertised_addr = self.listen_addr.clone();
        }
        Ok(())
    }

    /// The address handed to the socket bind.
    pub fn bind_target(&self) -> String {
        if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        }
    }

    /// Base URL of the controller.
    pub fn controller_url(&self) -> String {
        if self.controller_addr.starts_with("http://") || self.controller_addr.starts_with("https://")
        {
            self.controller_addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.controller_addr)
        }
    }
}

/// Fluent builder for [`AgentConfig`].
#[derive(Debug, Default)]
pub struct AgentConfigBuilder {
    replica_id: Option<ReplicaId>,
    controller_addr: Option<String>,
    listen_addr: Option<String>,
    advertised_addr: Option<String>,
    info: Map<String, Value>,
    start_grace: Option<Duration>,
    stop_grace: Option<Duration>,
    request_timeout: Option<Duration>,
    directive_mode: Option<DirectiveMode>,
}

impl AgentConfigBuilder {
    pub fn replica_id(mut self, id: impl Into<ReplicaId>) -> Self {
        self.replica_id = Some(id.into());
        self
    }

    pub fn controller_addr(mut self, addr: impl Into<String>) -> Self {
        self.controller_addr = Some(addr.into());
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn advertised_addr(mut self, addr: impl Into<String>) -> Self {
        self.advertised_addr = Some(addr.into());
        self
    }

    /// Adds one metadata entry.
    pub fn info(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.info.insert(key.into(), value.into());
        self
    }

    pub fn start_grace(mut self, grace: Duration) -> Self {
        self.start_grace = Some(grace);
        self
    }

    pub fn stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = Some(grace);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn directive_mode(mut self, mode: DirectiveMode) -> Self {
        self.directive_mode = Some(mode);
        self
    }

    /// Builds the configuration. Required fields left unset stay empty and
    /// are rejected by [`AgentConfig::validate`].
    pub fn build(self) -> AgentConfig {
        AgentConfig {
            replica_id: self.replica_id.unwrap_or_default(),
            controller_addr: self.controller_addr.unwrap_or_default(),
            listen_addr: self.listen_addr.unwrap_or_default(),
            advertised_addr: self.advertised_addr.unwrap_or_default(),
            info: self.info,
            start_grace: self.start_grace.unwrap_or(DEFAULT_START_GRACE),
            stop_grace: self.stop_grace.unwrap_or(DEFAULT_STOP_GRACE),
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            directive_mode: self.directive_mode.unwrap_or_default(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> AgentConfig {
        AgentConfig::new("r1", "ctrl:9000", ":8001")
    }

    #[test]
    fn test_validate_fills_advertised_addr() {
        let mut config = valid();
        config.validate().unwrap();
        assert_eq!(config.advertised_addr, ":8001");
    }

    #[test]
    fn test_validate_keeps_explicit_advertised_addr() {
        let mut config = valid();
        config.advertised_addr = "10.0.0.5:8001".to_string();
        config.validate().unwrap();
        assert_eq!(config.advertised_addr, "10.0.0.5:8001");
    }

    #[test]
    fn test_validate_missing_fields() {
        let mut config = AgentConfig::new("", "ctrl:9000", ":8001");
        assert!(matches!(config.validate(), Err(ConfigError::MissingReplicaId)));

        let mut config = AgentConfig::new("r1", "", ":8001");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingControllerAddr)
        ));

        let mut config = AgentConfig::new("r1", "ctrl:9000", "");
        assert!(matches!(config.validate(), Err(ConfigError::MissingListenAddr)));
    }

    #[test]
    fn test_validate_rejects_bad_port() {
        let mut config = AgentConfig::new("r1", "ctrl:9000", "localhost");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidListenAddr { .. })
        ));

        let mut config = AgentConfig::new("r1", "ctrl:9000", "localhost:http");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidListenAddr { .. })
        ));
    }

    #[test]
    fn test_bind_target() {
        assert_eq!(valid().bind_target(), "0.0.0.0:8001");
        let config = AgentConfig::new("r1", "ctrl:9000", "127.0.0.1:8001");
        assert_eq!(config.bind_target(), "127.0.0.1:8001");
    }

    #[test]
    fn test_controller_url() {
        assert_eq!(valid().controller_url(), "http://ctrl:9000");
        let config = AgentConfig::new("r1", "http://ctrl:9000/", ":8001");
        assert_eq!(config.controller_url(), "http://ctrl:9000");
    }

    #[test]
    fn test_builder() {
        let config = AgentConfig::builder()
            .replica_id("r2")
            .controller_addr("ctrl:9000")
            .listen_addr("127.0.0.1:0")
            .info("role", "leader")
            .start_grace(Duration::from_millis(50))
            .directive_mode(DirectiveMode::Strict)
            .build();

        assert_eq!(config.replica_id.as_str(), "r2");
        assert_eq!(config.info["role"], "leader");
        assert_eq!(config.start_grace, Duration::from_millis(50));
        assert_eq!(config.stop_grace, DEFAULT_STOP_GRACE);
        assert_eq!(config.directive_mode, DirectiveMode::Strict);
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
replica_id = "r3"
controller_addr = "ctrl:9000"
listen_addr = ":8003"
stop_grace_ms = 500
directive_mode = "strict"

[info]
zone = "a"
"#
        )
        .unwrap();

        let config = AgentConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.replica_id.as_str(), "r3");
        assert_eq!(config.stop_grace, Duration::from_millis(500));
        assert_eq!(config.start_grace, DEFAULT_START_GRACE);
        assert_eq!(config.directive_mode, DirectiveMode::Strict);
        assert_eq!(config.info["zone"], "a");
    }

    #[test]
    fn test_from_toml_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = AgentConfig::from_toml_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { path: ref p, .. } if *p == path));
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(matches!(
            AgentConfig::from_toml_str("replica_id = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_directive_mode_parse() {
        assert_eq!("STRICT".parse::<DirectiveMode>(), Ok(DirectiveMode::Strict));
        assert_eq!("lenient".parse::<DirectiveMode>(), Ok(DirectiveMode::Lenient));
        assert!("loose".parse::<DirectiveMode>().is_err());
    }
}
