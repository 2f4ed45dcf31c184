//! Bot configuration
//!
//! One YAML file configures the whole bot:
//!
//! ```yaml
//! prefix: "!"
//! default_roles: [Member]
//! admin:
//!   owner: "1234"
//!   admins: ["5678"]
//! database:
//!   path: data/warbler.db
//! logs:
//!   level: 2
//! paths:
//!   asset_path: assets
//!   commands_path: commands
//!   modules_path: modules
//!   store_path: store
//! gateway:
//!   port: 18790
//! runtime:
//!   action_timeout_secs: 30
//!   interpreters:
//!     py: [python3]
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use warbler_core::{EngineConfig, LoadPolicy, DEFAULT_PREFIX};
use warbler_sandbox::{ScriptEnv, ScriptResolver};

use crate::{GatewayError, Result, DEFAULT_HOST, DEFAULT_PORT};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Main bot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Command prefix
    pub prefix: String,

    /// Role names given to every member that joins
    pub default_roles: Vec<String>,

    pub admin: AdminSettings,

    pub database: DatabaseSettings,

    pub logs: LogSettings,

    pub paths: PathSettings,

    pub gateway: GatewaySettings,

    pub runtime: RuntimeSettings,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            default_roles: Vec::new(),
            admin: AdminSettings::default(),
            database: DatabaseSettings::default(),
            logs: LogSettings::default(),
            paths: PathSettings::default(),
            gateway: GatewaySettings::default(),
            runtime: RuntimeSettings::default(),
        }
    }
}

impl BotConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file. Relative paths inside it are
    /// taken relative to the working directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize back to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(GatewayError::InvalidConfig("prefix must not be empty".into()));
        }
        if self.paths.command_roots().is_empty() {
            return Err(GatewayError::InvalidConfig(
                "paths.commands_path must name at least one directory".into(),
            ));
        }
        if self.logs.level > 3 {
            return Err(GatewayError::InvalidConfig(format!(
                "logs.level must be between 0 and 3, got {}",
                self.logs.level
            )));
        }
        Ok(())
    }

    /// Set the prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.gateway.port = port;
        self
    }

    /// Set the host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.gateway.host = host.into();
        self
    }

    /// Replace the command roots
    pub fn with_commands_path(mut self, roots: Vec<PathBuf>) -> Self {
        self.paths.commands_path = CommandRoots::Many(roots);
        self
    }

    pub fn with_log_level(mut self, level: u8) -> Self {
        self.logs.level = level;
        self
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.gateway.host, self.gateway.port)
            .parse()
            .map_err(|e| {
                GatewayError::InvalidConfig(format!(
                    "invalid gateway address {}:{}: {}",
                    self.gateway.host, self.gateway.port, e
                ))
            })
    }

    /// Settings for the dispatch engine
    pub fn engine(&self) -> EngineConfig {
        EngineConfig::new()
            .with_prefix(self.prefix.clone())
            .with_roots(self.paths.command_roots())
            .with_load_policy(self.runtime.load_policy)
            .with_action_timeout(self.runtime.action_timeout())
            .with_store_control(self.runtime.store_control)
    }

    /// Resolver for script actions, with the configured interpreters
    pub fn script_resolver(&self) -> ScriptResolver {
        let env = ScriptEnv {
            asset_path: self.paths.asset_path.clone(),
            store_path: self.paths.store_path.clone(),
            modules_path: self.paths.modules_path.clone(),
        };

        self.runtime
            .interpreters
            .iter()
            .fold(ScriptResolver::new(), |resolver, (extension, command)| {
                resolver.with_interpreter(extension.clone(), command.iter().cloned())
            })
            .with_env(env)
    }
}

/// Bot owner and administrators, by user id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    pub owner: Option<String>,
    pub admins: Vec<String>,
}

/// SQLite persistence settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file; `None` keeps everything in memory
    pub path: Option<PathBuf>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: Some(PathBuf::from("data/warbler.db")),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// 0 = error, 1 = warn, 2 = info, 3 = debug
    pub level: u8,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: 2 }
    }
}

impl LogSettings {
    /// `tracing` filter directive for the level
    pub fn filter(&self) -> &'static str {
        match self.level {
            0 => "error",
            1 => "warn",
            2 => "info",
            _ => "debug",
        }
    }
}

/// One command root or several, in load order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandRoots {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

/// Filesystem layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Read-only assets
    pub asset_path: Option<PathBuf>,

    /// Command specification roots
    pub commands_path: CommandRoots,

    /// Shared modules made available to script actions
    pub modules_path: Option<PathBuf>,

    /// Writable store
    pub store_path: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            asset_path: Some(PathBuf::from("assets")),
            commands_path: CommandRoots::One(PathBuf::from("commands")),
            modules_path: Some(PathBuf::from("modules")),
            store_path: Some(PathBuf::from("store")),
        }
    }
}

impl PathSettings {
    pub fn command_roots(&self) -> Vec<PathBuf> {
        match &self.commands_path {
            CommandRoots::One(root) => vec![root.clone()],
            CommandRoots::Many(roots) => roots.clone(),
        }
    }
}

/// Platform bridge server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,

    /// Bridges must present `Authorization: Bearer <token>` when set
    pub auth_token: Option<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            auth_token: None,
        }
    }
}

/// Action runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Per-action deadline; 0 disables it
    pub action_timeout_secs: u64,

    pub load_policy: LoadPolicy,

    /// Whether actions may reload the command set
    pub store_control: bool,

    /// Script extension to interpreter command
    pub interpreters: BTreeMap<String, Vec<String>>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        let mut interpreters = BTreeMap::new();
        interpreters.insert("py".to_string(), vec!["python3".to_string()]);
        interpreters.insert("sh".to_string(), vec!["sh".to_string()]);

        Self {
            action_timeout_secs: 30,
            load_policy: LoadPolicy::default(),
            store_control: true,
            interpreters,
        }
    }
}

impl RuntimeSettings {
    pub fn action_timeout(&self) -> Option<Duration> {
        (self.action_timeout_secs > 0).then(|| Duration::from_secs(self.action_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.prefix, "!");
        assert_eq!(config.logs.filter(), "info");
        assert_eq!(config.paths.command_roots(), vec![PathBuf::from("commands")]);
        assert_eq!(config.runtime.action_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.socket_addr().unwrap().port(), DEFAULT_PORT);
    }

    #[test]
    fn test_from_yaml_partial_sections() {
        let config = BotConfig::from_yaml(
            r#"
prefix: "bs!"
default_roles: [Member, Guest]
admin:
  owner: "42"
logs:
  level: 3
paths:
  commands_path: [commands, extra/commands]
runtime:
  action_timeout_secs: 0
  load_policy: abort
"#,
        )
        .unwrap();

        assert_eq!(config.prefix, "bs!");
        assert_eq!(config.default_roles, vec!["Member", "Guest"]);
        assert_eq!(config.admin.owner.as_deref(), Some("42"));
        assert!(config.admin.admins.is_empty());
        assert_eq!(config.logs.filter(), "debug");
        assert_eq!(
            config.paths.command_roots(),
            vec![PathBuf::from("commands"), PathBuf::from("extra/commands")]
        );
        assert_eq!(config.paths.store_path, Some(PathBuf::from("store")));
        assert!(config.runtime.action_timeout().is_none());

        let engine = config.engine();
        assert_eq!(engine.prefix, "bs!");
        assert_eq!(engine.load_policy, LoadPolicy::Abort);
        assert_eq!(engine.roots.len(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            BotConfig::from_yaml("prefix: \"\"\n"),
            Err(GatewayError::InvalidConfig(_))
        ));
        assert!(matches!(
            BotConfig::from_yaml("logs:\n  level: 9\n"),
            Err(GatewayError::InvalidConfig(_))
        ));
        assert!(matches!(
            BotConfig::from_yaml("prefix: [oops"),
            Err(GatewayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bad_socket_addr_is_an_error() {
        let config = BotConfig::new().with_host("not a host");
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_yaml_round_trip_keeps_interpreters() {
        let config = BotConfig::new().with_prefix("?");
        let parsed = BotConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(
            parsed.script_resolver().extensions(),
            vec!["py", "sh"]
        );
    }
}
