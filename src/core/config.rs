// shard-invalidator - Selective cache-shard invalidation for PostgreSQL-backed parameters
// Copyright (C) 2025 shard-invalidator contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Configuration system for shard-invalidator - TOML file, environment and CLI layers.

use crate::core::error::{InvalidatorError, Result};
use crate::core::timestamp::parse_offset;
use crate::shard::registry::{parse_shard_list, ShardSpec};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SHARD_INVALIDATOR";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Authoritative store connection
    pub store: StoreConfig,
    /// Cache shard registry
    pub shards: ShardsConfig,
    /// Decision engine tuning
    pub engine: EngineConfig,
    /// Change notification listener
    pub listener: ListenerConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Optional log file, rotated daily
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// PostgreSQL connection settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 5432,
            dbname: String::new(),
            user: None,
            password: None,
            connect_timeout_ms: 10_000,
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Cache shard settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardsConfig {
    /// Entries of the form `username@host:port`
    pub servers: Vec<String>,
}

/// Decision engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Clock skew and network delay allowance in milliseconds
    pub uncertainty_ms: u64,
    /// Per-shard invalidation timeout in milliseconds
    pub shard_timeout_ms: u64,
    /// UTC offset assumed for store timestamps that carry none
    pub reference_offset: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            uncertainty_ms: 500,
            shard_timeout_ms: 2_000,
            reference_offset: "+00:00".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn reference_offset(&self) -> Result<FixedOffset> {
        parse_offset(self.reference_offset.trim())
            .map_err(|e| InvalidatorError::Config(format!("engine.reference_offset: {}", e)))
    }
}

/// Notification listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Change channel name
    pub channel: String,
    /// Stop after this many notifications (0 = run until shutdown)
    pub max_events: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channel: "data_update".to_string(),
            max_events: 0,
        }
    }
}

impl ListenerConfig {
    pub fn event_limit(&self) -> Option<u64> {
        (self.max_events > 0).then_some(self.max_events)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("shard-invalidator")
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from `path`, or the default location.
    ///
    /// An explicitly given file must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::config_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(InvalidatorError::Config(format!("Config file not found: {}", path.display())));
            }
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        debug!("Loading config from {:?}", path);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| InvalidatorError::Config(format!("Failed to read config: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| InvalidatorError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply environment variable overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(format!("{}_{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides looked up by unprefixed key
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DB_HOST") {
            self.store.host = host;
        }
        if let Some(port) = lookup("DB_PORT").and_then(|p| p.parse().ok()) {
            self.store.port = port;
        }
        if let Some(dbname) = lookup("DB_NAME") {
            self.store.dbname = dbname;
        }
        if let Some(user) = lookup("DB_USER") {
            self.store.user = Some(user);
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.store.password = Some(password);
        }
        if let Some(servers) = lookup("REDIS_SERVERS") {
            self.shards.servers = split_servers(&servers);
        }
        if let Some(ms) = lookup("UNCERTAINTY_MS").and_then(|v| v.parse().ok()) {
            self.engine.uncertainty_ms = ms;
        }
        if let Some(max) = lookup("MAX_EVENTS").and_then(|v| v.parse().ok()) {
            self.listener.max_events = max;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.general.log_level = level;
        }
        self
    }

    /// Parsed shard registry entries
    pub fn shard_specs(&self) -> Result<Vec<ShardSpec>> {
        Ok(parse_shard_list(&self.shards.servers.join(","))?)
    }

    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<()> {
        if self.store.host.trim().is_empty() {
            return Err(InvalidatorError::Config("store.host is required (--postgres-host)".to_string()));
        }
        if self.store.dbname.trim().is_empty() {
            return Err(InvalidatorError::Config("store.dbname is required (--postgres-db-name)".to_string()));
        }
        if self.shards.servers.is_empty() {
            return Err(InvalidatorError::Config("at least one shard is required (--redis-servers)".to_string()));
        }
        self.shard_specs()?;

        if !is_identifier(&self.listener.channel) {
            return Err(InvalidatorError::Config(format!(
                "listener.channel '{}' must be a plain identifier",
                self.listener.channel
            )));
        }
        if self.engine.shard_timeout_ms == 0 {
            return Err(InvalidatorError::Config("engine.shard_timeout_ms must be positive".to_string()));
        }
        if self.store.connect_timeout_ms == 0 {
            return Err(InvalidatorError::Config("store.connect_timeout_ms must be positive".to_string()));
        }
        self.engine.reference_offset()?;
        Ok(())
    }
}

/// Split a comma-separated server list, dropping blanks
pub fn split_servers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Generate default configuration file content
pub fn generate_default_config() -> String {
    let mut config = Config::default();
    config.store.host = "localhost".to_string();
    config.store.dbname = "parameters".to_string();
    config.shards.servers = vec!["username1@127.0.0.1:6379".to_string()];
    toml::to_string_pretty(&config).unwrap_or_else(|_| String::from("# Failed to generate config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid() -> Config {
        let mut config = Config::default();
        config.store.host = "10.0.0.1".to_string();
        config.store.dbname = "params".to_string();
        config.shards.servers = vec!["alice@10.0.0.2:6379".to_string(), "bob@10.0.0.3:6379".to_string()];
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.uncertainty_ms, 500);
        assert_eq!(config.listener.channel, "data_update");
        assert_eq!(config.listener.event_limit(), None);
        assert_eq!(config.store.port, 5432);
    }

    #[test]
    fn test_config_serialization() {
        let config = valid();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.shards.servers, config.shards.servers);
        assert_eq!(parsed.engine.shard_timeout_ms, config.engine.shard_timeout_ms);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed = Config::from_toml("[engine]\nuncertainty_ms = 250\n").unwrap();
        assert_eq!(parsed.engine.uncertainty_ms, 250);
        assert_eq!(parsed.engine.shard_timeout_ms, 2_000);
        assert_eq!(parsed.listener.channel, "data_update");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml::to_string_pretty(&valid()).unwrap()).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.store.host, "10.0.0.1");
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert_eq!(err.code(), "E001");
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("REDIS_SERVERS", "carol@10.0.0.4:6379, dave@10.0.0.5:6380"),
            ("UNCERTAINTY_MS", "750"),
            ("MAX_EVENTS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = valid().with_overrides_from(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.store.host, "db.internal");
        assert_eq!(config.store.port, 6543);
        assert_eq!(config.shards.servers, vec!["carol@10.0.0.4:6379", "dave@10.0.0.5:6380"]);
        assert_eq!(config.engine.uncertainty_ms, 750);
        assert_eq!(config.listener.max_events, 0);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = valid();
        config.store.host.clear();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.shards.servers.clear();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.shards.servers.push("no-at-sign".to_string());
        assert!(config.validate().is_err());

        let mut config = valid();
        config.listener.channel = "data update; DROP".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.engine.reference_offset = "two hours".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.engine.shard_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_password_hidden_in_debug() {
        let mut config = valid();
        config.store.password = Some("hunter2".to_string());
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_generate_default_config() {
        let content = generate_default_config();
        assert!(content.contains("[store]"));
        assert!(content.contains("[engine]"));
        assert!(content.contains("[listener]"));
        assert!(Config::from_toml(&content).unwrap().validate().is_ok());
    }
}
