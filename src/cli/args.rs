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

//! CLI argument definitions for shard-invalidator.

use crate::core::config::{split_servers, Config};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "shard-invalidator")]
#[command(version = VERSION)]
#[command(about = "Selective cache-shard invalidation driven by PostgreSQL change notifications")]
#[command(long_about = "shard-invalidator listens for parameter changes on a PostgreSQL channel and\n\
    evicts stale copies only from the cache shards that may still serve them.\n\n\
    Shards whose copy expires on its own within the uncertainty window are skipped.")]
pub struct Cli {
    /// PostgreSQL host
    #[arg(long, value_name = "HOST")]
    pub postgres_host: Option<String>,

    /// PostgreSQL port
    #[arg(long, value_name = "PORT")]
    pub postgres_port: Option<u16>,

    /// PostgreSQL database name
    #[arg(long, value_name = "NAME")]
    pub postgres_db_name: Option<String>,

    /// PostgreSQL user
    #[arg(long, value_name = "USER")]
    pub postgres_db_username: Option<String>,

    /// PostgreSQL password
    #[arg(long, value_name = "PASSWORD")]
    pub postgres_db_password: Option<String>,

    /// Cache shards as comma-separated username@host:port entries
    #[arg(long, value_name = "LIST")]
    pub redis_servers: Option<String>,

    /// Notifications to process before exiting (0 = run until stopped)
    #[arg(long = "timeout", visible_alias = "max-events", value_name = "N")]
    pub max_events: Option<u64>,

    /// Uncertainty window added to "now" before comparing with expiry
    #[arg(long, value_name = "MS")]
    pub uncertainty_ms: Option<u64>,

    /// Bound on each shard invalidation call
    #[arg(long, value_name = "MS")]
    pub shard_timeout_ms: Option<u64>,

    /// UTC offset assumed for store timestamps without one
    #[arg(long, value_name = "OFFSET", allow_hyphen_values = true)]
    pub reference_offset: Option<String>,

    /// Change channel to LISTEN on
    #[arg(long, value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// Use specific config file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Be verbose (log every decision)
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Be quiet (warnings and errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Format of the shutdown report
    #[arg(long, value_enum, default_value = "human")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    Human,
    /// JSON output for scripting
    Json,
    /// Plain text, one line
    Plain,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Listen for changes and invalidate shards (default)
    Run,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the PostgreSQL schema this daemon expects
    Schema,

    /// Parse a store timestamp and show the resulting UTC instant
    ParseTime {
        /// Timestamp text, e.g. "2024-01-15 10:30:00.123456+00"
        text: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show effective configuration
    Show,
    /// Generate default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
    /// Validate effective configuration
    Validate,
    /// Show config file path
    Path,
}

/// Shell types for completion generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl From<Shell> for clap_complete::Shell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => clap_complete::Shell::Bash,
            Shell::Zsh => clap_complete::Shell::Zsh,
            Shell::Fish => clap_complete::Shell::Fish,
            Shell::PowerShell => clap_complete::Shell::PowerShell,
            Shell::Elvish => clap_complete::Shell::Elvish,
        }
    }
}

impl Cli {
    /// Get effective verbosity level
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// Whether this invocation starts the daemon
    pub fn is_daemon(&self) -> bool {
        matches!(self.command, None | Some(Commands::Run))
    }

    /// Apply flags on top of file and environment settings
    pub fn apply_to(&self, mut config: Config) -> Config {
        if let Some(ref host) = self.postgres_host {
            config.store.host = host.clone();
        }
        if let Some(port) = self.postgres_port {
            config.store.port = port;
        }
        if let Some(ref name) = self.postgres_db_name {
            config.store.dbname = name.clone();
        }
        if let Some(ref user) = self.postgres_db_username {
            config.store.user = Some(user.clone());
        }
        if let Some(ref password) = self.postgres_db_password {
            config.store.password = Some(password.clone());
        }
        if let Some(ref servers) = self.redis_servers {
            config.shards.servers = split_servers(servers);
        }
        if let Some(max) = self.max_events {
            config.listener.max_events = max;
        }
        if let Some(ms) = self.uncertainty_ms {
            config.engine.uncertainty_ms = ms;
        }
        if let Some(ms) = self.shard_timeout_ms {
            config.engine.shard_timeout_ms = ms;
        }
        if let Some(ref offset) = self.reference_offset {
            config.engine.reference_offset = offset.clone();
        }
        if let Some(ref channel) = self.channel {
            config.listener.channel = channel.clone();
        }
        match self.verbosity() {
            Verbosity::Verbose => config.general.log_level = "debug".to_string(),
            Verbosity::Quiet => config.general.log_level = "warn".to_string(),
            Verbosity::Normal => {}
        }
        config
    }
}

/// Verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_legacy_flags() {
        let cli = Cli::parse_from([
            "shard-invalidator",
            "--postgres-host",
            "db.internal",
            "--postgres-db-name",
            "params",
            "--postgres-db-username",
            "engine",
            "--postgres-db-password",
            "secret",
            "--redis-servers",
            "alice@10.0.0.2:6379,bob@10.0.0.3:6379",
            "--timeout",
            "25",
        ]);
        assert_eq!(cli.postgres_host.as_deref(), Some("db.internal"));
        assert_eq!(cli.max_events, Some(25));
        assert!(cli.is_daemon());

        let config = cli.apply_to(Config::default());
        assert_eq!(config.store.host, "db.internal");
        assert_eq!(config.store.dbname, "params");
        assert_eq!(config.store.user.as_deref(), Some("engine"));
        assert_eq!(config.shards.servers, vec!["alice@10.0.0.2:6379", "bob@10.0.0.3:6379"]);
        assert_eq!(config.listener.max_events, 25);
    }

    #[test]
    fn test_max_events_alias_and_offset() {
        let cli = Cli::parse_from(["shard-invalidator", "--max-events", "3", "--reference-offset", "-05:30"]);
        assert_eq!(cli.max_events, Some(3));
        let config = cli.apply_to(Config::default());
        assert_eq!(config.engine.reference_offset, "-05:30");
    }

    #[test]
    fn test_unset_flags_keep_config() {
        let mut base = Config::default();
        base.store.host = "from-file".to_string();
        base.engine.uncertainty_ms = 800;

        let config = Cli::parse_from(["shard-invalidator"]).apply_to(base);
        assert_eq!(config.store.host, "from-file");
        assert_eq!(config.engine.uncertainty_ms, 800);
    }

    #[test]
    fn test_subcommands() {
        let cli = Cli::parse_from(["shard-invalidator", "config", "init", "--force"]);
        assert!(matches!(cli.command, Some(Commands::Config { action: ConfigAction::Init { force: true } })));
        assert!(!cli.is_daemon());

        let cli = Cli::parse_from(["shard-invalidator", "parse-time", "2024-01-15 10:30:00+00"]);
        assert!(matches!(cli.command, Some(Commands::ParseTime { ref text }) if text == "2024-01-15 10:30:00+00"));

        let cli = Cli::parse_from(["shard-invalidator", "run"]);
        assert!(cli.is_daemon());
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::parse_from(["shard-invalidator", "-v"]);
        assert_eq!(cli.verbosity(), Verbosity::Verbose);
        assert_eq!(cli.apply_to(Config::default()).general.log_level, "debug");

        let cli_quiet = Cli::parse_from(["shard-invalidator", "-q"]);
        assert_eq!(cli_quiet.verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_output_format() {
        let cli = Cli::parse_from(["shard-invalidator", "--output", "plain"]);
        assert_eq!(cli.output, OutputFormat::Plain);
    }
}
