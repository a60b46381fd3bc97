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

//! tracing subscriber setup.

use crate::core::error::{InvalidatorError, Result};
use std::ffi::OsStr;
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable holding a full filter directive
pub const LOG_ENV: &str = "SHARD_INVALIDATOR_LOG";

/// Install the global subscriber.
///
/// Logs go to stderr; with `log_file` set they are also appended to a daily
/// rolling file. Keep the returned guard alive until exit so buffered lines
/// get flushed.
pub fn init(level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let parsed = parse_log_level(level)?;
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| level_filter(parsed));

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let registry = Registry::default().with(filter).with(stderr);

    let guard = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
            let prefix = path.file_name().unwrap_or_else(|| OsStr::new("shard-invalidator.log"));
            let appender = tracing_appender::rolling::daily(dir, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .try_init()
                .map_err(|e| InvalidatorError::Config(format!("cannot install logger: {}", e)))?;
            Some(guard)
        }
        None => {
            registry
                .try_init()
                .map_err(|e| InvalidatorError::Config(format!("cannot install logger: {}", e)))?;
            None
        }
    };

    tracing::debug!("Logging initialized at level {}", level);
    Ok(guard)
}

/// Filter admitting `level` and everything more severe
fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
}

/// Parse a log level name
pub fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(InvalidatorError::Config(format!(
            "invalid log level '{}', use trace, debug, info, warn or error",
            level
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_level_alias_filters_by_severity() {
        let filter = level_filter(parse_log_level("warning").unwrap());
        let subscriber = Registry::default().with(filter);

        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(Level::ERROR));
            assert!(tracing::enabled!(Level::WARN));
            assert!(!tracing::enabled!(Level::INFO));
        });
    }

    #[test]
    fn test_init_rejects_bad_level() {
        assert!(init("loud", None).is_err());
    }
}
