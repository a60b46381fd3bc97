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

//! Error handling for shard-invalidator - structured errors with codes and recovery suggestions.

use std::fmt;
use thiserror::Error;

/// Result type alias for shard-invalidator operations
pub type Result<T> = std::result::Result<T, InvalidatorError>;

/// Main error type for shard-invalidator
#[derive(Error, Debug)]
pub enum InvalidatorError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authoritative store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Cache shard errors
    #[error("Shard error: {0}")]
    Shard(#[from] ShardError),

    /// Timestamp parsing errors
    #[error("Timestamp error: {0}")]
    Timestamp(#[from] TimestampError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Authoritative store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Unexpected row shape in {table}: {reason}")]
    RowShape { table: &'static str, reason: String },

    #[error("Notification channel closed")]
    ChannelClosed,
}

/// Cache shard errors
#[derive(Error, Debug)]
pub enum ShardError {
    #[error("Invalid shard entry '{entry}': {reason}")]
    InvalidEntry { entry: String, reason: String },

    #[error("Duplicate shard username: {username}")]
    DuplicateUser { username: String },

    #[error("Cannot connect to shard {username}: {reason}")]
    ConnectionFailed { username: String, reason: String },

    #[error("Shard {username} command failed: {reason}")]
    CommandFailed { username: String, reason: String },

    #[error("Shard {username} timed out after {timeout_ms}ms")]
    Timeout { username: String, timeout_ms: u64 },
}

/// Timestamp parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Malformed timestamp '{input}': {reason}")]
    Malformed { input: String, reason: String },

    #[error("Invalid UTC offset '{offset}'")]
    InvalidOffset { offset: String },
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            StoreError::ConnectionFailed(err.to_string())
        } else {
            StoreError::QueryFailed(err.to_string())
        }
    }
}

impl From<tokio_postgres::Error> for InvalidatorError {
    fn from(err: tokio_postgres::Error) -> Self {
        InvalidatorError::Store(err.into())
    }
}

impl InvalidatorError {
    /// Get an error code for scripting purposes
    pub fn code(&self) -> &'static str {
        match self {
            InvalidatorError::Config(_) => "E001",
            InvalidatorError::Store(_) => "E010",
            InvalidatorError::Shard(_) => "E020",
            InvalidatorError::Timestamp(_) => "E030",
            InvalidatorError::Io(_) => "E070",
            InvalidatorError::Other(_) => "E999",
        }
    }

    /// Get a recovery suggestion for this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            InvalidatorError::Config(_) => {
                Some("Check the config file (see 'shard-invalidator config path') and command line flags")
            }
            InvalidatorError::Store(StoreError::ConnectionFailed(_))
            | InvalidatorError::Store(StoreError::ConnectTimeout { .. }) => {
                Some("Verify --postgres-host, --postgres-db-name and the database credentials")
            }
            InvalidatorError::Store(StoreError::ChannelClosed) => {
                Some("The PostgreSQL connection was lost; restart once the database is reachable")
            }
            InvalidatorError::Store(StoreError::RowShape { .. }) => {
                Some("Compare the database tables with 'shard-invalidator schema'")
            }
            InvalidatorError::Shard(ShardError::InvalidEntry { .. }) => {
                Some("Shard entries use the form username@host:port, separated by commas")
            }
            InvalidatorError::Shard(ShardError::DuplicateUser { .. }) => {
                Some("Each username may appear only once in --redis-servers")
            }
            _ => None,
        }
    }
}

/// Extension trait for adding context to results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: fmt::Display>(self, context: C) -> Result<T>;

    /// Add context lazily
    fn with_context<C: fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T, E: Into<InvalidatorError>> ResultExt<T> for std::result::Result<T, E> {
    fn context<C: fmt::Display>(self, context: C) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            InvalidatorError::Other(anyhow::anyhow!("{}: {}", context, err))
        })
    }

    fn with_context<C: fmt::Display, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            InvalidatorError::Other(anyhow::anyhow!("{}: {}", f(), err))
        })
    }
}
