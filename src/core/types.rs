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

//! Core domain types for shard-invalidator.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A "parameter changed" event delivered on the change channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Channel the event arrived on
    pub channel: String,
    /// Bare parameter name
    pub parameter: String,
}

impl ChangeEvent {
    pub fn new(channel: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            parameter: parameter.into(),
        }
    }
}

/// Raw read-log row: shard `username` cached `parameter` at `read_timestamp`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadLogRow {
    pub username: String,
    /// Store text form, parsed by the engine
    pub read_timestamp: String,
}

impl ReadLogRow {
    pub fn new(username: impl Into<String>, read_timestamp: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            read_timestamp: read_timestamp.into(),
        }
    }
}

/// Raw parameter record as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterRow {
    /// Time-to-live in milliseconds
    pub ttl_ms: f64,
    /// Store text form of the last write time
    pub last_write: String,
}

/// When pre-existing cached copies of a parameter become stale on their own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    At(DateTime<Utc>),
    /// The record could not be interpreted; callers must assume the worst
    Unknown,
}

impl Expiry {
    /// `last_write + ttl`, or `Unknown` when the ttl is not a usable number
    pub fn from_write(last_write: DateTime<Utc>, ttl_ms: f64) -> Self {
        if !ttl_ms.is_finite() {
            return Expiry::Unknown;
        }
        let micros = (ttl_ms * 1000.0).round();
        if micros.abs() > i64::MAX as f64 {
            return Expiry::Unknown;
        }
        last_write
            .checked_add_signed(Duration::microseconds(micros as i64))
            .map(Expiry::At)
            .unwrap_or(Expiry::Unknown)
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Expiry::At(at) => Some(*at),
            Expiry::Unknown => None,
        }
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiry::At(at) => write!(f, "{}", at.to_rfc3339()),
            Expiry::Unknown => write!(f, "unknown"),
        }
    }
}

/// Process-lifetime efficiency figures emitted at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationReport {
    pub notifications_processed: u64,
    pub notifications_dropped: u64,
    pub total_shard_checks: u64,
    pub saved_checks: u64,
    pub invalidations_sent: u64,
    pub invalidation_failures: u64,
}

impl InvalidationReport {
    /// Fraction of shard checks that needed no round trip
    pub fn saved_ratio(&self) -> f64 {
        if self.total_shard_checks == 0 {
            0.0
        } else {
            self.saved_checks as f64 / self.total_shard_checks as f64
        }
    }
}
