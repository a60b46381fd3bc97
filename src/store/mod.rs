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

//! Authoritative store access.
//!
//! One change notification is handled inside one [`StoreSession`]: the
//! read-log query, the parameter lookup and the read-log cleanup all see the
//! same snapshot, and only rows that were actually evaluated are removed.

pub mod postgres;

pub use postgres::{NotificationPump, PostgresStore};

use crate::core::error::Result;
use crate::core::types::{ParameterRow, ReadLogRow};
use async_trait::async_trait;

/// Source of per-notification store sessions
#[async_trait]
pub trait ParameterStore: Send {
    /// Open a consistent unit of work
    async fn begin<'a>(&'a mut self) -> Result<Box<dyn StoreSession + 'a>>;
}

/// One transaction against the authoritative store
#[async_trait]
pub trait StoreSession: Send {
    /// Read-log rows for `parameter`
    async fn read_log(&mut self, parameter: &str) -> Result<Vec<ReadLogRow>>;

    /// Current ttl and last write time of `parameter`
    async fn lookup(&mut self, parameter: &str) -> Result<Option<ParameterRow>>;

    /// Remove exactly the given read-log rows; returns how many went away
    async fn consume_read_log(&mut self, parameter: &str, rows: &[ReadLogRow]) -> Result<u64>;

    /// Make the session's changes durable
    async fn commit(self: Box<Self>) -> Result<()>;
}
