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

//! Concurrent fan-out of shard invalidations.

use crate::core::error::{Result, ShardError};
use crate::shard::Shard;
use futures::future::join_all;
use std::time::Duration;
use tracing::debug;

/// Result of one shard invalidation
#[derive(Debug)]
pub struct DispatchOutcome {
    pub username: String,
    /// Whether the key was present on the shard
    pub result: Result<bool>,
}

/// Delete `key` on every target at once and wait for all of them.
///
/// Each call is bounded by `timeout`; a slow or failing shard never holds up
/// or cancels the others.
pub async fn invalidate_all(targets: &[&Shard], key: &str, timeout: Duration) -> Vec<DispatchOutcome> {
    if targets.is_empty() {
        return Vec::new();
    }
    debug!("Dispatching {} invalidation(s) for '{}'", targets.len(), key);

    let calls = targets.iter().map(|shard| async move {
        let result = match tokio::time::timeout(timeout, shard.client.delete(key)).await {
            Ok(result) => result,
            Err(_) => Err(ShardError::Timeout {
                username: shard.username.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }
            .into()),
        };
        DispatchOutcome {
            username: shard.username.clone(),
            result,
        }
    });

    join_all(calls).await
}
