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

//! Cache shard connections.

use crate::core::error::{Result, ShardError};
use crate::shard::registry::ShardSpec;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// The only shard operation the engine needs
#[async_trait]
pub trait ShardClient: Send + Sync {
    /// Evict `key`; returns whether the key was present
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Human-readable address for logs
    fn address(&self) -> String;
}

/// Redis-backed shard. The connection is opened on first use and then kept;
/// a shard that is down at startup only fails its own invalidations.
pub struct RedisShard {
    username: String,
    address: String,
    client: Client,
    connect_timeout: Duration,
    conn: OnceCell<ConnectionManager>,
}

impl RedisShard {
    /// Prepare the shard handle without touching the network
    pub fn new(spec: &ShardSpec, connect_timeout: Duration) -> std::result::Result<Self, ShardError> {
        let client = Client::open(spec.connection_url()).map_err(|e| ShardError::InvalidEntry {
            entry: spec.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            username: spec.username.clone(),
            address: spec.address(),
            client,
            connect_timeout,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> std::result::Result<ConnectionManager, ShardError> {
        let failed = |reason: String| ShardError::ConnectionFailed {
            username: self.username.clone(),
            reason,
        };

        // A failed attempt leaves the cell empty, so the next call retries.
        let conn = self
            .conn
            .get_or_try_init(|| async {
                debug!("Connecting to shard {}@{}", self.username, self.address);
                tokio::time::timeout(self.connect_timeout, ConnectionManager::new(self.client.clone()))
                    .await
                    .map_err(|_| failed(format!("no connection after {}ms", self.connect_timeout.as_millis())))?
                    .map_err(|e| failed(e.to_string()))
            })
            .await?;
        // ConnectionManager clones share one multiplexed connection.
        Ok(conn.clone())
    }
}

#[async_trait]
impl ShardClient for RedisShard {
    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: redis::RedisResult<i64> = conn.del(key).await;
        match removed {
            Ok(count) => Ok(count > 0),
            Err(e) => Err(ShardError::CommandFailed {
                username: self.username.clone(),
                reason: format!("DEL {} failed: {}", key, e),
            }
            .into()),
        }
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}
