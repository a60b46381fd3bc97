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

//! In-memory doubles for the store, the shards and the clock.

use crate::core::error::{Result, ShardError, StoreError};
use crate::core::types::{ParameterRow, ReadLogRow};
use crate::engine::Clock;
use crate::shard::ShardClient;
use crate::store::{ParameterStore, StoreSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct StoreState {
    parameters: HashMap<String, ParameterRow>,
    read_log: Vec<(String, ReadLogRow)>,
    fail_reads: bool,
    commits: usize,
}

/// Shared in-memory store. Clones see the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_parameter(&self, name: &str, ttl_ms: f64, last_write: &str) {
        self.state.lock().parameters.insert(
            name.to_string(),
            ParameterRow {
                ttl_ms,
                last_write: last_write.to_string(),
            },
        );
    }

    pub fn record_read(&self, username: &str, parameter: &str, read_timestamp: &str) {
        self.state
            .lock()
            .read_log
            .push((parameter.to_string(), ReadLogRow::new(username, read_timestamp)));
    }

    pub fn read_log_for(&self, parameter: &str) -> Vec<ReadLogRow> {
        self.state
            .lock()
            .read_log
            .iter()
            .filter(|(p, _)| p == parameter)
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn commits(&self) -> usize {
        self.state.lock().commits
    }
}

#[async_trait]
impl ParameterStore for MemoryStore {
    async fn begin<'a>(&'a mut self) -> Result<Box<dyn StoreSession + 'a>> {
        Ok(Box::new(MemorySession {
            state: self.state.clone(),
            pending: Vec::new(),
        }))
    }
}

/// Deletes are staged and only applied on commit
struct MemorySession {
    state: Arc<Mutex<StoreState>>,
    pending: Vec<(String, ReadLogRow)>,
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn read_log(&mut self, parameter: &str) -> Result<Vec<ReadLogRow>> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(StoreError::QueryFailed("read_log unavailable".to_string()).into());
        }
        Ok(state
            .read_log
            .iter()
            .filter(|(p, _)| p == parameter)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn lookup(&mut self, parameter: &str) -> Result<Option<ParameterRow>> {
        Ok(self.state.lock().parameters.get(parameter).cloned())
    }

    async fn consume_read_log(&mut self, parameter: &str, rows: &[ReadLogRow]) -> Result<u64> {
        let state = self.state.lock();
        let matched = state
            .read_log
            .iter()
            .filter(|(p, row)| p == parameter && rows.contains(row))
            .count();
        self.pending
            .extend(rows.iter().map(|row| (parameter.to_string(), row.clone())));
        Ok(matched as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock();
        let pending = &self.pending;
        state.read_log.retain(|entry| !pending.contains(entry));
        state.commits += 1;
        Ok(())
    }
}

type Hook = Box<dyn Fn(&str) + Send + Sync>;

/// Shard that remembers every deleted key
pub struct RecordingShard {
    address: String,
    delay: Option<Duration>,
    hook: Option<Hook>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingShard {
    fn build(address: &str, delay: Option<Duration>, hook: Option<Hook>) -> Arc<Self> {
        Arc::new(Self {
            address: address.to_string(),
            delay,
            hook,
            deleted: Mutex::new(Vec::new()),
        })
    }

    pub fn new(address: &str) -> Arc<Self> {
        Self::build(address, None, None)
    }

    pub fn shared(address: &str) -> Arc<dyn ShardClient> {
        Self::new(address)
    }

    /// Sleeps before answering each delete
    pub fn with_delay(address: &str, delay: Duration) -> Arc<Self> {
        Self::build(address, Some(delay), None)
    }

    /// Runs `hook` with the key after each delete
    pub fn with_hook(address: &str, hook: impl Fn(&str) + Send + Sync + 'static) -> Arc<Self> {
        Self::build(address, None, Some(Box::new(hook)))
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl ShardClient for RecordingShard {
    async fn delete(&self, key: &str) -> Result<bool> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.deleted.lock().push(key.to_string());
        if let Some(ref hook) = self.hook {
            hook(key);
        }
        Ok(true)
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}

/// Shard whose every command fails
pub struct FailingShard;

#[async_trait]
impl ShardClient for FailingShard {
    async fn delete(&self, _key: &str) -> Result<bool> {
        Err(ShardError::CommandFailed {
            username: "failing".to_string(),
            reason: "connection reset".to_string(),
        }
        .into())
    }

    fn address(&self) -> String {
        "failing:0".to_string()
    }
}

/// Shard that never answers
pub struct HangingShard;

#[async_trait]
impl ShardClient for HangingShard {
    async fn delete(&self, _key: &str) -> Result<bool> {
        std::future::pending::<Result<bool>>().await
    }

    fn address(&self) -> String {
        "hanging:0".to_string()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
