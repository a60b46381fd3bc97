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

//! Invalidation decision engine.
//!
//! On every change notification the engine reads who cached the parameter,
//! computes the parameter's expiry and invalidates only shards whose copy
//! could outlive the change. Everything else is counted as a saved check.

pub mod counters;
pub mod decision;
pub mod dispatch;

pub use counters::Counters;
pub use decision::{decide, Decision};

use crate::core::config::EngineConfig;
use crate::core::error::{InvalidatorError, Result};
use crate::core::timestamp::TimestampParser;
use crate::core::types::{Expiry, InvalidationReport};
use crate::shard::{Shard, ShardRegistry};
use crate::store::ParameterStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Source of "now" for decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock in UTC, the frame the timestamp parser normalizes to
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Tuning knobs for the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Buffer added to "now" before comparing against expiry
    pub uncertainty: Duration,
    /// Bound on each shard invalidation call
    pub shard_timeout: std::time::Duration,
    pub parser: TimestampParser,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            uncertainty: Duration::milliseconds(500),
            shard_timeout: std::time::Duration::from_secs(2),
            parser: TimestampParser::utc(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let uncertainty = i64::try_from(config.uncertainty_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .ok_or_else(|| {
                InvalidatorError::Config(format!("engine.uncertainty_ms {} is out of range", config.uncertainty_ms))
            })?;
        Ok(Self {
            uncertainty,
            shard_timeout: std::time::Duration::from_millis(config.shard_timeout_ms),
            parser: TimestampParser::new(config.reference_offset()?),
        })
    }
}

/// What one notification led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// No shard had the parameter cached
    NoReaders,
    /// The parameter record is gone; stale read-log rows were dropped
    UnknownParameter { consumed: u64 },
    /// Shards were checked one by one
    Evaluated {
        invalidated: Vec<String>,
        failed: Vec<String>,
        skipped: usize,
        consumed: u64,
    },
}

/// The decision engine. Calls to [`InvalidationEngine::on_change`] take
/// `&mut self`, so notifications are always processed one at a time.
pub struct InvalidationEngine<S> {
    store: S,
    shards: ShardRegistry,
    settings: EngineSettings,
    clock: Box<dyn Clock>,
    counters: Counters,
}

impl<S: ParameterStore> InvalidationEngine<S> {
    pub fn new(store: S, shards: ShardRegistry, settings: EngineSettings) -> Self {
        info!(
            "Decision engine ready: {} shard(s), uncertainty {}ms, shard timeout {}ms",
            shards.len(),
            settings.uncertainty.num_milliseconds(),
            settings.shard_timeout.as_millis()
        );
        Self {
            store,
            shards,
            settings,
            clock: Box::new(SystemClock),
            counters: Counters::new(),
        }
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn report(&self) -> InvalidationReport {
        self.counters.snapshot()
    }

    /// Count a notification that never reached the engine proper
    pub fn record_dropped(&mut self) {
        self.counters.record_dropped();
    }

    /// Handle one "parameter changed" notification.
    ///
    /// Store failures abort this notification only; per-shard failures are
    /// absorbed and reported in the outcome.
    pub async fn on_change(&mut self, parameter: &str) -> Result<ChangeOutcome> {
        match self.process(parameter).await {
            Ok(outcome) => {
                self.counters.record_processed();
                Ok(outcome)
            }
            Err(e) => {
                self.counters.record_dropped();
                Err(e)
            }
        }
    }

    async fn process(&mut self, parameter: &str) -> Result<ChangeOutcome> {
        let mut session = self.store.begin().await?;

        let rows = session.read_log(parameter).await?;
        if rows.is_empty() {
            session.commit().await?;
            self.counters.record_no_readers(self.shards.len());
            debug!("No shard caches '{}', nothing to check", parameter);
            return Ok(ChangeOutcome::NoReaders);
        }

        let record = match session.lookup(parameter).await? {
            Some(record) => record,
            None => {
                warn!("No parameter record for '{}', nothing to invalidate", parameter);
                let consumed = session.consume_read_log(parameter, &rows).await?;
                session.commit().await?;
                return Ok(ChangeOutcome::UnknownParameter { consumed });
            }
        };

        let parser = &self.settings.parser;
        let expiry = match parser.parse(&record.last_write) {
            Ok(written) => Expiry::from_write(written, record.ttl_ms),
            Err(e) => {
                warn!("Invalidating '{}' conservatively: {}", parameter, e);
                Expiry::Unknown
            }
        };

        let mut readers: HashMap<&str, Option<DateTime<Utc>>> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let read_at = parser.parse(&row.read_timestamp).ok();
            readers.entry(row.username.as_str()).or_insert(read_at);
            if self.shards.get(&row.username).is_none() {
                debug!("Read-log entry for unregistered shard '{}'", row.username);
            }
        }

        // One snapshot of "now" for every shard of this notification.
        let now = self.clock.now();
        let mut targets: Vec<&Shard> = Vec::new();
        let mut skipped = 0;

        for shard in self.shards.iter() {
            let cached = readers.contains_key(shard.username.as_str());
            let decision = decide(cached, now, self.settings.uncertainty, expiry);
            self.counters.record_check(decision);

            debug!(
                user = %shard.username,
                key = parameter,
                read_at = ?readers.get(shard.username.as_str()).copied().flatten(),
                now = %now,
                expiry = %expiry,
                delta_ms = ?expiry.instant().map(|at| (at - now).num_milliseconds()),
                "{}",
                decision
            );

            if decision == Decision::Invalidate {
                targets.push(shard);
            } else {
                skipped += 1;
            }
        }

        let outcomes = dispatch::invalidate_all(&targets, parameter, self.settings.shard_timeout).await;

        let mut invalidated = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(_) => {
                    self.counters.record_invalidation(true);
                    invalidated.push(outcome.username);
                }
                Err(e) => {
                    warn!("Invalidation of '{}' on shard {} failed: {}", parameter, outcome.username, e);
                    self.counters.record_invalidation(false);
                    failed.push(outcome.username);
                }
            }
        }

        let consumed = session.consume_read_log(parameter, &rows).await?;
        session.commit().await?;

        Ok(ChangeOutcome::Evaluated {
            invalidated,
            failed,
            skipped,
            consumed,
        })
    }
}
