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

//! Monotonic efficiency counters owned by the engine.

use crate::core::types::InvalidationReport;
use crate::engine::decision::Decision;

/// Process-lifetime counters. Every update only ever adds, and a saved
/// check is always also a total check.
#[derive(Debug, Default)]
pub struct Counters {
    report: InvalidationReport,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// One shard considered for one notification
    pub fn record_check(&mut self, decision: Decision) {
        self.report.total_shard_checks += 1;
        if decision.is_saved() {
            self.report.saved_checks += 1;
        }
    }

    /// Nobody cached the parameter: every registered shard is a saved check
    pub fn record_no_readers(&mut self, shards: usize) {
        self.report.total_shard_checks += shards as u64;
        self.report.saved_checks += shards as u64;
    }

    pub fn record_invalidation(&mut self, succeeded: bool) {
        if succeeded {
            self.report.invalidations_sent += 1;
        } else {
            self.report.invalidation_failures += 1;
        }
    }

    pub fn record_processed(&mut self) {
        self.report.notifications_processed += 1;
    }

    pub fn record_dropped(&mut self) {
        self.report.notifications_dropped += 1;
    }

    pub fn snapshot(&self) -> InvalidationReport {
        self.report
    }
}
