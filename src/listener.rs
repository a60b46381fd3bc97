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

//! Change-channel listener feeding the engine one notification at a time.

use crate::core::error::{Result, StoreError};
use crate::engine::{ChangeOutcome, InvalidationEngine};
use crate::store::{NotificationPump, ParameterStore};
use std::fmt;
use std::future::Future;
use tracing::{debug, error, info, warn};

/// Why the listener loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    LimitReached,
    ChannelClosed,
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::LimitReached => write!(f, "event limit reached"),
            StopReason::ChannelClosed => write!(f, "change channel closed"),
            StopReason::Shutdown => write!(f, "shutdown requested"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSummary {
    /// Notifications taken off the channel
    pub received: u64,
    pub stop: StopReason,
}

impl ListenerSummary {
    /// A closed change channel means the store connection is gone
    pub fn check(&self) -> Result<()> {
        match self.stop {
            StopReason::ChannelClosed => Err(StoreError::ChannelClosed.into()),
            StopReason::LimitReached | StopReason::Shutdown => Ok(()),
        }
    }
}

pub struct Listener {
    limit: Option<u64>,
}

impl Listener {
    /// `limit` bounds how many notifications are handled; `None` runs forever
    pub fn new(limit: Option<u64>) -> Self {
        Self { limit }
    }

    /// Deliver notifications to `engine` until the limit, channel close or `shutdown`.
    ///
    /// A failed notification is logged and dropped; the loop keeps going.
    pub async fn run<S, F>(
        &self,
        events: &mut NotificationPump,
        engine: &mut InvalidationEngine<S>,
        shutdown: F,
    ) -> ListenerSummary
    where
        S: ParameterStore,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut received = 0u64;

        let stop = loop {
            if self.limit.map_or(false, |limit| received >= limit) {
                break StopReason::LimitReached;
            }

            let event = tokio::select! {
                event = events.recv() => event,
                _ = &mut shutdown => break StopReason::Shutdown,
            };
            let Some(event) = event else {
                break StopReason::ChannelClosed;
            };
            received += 1;

            // The payload is the cache key verbatim; whitespace is significant.
            let parameter = event.parameter.as_str();
            if parameter.trim().is_empty() {
                warn!("Ignoring notification with empty payload on '{}'", event.channel);
                engine.record_dropped();
                continue;
            }

            match engine.on_change(parameter).await {
                Ok(ChangeOutcome::Evaluated { invalidated, failed, skipped, .. }) => {
                    debug!(
                        "'{}': {} invalidated, {} failed, {} skipped",
                        parameter,
                        invalidated.len(),
                        failed.len(),
                        skipped
                    );
                }
                Ok(outcome) => debug!("'{}': {:?}", parameter, outcome),
                Err(e) => {
                    error!("error[{}]: dropped notification for '{}': {}", e.code(), parameter, e);
                }
            }
        };

        info!("Listener stopped after {} notification(s): {}", received, stop);
        ListenerSummary { received, stop }
    }
}
