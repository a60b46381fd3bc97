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

//! Per-shard invalidate-or-skip decision.

use crate::core::types::Expiry;
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Outcome of checking one shard for one changed parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The shard may serve a stale copy past what its own TTL catches
    Invalidate,
    /// No read-log entry: the shard refetches on demand
    SkipNotCached,
    /// The cached copy expires within the uncertainty-adjusted window
    SkipSelfExpiring,
}

impl Decision {
    /// Whether this check avoided a round trip
    pub fn is_saved(self) -> bool {
        !matches!(self, Decision::Invalidate)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Invalidate => write!(f, "invalidate"),
            Decision::SkipNotCached => write!(f, "skip (not cached)"),
            Decision::SkipSelfExpiring => write!(f, "skip (self-expiring)"),
        }
    }
}

/// Decide for a shard, given whether it holds a read-log entry.
///
/// A cached shard is invalidated iff `now + uncertainty < expiry`. An unknown
/// expiry always invalidates.
pub fn decide(cached: bool, now: DateTime<Utc>, uncertainty: Duration, expiry: Expiry) -> Decision {
    if !cached {
        return Decision::SkipNotCached;
    }
    match expiry {
        Expiry::Unknown => Decision::Invalidate,
        Expiry::At(at) => {
            // An unrepresentable horizon lies past any expiry.
            let at_risk = now.checked_add_signed(uncertainty).map_or(false, |horizon| horizon < at);
            if at_risk {
                Decision::Invalidate
            } else {
                Decision::SkipSelfExpiring
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z").unwrap().with_timezone(&Utc)
    }

    fn window() -> Duration {
        Duration::milliseconds(500)
    }

    #[test]
    fn test_not_cached_is_skipped() {
        let expiry = Expiry::At(t0() + Duration::seconds(60));
        assert_eq!(decide(false, t0(), window(), expiry), Decision::SkipNotCached);
        assert_eq!(decide(false, t0(), window(), Expiry::Unknown), Decision::SkipNotCached);
    }

    #[test]
    fn test_cached_before_expiry_is_invalidated() {
        let expiry = Expiry::At(t0() + Duration::milliseconds(5500));
        assert_eq!(decide(true, t0() + Duration::milliseconds(10), window(), expiry), Decision::Invalidate);
    }

    #[test]
    fn test_cached_within_window_is_skipped() {
        let expiry = Expiry::At(t0() + Duration::milliseconds(5500));
        assert_eq!(
            decide(true, t0() + Duration::milliseconds(5100), window(), expiry),
            Decision::SkipSelfExpiring
        );
        assert_eq!(
            decide(true, t0() + Duration::seconds(10), window(), expiry),
            Decision::SkipSelfExpiring
        );
    }

    #[test]
    fn test_boundary_is_skipped() {
        // now + window == expiry is not strictly before it
        let expiry = Expiry::At(t0() + Duration::milliseconds(500));
        assert_eq!(decide(true, t0(), window(), expiry), Decision::SkipSelfExpiring);

        let expiry = Expiry::At(t0() + Duration::milliseconds(501));
        assert_eq!(decide(true, t0(), window(), expiry), Decision::Invalidate);
    }

    #[test]
    fn test_unknown_expiry_invalidates() {
        assert_eq!(decide(true, t0(), window(), Expiry::Unknown), Decision::Invalidate);
    }

    #[test]
    fn test_saved_flag() {
        assert!(!Decision::Invalidate.is_saved());
        assert!(Decision::SkipNotCached.is_saved());
        assert!(Decision::SkipSelfExpiring.is_saved());
    }
}
