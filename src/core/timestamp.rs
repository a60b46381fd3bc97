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

//! Parser for the store's textual `timestamptz` representation.
//!
//! Accepted shape: `YYYY-MM-DD HH:MM:SS[.fraction][(+|-)HH[:MM]]`. The
//! fraction is scaled by its digit count, so `.12345` is 123 450 µs and
//! `.123456` is 123 456 µs. Every instant is normalized to UTC, the same
//! frame as [`chrono::Utc::now`], which the engine uses for "now".

use crate::core::error::TimestampError;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};

const CALENDAR_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const CALENDAR_LEN: usize = 19;
const MAX_FRACTION_DIGITS: usize = 9;

/// Converts store timestamps into UTC instants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampParser {
    /// Offset assumed for timestamps that carry none
    reference_offset: FixedOffset,
}

impl TimestampParser {
    pub fn new(reference_offset: FixedOffset) -> Self {
        Self { reference_offset }
    }

    /// Parser whose reference frame for offset-less input is UTC
    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    pub fn reference_offset(&self) -> FixedOffset {
        self.reference_offset
    }

    /// Parse a timestamp into an absolute UTC instant
    pub fn parse(&self, text: &str) -> Result<DateTime<Utc>, TimestampError> {
        let text = text.trim();
        let malformed = |reason: &str| TimestampError::Malformed {
            input: text.to_string(),
            reason: reason.to_string(),
        };

        // The calendar part contains '-' itself, so only look for a sign after it.
        let sign_at = text
            .char_indices()
            .skip(CALENDAR_LEN)
            .find(|(_, c)| *c == '+' || *c == '-')
            .map(|(i, _)| i);

        let (datetime, offset) = match sign_at {
            Some(i) => (&text[..i], parse_offset(&text[i..])?),
            None => (text, self.reference_offset),
        };

        let (calendar, fraction) = match datetime.split_once('.') {
            Some((calendar, fraction)) => (calendar, Some(fraction)),
            None => (datetime, None),
        };

        let naive = NaiveDateTime::parse_from_str(calendar, CALENDAR_FORMAT)
            .map_err(|e| malformed(&e.to_string()))?;

        let nanos = match fraction {
            Some(digits) => fraction_nanos(digits).ok_or_else(|| malformed("bad fractional seconds"))?,
            None => 0,
        };
        let naive = naive + Duration::nanoseconds(nanos);

        let local = offset
            .from_local_datetime(&naive)
            .single()
            .ok_or_else(|| malformed("calendar time does not exist at offset"))?;

        Ok(local.with_timezone(&Utc))
    }
}

impl Default for TimestampParser {
    fn default() -> Self {
        Self::utc()
    }
}

/// Parse a signed UTC offset: `+HH`, `-HH:MM` or `+HHMM`
pub fn parse_offset(text: &str) -> Result<FixedOffset, TimestampError> {
    let invalid = || TimestampError::InvalidOffset { offset: text.to_string() };

    let (sign, rest) = match text.as_bytes().first() {
        Some(b'+') => (1, &text[1..]),
        Some(b'-') => (-1, &text[1..]),
        _ => return Err(invalid()),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => rest.split_at(2),
        None => (rest, "0"),
    };

    if hours.is_empty() || hours.len() > 2 || minutes.is_empty() || minutes.len() > 2 {
        return Err(invalid());
    }
    if !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

fn fraction_nanos(digits: &str) -> Option<i64> {
    if digits.is_empty() || digits.len() > MAX_FRACTION_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = digits.parse().ok()?;
    Some(value * 10_i64.pow((MAX_FRACTION_DIGITS - digits.len()) as u32))
}
