//! # Temporal Module
//!
//! Timestamp parsing and the anchor-relative window used by the temporal grouper.
//! All times are normalized to UTC epoch seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

/// Represents a temporal instant as UTC epoch seconds
pub type Instant = i64;

/// One hour, the span every observed burst rule uses.
pub const ONE_HOUR: Instant = 3600;

const DATETIME_FORMATS: &[&[FormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
    format_description!("[day]/[month]/[year] [hour]:[minute]:[second]"),
    format_description!("[day]/[month]/[year] [hour]:[minute]"),
];

const DATE_FORMATS: &[&[FormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]"),
    format_description!("[day]/[month]/[year]"),
];

/// Parse a textual timestamp into an [`Instant`].
///
/// Accepts RFC 3339, the spreadsheet-export layouts (`YYYY-MM-DD HH:MM[:SS[.fff]]`,
/// `DD/MM/YYYY HH:MM[:SS]`) and bare dates, which resolve to midnight UTC. Naive
/// timestamps are taken to be UTC. Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<Instant> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt.unix_timestamp());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = PrimitiveDateTime::parse(raw, *format) {
            return Some(dt.assume_utc().unix_timestamp());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = Date::parse(raw, *format) {
            return Some(date.midnight().assume_utc().unix_timestamp());
        }
    }
    None
}

/// Render an instant as an RFC 3339 string, falling back to the raw seconds.
pub fn format_instant(instant: Instant) -> String {
    OffsetDateTime::from_unix_timestamp(instant)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| instant.to_string())
}

/// A closed time span measured forward from an anchor.
///
/// A time `t` fits the window anchored at `a` when `t - a <= span`. Deltas may be
/// negative on secondary time columns, which are not the sort key; those still fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub span: Instant,
}

impl TimeWindow {
    pub fn new(span: Instant) -> Self {
        Self { span }
    }

    pub fn hours(hours: i64) -> Self {
        Self::new(hours * ONE_HOUR)
    }

    /// Whether `t` lies within the span of `anchor`.
    pub fn admits(&self, anchor: Instant, t: Instant) -> bool {
        t.saturating_sub(anchor) <= self.span
    }

    /// Component-wise check over parallel time columns; every column must fit its own anchor.
    pub fn admits_all(&self, anchors: &[Instant], times: &[Instant]) -> bool {
        anchors.len() == times.len()
            && anchors
                .iter()
                .zip(times)
                .all(|(anchor, t)| self.admits(*anchor, *t))
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::new(ONE_HOUR)
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span % ONE_HOUR == 0 {
            write!(f, "{}h", self.span / ONE_HOUR)
        } else {
            write!(f, "{}s", self.span)
        }
    }
}
