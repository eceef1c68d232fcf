//! Encoding of pending-log entries.
//!
//! An entry is `"{user_id}:{post_id}:{timestamp}"`, the timestamp being
//! fractional seconds since the Unix epoch. Distinct timestamps for the same
//! pair produce distinct entries; the durable store deduplicates them later.

use crate::view_store::ViewRecord;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const FIELD_SEPARATOR: char = ':';

#[derive(Debug, Error, PartialEq)]
pub enum PendingViewError {
    #[error("expected 3 fields, found {0}")]
    WrongFieldCount(usize),

    #[error("invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("invalid post id: {0:?}")]
    InvalidPostId(String),

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// One view event waiting in the pending log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingView {
    pub user_id: i64,
    pub post_id: i64,
    pub timestamp: f64,
}

impl PendingView {
    pub fn new(user_id: i64, post_id: i64, timestamp: f64) -> Self {
        Self {
            user_id,
            post_id,
            timestamp,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn parse(entry: &str) -> Result<Self, PendingViewError> {
        let fields: Vec<&str> = entry.split(FIELD_SEPARATOR).collect();
        let &[user_id, post_id, timestamp] = fields.as_slice() else {
            return Err(PendingViewError::WrongFieldCount(fields.len()));
        };

        let user_id = user_id
            .parse::<i64>()
            .map_err(|_| PendingViewError::InvalidUserId(user_id.to_string()))?;
        let post_id = post_id
            .parse::<i64>()
            .map_err(|_| PendingViewError::InvalidPostId(post_id.to_string()))?;
        let timestamp = timestamp
            .parse::<f64>()
            .ok()
            .filter(|ts| ts.is_finite())
            .ok_or_else(|| PendingViewError::InvalidTimestamp(timestamp.to_string()))?;

        Ok(Self::new(user_id, post_id, timestamp))
    }

    /// The event time, or `None` if the timestamp is outside the representable range.
    pub fn viewed_at(&self) -> Option<DateTime<Utc>> {
        if !self.timestamp.is_finite() {
            return None;
        }
        let secs = self.timestamp.floor();
        if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
            return None;
        }
        let nanos = (((self.timestamp - secs) * 1e9).round() as u32).min(999_999_999);
        DateTime::from_timestamp(secs as i64, nanos)
    }

    pub fn to_record(&self) -> Result<ViewRecord, PendingViewError> {
        let viewed_at = self
            .viewed_at()
            .ok_or_else(|| PendingViewError::InvalidTimestamp(self.timestamp.to_string()))?;
        Ok(ViewRecord::new(self.user_id, self.post_id, viewed_at))
    }
}

impl fmt::Display for PendingView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.user_id,
            self.post_id,
            self.timestamp,
            sep = FIELD_SEPARATOR
        )
    }
}

impl FromStr for PendingView {
    type Err = PendingViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Current wall-clock time as fractional seconds since the Unix epoch.
pub(crate) fn now_timestamp() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_encode_format() {
        let view = PendingView::new(1, 10, 1700000000.25);
        assert_eq!(view.encode(), "1:10:1700000000.25");

        // Whole seconds render without a fractional part
        let view = PendingView::new(7, 3, 1700000000.0);
        assert_eq!(view.encode(), "7:3:1700000000");
    }

    #[test]
    fn test_parse_valid_entry() {
        let view = PendingView::parse("12:345:1700000000.5").unwrap();
        assert_eq!(view, PendingView::new(12, 345, 1700000000.5));

        let view: PendingView = "1:2:3".parse().unwrap();
        assert_eq!(view, PendingView::new(1, 2, 3.0));
    }

    #[test]
    fn test_encoded_entry_parses_back() {
        let timestamp = now_timestamp();
        let view = PendingView::new(99, 1234, timestamp);
        assert_eq!(PendingView::parse(&view.encode()).unwrap(), view);
    }

    #[test]
    fn test_parse_rejects_wrong_field_count() {
        assert_eq!(
            PendingView::parse("1:2"),
            Err(PendingViewError::WrongFieldCount(2))
        );
        assert_eq!(
            PendingView::parse("1:2:3:4"),
            Err(PendingViewError::WrongFieldCount(4))
        );
        assert_eq!(
            PendingView::parse("garbage"),
            Err(PendingViewError::WrongFieldCount(1))
        );
    }

    #[test]
    fn test_parse_rejects_bad_fields() {
        assert!(matches!(
            PendingView::parse("x:2:3.0"),
            Err(PendingViewError::InvalidUserId(_))
        ));
        assert!(matches!(
            PendingView::parse("1:2.5:3.0"),
            Err(PendingViewError::InvalidPostId(_))
        ));
        assert!(matches!(
            PendingView::parse("1:2:soon"),
            Err(PendingViewError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            PendingView::parse("1:2:NaN"),
            Err(PendingViewError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            PendingView::parse("1:2:inf"),
            Err(PendingViewError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            PendingView::parse("1::3"),
            Err(PendingViewError::InvalidPostId(_))
        ));
    }

    #[test]
    fn test_to_record_converts_fractional_seconds() {
        let record = PendingView::new(1, 10, 1700000000.5).to_record().unwrap();
        assert_eq!(record.user_id, 1);
        assert_eq!(record.post_id, 10);
        assert_eq!(
            record.viewed_at,
            Utc.timestamp_opt(1700000000, 500_000_000).unwrap()
        );
    }

    #[test]
    fn test_to_record_rejects_out_of_range_timestamp() {
        let view = PendingView::parse("1:2:1e300").unwrap();
        assert!(matches!(
            view.to_record(),
            Err(PendingViewError::InvalidTimestamp(_))
        ));
    }
}
