//! Pagination primitives
//!
//! Offset pagination serves small administrative lists; cursor pagination is
//! mandatory for assignments and history. Cursors are opaque to clients:
//! base64 over `{timestamp_micros}:{uuid}` of the last row seen.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default and maximum page sizes
pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;

/// A pagination request, either offset- or cursor-based
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub cursor: Option<String>,
}

impl PageRequest {
    /// Effective page size, clamped to `[1, MAX_LIMIT]`
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
}

impl<T> Page<T> {
    pub fn of(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
            total: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.next_cursor = cursor;
        self
    }

    pub fn with_total(mut self, total: i64) -> Self {
        self.total = Some(total);
        self
    }
}

/// Encode a (timestamp, id) position into an opaque cursor
pub fn encode_cursor(ts: DateTime<Utc>, id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}:{}", ts.timestamp_micros(), id))
}

/// Decode an opaque cursor back into its (timestamp, id) position
pub fn decode_cursor(cursor: &str) -> Result<(DateTime<Utc>, Uuid)> {
    let bad = || Error::validation("cursor", "malformed cursor");

    let raw = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| bad())?;
    let text = String::from_utf8(raw).map_err(|_| bad())?;
    let (micros, id) = text.split_once(':').ok_or_else(bad)?;

    let micros: i64 = micros.parse().map_err(|_| bad())?;
    let ts = DateTime::from_timestamp_micros(micros).ok_or_else(bad)?;
    let id = Uuid::parse_str(id).map_err(|_| bad())?;

    Ok((ts, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clamping() {
        let req = PageRequest {
            limit: Some(10_000),
            ..Default::default()
        };
        assert_eq!(req.limit(), MAX_LIMIT);

        let req = PageRequest {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(req.limit(), 1);

        assert_eq!(PageRequest::default().limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn test_cursor_round_trip() {
        let ts = Utc::now();
        let id = Uuid::new_v4();
        let cursor = encode_cursor(ts, id);

        let (decoded_ts, decoded_id) = decode_cursor(&cursor).unwrap();
        assert_eq!(decoded_ts.timestamp_micros(), ts.timestamp_micros());
        assert_eq!(decoded_id, id);
    }

    #[test]
    fn test_malformed_cursor_rejected() {
        assert!(decode_cursor("not base64 at all!!!").is_err());
        assert!(decode_cursor(&URL_SAFE_NO_PAD.encode("no-colon")).is_err());
        assert!(decode_cursor(&URL_SAFE_NO_PAD.encode("123:not-a-uuid")).is_err());
    }
}
