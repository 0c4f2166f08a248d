//! Data models for hit statistics

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::ServiceResult;
use crate::time::{TimeRange, TimestampFormat};

/// Hit about to be appended to the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHit {
    /// Service that served the request
    pub app: String,
    pub uri: String,
    /// Client address as reported by the serving app
    pub ip: String,
    pub timestamp: NaiveDateTime,
}

/// Stored hit. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitRecord {
    pub id: i64,
    pub app: String,
    pub uri: String,
    pub ip: String,
    pub timestamp: NaiveDateTime,
}

/// Wire form of a hit, timestamps rendered with the configured format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub app: String,
    pub uri: String,
    pub ip: String,
    pub timestamp: String,
}

impl HitPayload {
    pub fn from_hit(hit: &NewHit, format: &TimestampFormat) -> Self {
        Self {
            id: None,
            app: hit.app.clone(),
            uri: hit.uri.clone(),
            ip: hit.ip.clone(),
            timestamp: format.format(hit.timestamp),
        }
    }

    pub fn from_record(record: &HitRecord, format: &TimestampFormat) -> Self {
        Self {
            id: Some(record.id),
            app: record.app.clone(),
            uri: record.uri.clone(),
            ip: record.ip.clone(),
            timestamp: format.format(record.timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsQuery {
    pub range: TimeRange,
    /// Allow-list of uris; `None` means every uri
    pub uris: Option<BTreeSet<String>>,
    /// Count distinct client addresses instead of raw hits
    pub unique: bool,
}

impl StatsQuery {
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            uris: None,
            unique: false,
        }
    }

    /// Parse wire-level bounds. Malformed timestamps are parse errors, an
    /// inverted range is a validation error.
    pub fn parse(
        start: &str,
        end: &str,
        uris: Option<Vec<String>>,
        unique: bool,
        format: &TimestampFormat,
    ) -> ServiceResult<Self> {
        Ok(Self {
            range: TimeRange::parse(start, end, format)?,
            uris: uris.map(|uris| uris.into_iter().collect()),
            unique,
        })
    }

    pub fn with_uris(mut self, uris: impl IntoIterator<Item = String>) -> Self {
        self.uris = Some(uris.into_iter().collect());
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn admits(&self, hit: &HitRecord) -> bool {
        self.range.contains(hit.timestamp)
            && self
                .uris
                .as_ref()
                .map_or(true, |uris| uris.contains(&hit.uri))
    }
}

/// Aggregated count for one `(app, uri)` group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatEntry {
    pub app: String,
    pub uri: String,
    pub hits: u64,
}
