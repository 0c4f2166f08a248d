use std::sync::Arc;
use tracing::debug;

use crate::error::{ServiceError, ServiceResult};
use crate::stats::models::{HitPayload, HitRecord, NewHit};
use crate::storage::HitStorage;
use crate::time::TimestampFormat;

/// Appends hits to the log
///
/// Every call stores a new record; identical hits are not deduplicated.
#[derive(Clone)]
pub struct HitRecorder {
    hits: Arc<dyn HitStorage>,
    format: TimestampFormat,
}

impl HitRecorder {
    pub fn new(hits: Arc<dyn HitStorage>, format: TimestampFormat) -> Self {
        Self { hits, format }
    }

    /// Record a hit given in wire form
    pub async fn record(
        &self,
        app: &str,
        uri: &str,
        ip: &str,
        timestamp: &str,
    ) -> ServiceResult<HitRecord> {
        let timestamp = self.format.parse(timestamp)?;
        self.record_hit(NewHit {
            app: app.to_string(),
            uri: uri.to_string(),
            ip: ip.to_string(),
            timestamp,
        })
        .await
    }

    pub async fn record_payload(&self, payload: &HitPayload) -> ServiceResult<HitRecord> {
        self.record(&payload.app, &payload.uri, &payload.ip, &payload.timestamp)
            .await
    }

    pub async fn record_hit(&self, hit: NewHit) -> ServiceResult<HitRecord> {
        for (field, value) in [("app", &hit.app), ("uri", &hit.uri), ("ip", &hit.ip)] {
            if value.trim().is_empty() {
                return Err(ServiceError::Validation(format!("{field} must not be blank")));
            }
        }

        let record = self.hits.insert_hit(&hit).await?;
        debug!(
            hit_id = record.id,
            app = %record.app,
            uri = %record.uri,
            "Recorded hit"
        );
        Ok(record)
    }

    pub fn format(&self) -> &TimestampFormat {
        &self.format
    }
}
