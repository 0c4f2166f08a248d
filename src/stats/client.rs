//! Access to the statistics subsystem from the event service
//!
//! The event service records hits and reads view counts through
//! [`StatsClient`]. [`LocalStatsClient`] talks to the hit log in-process,
//! [`HttpStatsClient`] talks to a remote stats server.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::stats::aggregator::StatsAggregator;
use crate::stats::models::{HitPayload, NewHit, StatEntry, StatsQuery};
use crate::stats::recorder::HitRecorder;
use crate::storage::HitStorage;
use crate::time::{TimeRange, TimestampFormat};

#[async_trait]
pub trait StatsClient: Send + Sync {
    /// Append one hit
    async fn record(&self, hit: NewHit) -> Result<()>;

    /// Distinct-visitor counts per uri over `range`, for hits recorded by `app`.
    /// Uris without hits are absent from the map.
    async fn view_counts(
        &self,
        app: &str,
        uris: &[String],
        range: TimeRange,
    ) -> Result<HashMap<String, u64>>;
}

/// Counts per uri for one app. Distinct-ip counts of different apps cannot be
/// added, so other apps' entries are dropped.
fn counts_by_uri(entries: Vec<StatEntry>, app: &str) -> HashMap<String, u64> {
    entries
        .into_iter()
        .filter(|entry| entry.app == app)
        .map(|entry| (entry.uri, entry.hits))
        .collect()
}

pub struct LocalStatsClient {
    recorder: HitRecorder,
    aggregator: StatsAggregator,
}

impl LocalStatsClient {
    pub fn new(hits: Arc<dyn HitStorage>, format: TimestampFormat) -> Self {
        Self {
            recorder: HitRecorder::new(Arc::clone(&hits), format),
            aggregator: StatsAggregator::new(hits),
        }
    }
}

#[async_trait]
impl StatsClient for LocalStatsClient {
    async fn record(&self, hit: NewHit) -> Result<()> {
        self.recorder.record_hit(hit).await?;
        Ok(())
    }

    async fn view_counts(
        &self,
        app: &str,
        uris: &[String],
        range: TimeRange,
    ) -> Result<HashMap<String, u64>> {
        let query = StatsQuery::new(range)
            .with_uris(uris.iter().cloned())
            .unique(true);
        let entries = self.aggregator.query(&query).await?;
        Ok(counts_by_uri(entries, app))
    }
}

pub struct HttpStatsClient {
    client: reqwest::Client,
    base_url: String,
    format: TimestampFormat,
}

impl HttpStatsClient {
    pub fn new(base_url: impl Into<String>, format: TimestampFormat) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build stats HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            format,
        })
    }
}

#[async_trait]
impl StatsClient for HttpStatsClient {
    async fn record(&self, hit: NewHit) -> Result<()> {
        let payload = HitPayload::from_hit(&hit, &self.format);
        self.client
            .post(format!("{}/hit", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("Failed to reach stats server")?
            .error_for_status()
            .context("Stats server rejected hit")?;
        Ok(())
    }

    async fn view_counts(
        &self,
        app: &str,
        uris: &[String],
        range: TimeRange,
    ) -> Result<HashMap<String, u64>> {
        let mut params = vec![
            ("start", self.format.format(range.start())),
            ("end", self.format.format(range.end())),
            ("unique", "true".to_string()),
        ];
        params.extend(uris.iter().map(|uri| ("uris", uri.clone())));

        let url = reqwest::Url::parse_with_params(&format!("{}/stats", self.base_url), &params)
            .context("Invalid stats server URL")?;

        let entries: Vec<StatEntry> = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach stats server")?
            .error_for_status()
            .context("Stats server rejected query")?
            .json()
            .await
            .context("Malformed stats response")?;

        Ok(counts_by_uri(entries, app))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::NaiveDateTime;

    fn ts(value: &str) -> NaiveDateTime {
        TimestampFormat::default().parse(value).unwrap()
    }

    fn hit(uri: &str, ip: &str) -> NewHit {
        NewHit {
            app: "ewm-main-service".to_string(),
            uri: uri.to_string(),
            ip: ip.to_string(),
            timestamp: ts("2024-05-01 10:00:00"),
        }
    }

    fn entry(app: &str, uri: &str, hits: u64) -> StatEntry {
        StatEntry {
            app: app.to_string(),
            uri: uri.to_string(),
            hits,
        }
    }

    #[test]
    fn test_counts_keep_only_the_requesting_app() {
        let counts = counts_by_uri(
            vec![
                entry("a", "/events/1", 2),
                entry("b", "/events/1", 3),
                entry("b", "/events/2", 1),
            ],
            "a",
        );
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["/events/1"], 2);
    }

    #[tokio::test]
    async fn test_local_client_counts_distinct_visitors() {
        let client = LocalStatsClient::new(Arc::new(MemoryStorage::new()), TimestampFormat::default());
        client.record(hit("/events/1", "1.1.1.1")).await.unwrap();
        client.record(hit("/events/1", "1.1.1.1")).await.unwrap();
        client.record(hit("/events/1", "2.2.2.2")).await.unwrap();
        client.record(hit("/events/2", "1.1.1.1")).await.unwrap();
        client.record(hit("/events", "1.1.1.1")).await.unwrap();
        client
            .record(NewHit {
                app: "other-service".to_string(),
                ..hit("/events/1", "3.3.3.3")
            })
            .await
            .unwrap();

        let range = TimeRange::new(ts("2024-05-01 00:00:00"), ts("2024-05-02 00:00:00")).unwrap();
        let counts = client
            .view_counts(
                "ewm-main-service",
                &["/events/1".to_string(), "/events/3".to_string()],
                range,
            )
            .await
            .unwrap();

        assert_eq!(counts.get("/events/1"), Some(&2));
        assert_eq!(counts.get("/events/2"), None);
        assert_eq!(counts.get("/events/3"), None);
    }
}
