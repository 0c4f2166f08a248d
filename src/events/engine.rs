//! Event reads
//!
//! Every read returns [`EnrichedEvent`]s: the stored event together with its
//! distinct-visitor view count and its comments. Public reads additionally
//! record one hit before answering.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::events::filter::FilterSpec;
use crate::events::page::{Page, PageRequest};
use crate::models::{event_uri, Comment, Event, EventState};
use crate::stats::{NewHit, StatsClient};
use crate::storage::{EventOrder, EventStorage};
use crate::time::{self, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum EventSort {
    EventDate,
    Views,
}

/// Request attributes a hit is recorded with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub uri: String,
    pub ip: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedEvent {
    pub event: Event,
    pub views: u64,
    pub comments: Vec<Comment>,
}

#[derive(Clone)]
pub struct EventQueryEngine {
    events: Arc<dyn EventStorage>,
    stats: Arc<dyn StatsClient>,
    app_name: String,
}

impl EventQueryEngine {
    pub fn new(
        events: Arc<dyn EventStorage>,
        stats: Arc<dyn StatsClient>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            events,
            stats,
            app_name: app_name.into(),
        }
    }

    /// Filtered, sorted and paginated listing.
    ///
    /// Without a sort the listing is in id order. Sorting by views needs
    /// every match's count before the page can be cut, so all matches are
    /// loaded and the page is sliced afterwards.
    pub async fn search(
        &self,
        filter: &FilterSpec,
        sort: Option<EventSort>,
        page: PageRequest,
    ) -> ServiceResult<Page<EnrichedEvent>> {
        let items = match sort {
            Some(EventSort::Views) => {
                let matches = self.events.find_events(filter, EventOrder::Id, None).await?;
                let views = self.view_counts(&matches).await;

                let mut ranked: Vec<(Event, u64)> = matches
                    .into_iter()
                    .map(|event| {
                        let count = views.get(&event.id).copied().unwrap_or(0);
                        (event, count)
                    })
                    .collect();
                ranked.sort_by_key(|(event, count)| (*count, event.id));

                let mut items = Vec::new();
                for (event, views) in page.slice(ranked) {
                    let comments = self.events.list_comments(event.id).await?;
                    items.push(EnrichedEvent {
                        event,
                        views,
                        comments,
                    });
                }
                items
            }
            sort => {
                let order = match sort {
                    Some(EventSort::EventDate) => EventOrder::EventDate,
                    _ => EventOrder::Id,
                };
                let events = self.events.find_events(filter, order, Some(page)).await?;
                self.enrich(events).await?
            }
        };

        debug!(
            returned = items.len(),
            page = page.page(),
            size = page.size(),
            "Event search"
        );
        Ok(Page::new(items, page))
    }

    /// Anonymous listing of published events; records one hit for the request
    pub async fn public_search(
        &self,
        filter: FilterSpec,
        sort: Option<EventSort>,
        page: PageRequest,
        request: &RequestInfo,
    ) -> ServiceResult<Page<EnrichedEvent>> {
        if let Some(range) = &filter.range {
            range.ensure_not_past(time::now())?;
        }

        let filter = FilterSpec {
            states: Some([EventState::Published].into_iter().collect()),
            ..filter
        };

        self.record_hit(request).await;
        self.search(&filter, sort, page).await
    }

    /// Unrestricted listing for moderators
    pub async fn admin_search(
        &self,
        filter: &FilterSpec,
        page: PageRequest,
    ) -> ServiceResult<Page<EnrichedEvent>> {
        self.search(filter, None, page).await
    }

    pub async fn by_initiator(
        &self,
        initiator_id: i64,
        page: PageRequest,
    ) -> ServiceResult<Page<EnrichedEvent>> {
        let filter = FilterSpec::new().with_actors([initiator_id]);
        self.search(&filter, None, page).await
    }

    /// A single event as seen by its initiator; other users' events are not found
    pub async fn initiator_event(
        &self,
        initiator_id: i64,
        event_id: i64,
    ) -> ServiceResult<EnrichedEvent> {
        let event = self.by_id(event_id).await?;
        if event.initiator_id != initiator_id {
            return Err(ServiceError::NotFound(format!(
                "event {event_id} of user {initiator_id}"
            )));
        }
        self.enrich_one(event).await
    }

    /// A published event by id; records one hit for the request
    pub async fn public_by_id(
        &self,
        event_id: i64,
        request: &RequestInfo,
    ) -> ServiceResult<EnrichedEvent> {
        let event = self.by_id(event_id).await?;
        if event.state != EventState::Published {
            return Err(ServiceError::NotFound(format!("event {event_id}")));
        }

        self.record_hit(request).await;
        self.enrich_one(event).await
    }

    pub async fn by_id(&self, event_id: i64) -> ServiceResult<Event> {
        self.events
            .get_event(event_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))
    }

    pub async fn enrich_one(&self, event: Event) -> ServiceResult<EnrichedEvent> {
        let mut enriched = self.enrich(vec![event]).await?;
        enriched
            .pop()
            .ok_or_else(|| ServiceError::Storage(anyhow::anyhow!("enrichment dropped an event")))
    }

    /// Attach view counts (one batched stats call) and comments, keeping input order
    pub async fn enrich(&self, events: Vec<Event>) -> ServiceResult<Vec<EnrichedEvent>> {
        let views = self.view_counts(&events).await;

        let mut enriched = Vec::with_capacity(events.len());
        for event in events {
            let comments = self.events.list_comments(event.id).await?;
            enriched.push(EnrichedEvent {
                views: views.get(&event.id).copied().unwrap_or(0),
                event,
                comments,
            });
        }
        Ok(enriched)
    }

    /// Distinct visitors per event id since the earliest creation among `events`.
    /// A stats failure degrades every count to zero.
    async fn view_counts(&self, events: &[Event]) -> HashMap<i64, u64> {
        let Some(earliest) = events.iter().map(|e| e.created_on).min() else {
            return HashMap::new();
        };
        let now = time::now();
        let Ok(range) = TimeRange::new(earliest.min(now), now) else {
            return HashMap::new();
        };

        let uris: Vec<String> = events.iter().map(Event::uri).collect();
        match self.stats.view_counts(&self.app_name, &uris, range).await {
            Ok(counts) => events
                .iter()
                .map(|e| (e.id, counts.get(&event_uri(e.id)).copied().unwrap_or(0)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to fetch view counts, reporting zero views");
                HashMap::new()
            }
        }
    }

    async fn record_hit(&self, request: &RequestInfo) {
        let hit = NewHit {
            app: self.app_name.clone(),
            uri: request.uri.clone(),
            ip: request.ip.clone(),
            timestamp: time::now(),
        };

        if let Err(e) = self.stats.record(hit).await {
            warn!(uri = %request.uri, error = %e, "Failed to record hit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::fixtures::event;
    use crate::models::EventChanges;
    use crate::stats::LocalStatsClient;
    use crate::storage::MemoryStorage;
    use crate::time::TimestampFormat;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct Fixture {
        storage: Arc<MemoryStorage>,
        engine: EventQueryEngine,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let stats = Arc::new(LocalStatsClient::new(
            storage.clone(),
            TimestampFormat::default(),
        ));
        Fixture {
            engine: EventQueryEngine::new(storage.clone(), stats, "ewm-main-service"),
            storage,
        }
    }

    async fn publish(storage: &MemoryStorage, id: i64) {
        let changes = EventChanges {
            state: Some(EventState::Published),
            ..Default::default()
        };
        storage
            .update_event(id, EventState::Pending, &changes)
            .await
            .unwrap();
    }

    fn visitor(ip: &str, uri: &str) -> RequestInfo {
        RequestInfo {
            uri: uri.to_string(),
            ip: ip.to_string(),
        }
    }

    fn ids(page: &Page<EnrichedEvent>) -> Vec<i64> {
        page.items.iter().map(|e| e.event.id).collect()
    }

    #[tokio::test]
    async fn test_public_search_only_returns_published() {
        let f = fixture();
        for _ in 0..3 {
            f.storage.insert_event(&event(0)).await.unwrap();
        }
        publish(&f.storage, 2).await;

        let page = f
            .engine
            .public_search(
                FilterSpec::new(),
                None,
                PageRequest::from_offset(0, 10).unwrap(),
                &visitor("1.1.1.1", "/events"),
            )
            .await
            .unwrap();
        assert_eq!(ids(&page), vec![2]);
    }

    #[tokio::test]
    async fn test_public_search_rejects_past_range_end() {
        let f = fixture();
        let range = TimeRange::new(
            crate::models::event::fixtures::ts("2000-01-01 00:00:00"),
            crate::models::event::fixtures::ts("2000-01-02 00:00:00"),
        )
        .unwrap();

        let err = f
            .engine
            .public_search(
                FilterSpec::new().with_range(range),
                None,
                PageRequest::from_offset(0, 10).unwrap(),
                &visitor("1.1.1.1", "/events"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        // The admin listing has no such restriction
        f.engine
            .admin_search(
                &FilterSpec::new().with_range(range),
                PageRequest::from_offset(0, 10).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_public_by_id_counts_distinct_visitors() {
        let f = fixture();
        let mut e = event(0);
        e.created_on = time::now() - chrono::Duration::hours(1);
        let stored = f.storage.insert_event(&e).await.unwrap();
        publish(&f.storage, stored.id).await;

        let uri = event_uri(stored.id);
        f.engine
            .public_by_id(stored.id, &visitor("1.1.1.1", &uri))
            .await
            .unwrap();
        f.engine
            .public_by_id(stored.id, &visitor("1.1.1.1", &uri))
            .await
            .unwrap();
        let seen = f
            .engine
            .public_by_id(stored.id, &visitor("2.2.2.2", &uri))
            .await
            .unwrap();

        assert_eq!(seen.views, 2);
    }

    #[tokio::test]
    async fn test_unpublished_event_is_not_public() {
        let f = fixture();
        let stored = f.storage.insert_event(&event(0)).await.unwrap();

        let err = f
            .engine
            .public_by_id(stored.id, &visitor("1.1.1.1", "/events/1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sort_by_views_then_page() {
        let f = fixture();
        let mut e = event(0);
        e.created_on = time::now() - chrono::Duration::hours(1);
        for _ in 0..3 {
            f.storage.insert_event(&e).await.unwrap();
        }

        // event 1: two visitors, event 2: none, event 3: one visitor
        for (ip, id) in [("1.1.1.1", 1), ("2.2.2.2", 1), ("1.1.1.1", 3)] {
            f.engine.record_hit(&visitor(ip, &event_uri(id))).await;
        }

        let all = f
            .engine
            .search(
                &FilterSpec::new(),
                Some(EventSort::Views),
                PageRequest::from_offset(0, 10).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&all), vec![2, 3, 1]);
        let views: Vec<u64> = all.items.iter().map(|e| e.views).collect();
        assert_eq!(views, vec![0, 1, 2]);

        let second = f
            .engine
            .search(
                &FilterSpec::new(),
                Some(EventSort::Views),
                PageRequest::from_offset(2, 2).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&second), vec![1]);
        assert_eq!(second.page, 1);
    }

    #[tokio::test]
    async fn test_initiator_event_requires_ownership() {
        let f = fixture();
        let stored = f.storage.insert_event(&event(0)).await.unwrap();

        assert!(f.engine.initiator_event(1, stored.id).await.is_ok());
        let err = f.engine.initiator_event(2, stored.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    struct FailingStats;

    #[async_trait]
    impl StatsClient for FailingStats {
        async fn record(&self, _hit: NewHit) -> anyhow::Result<()> {
            Err(anyhow!("stats server down"))
        }

        async fn view_counts(
            &self,
            _app: &str,
            _uris: &[String],
            _range: TimeRange,
        ) -> anyhow::Result<HashMap<String, u64>> {
            Err(anyhow!("stats server down"))
        }
    }

    #[tokio::test]
    async fn test_stats_failures_do_not_fail_reads() {
        let storage = Arc::new(MemoryStorage::new());
        let engine = EventQueryEngine::new(storage.clone(), Arc::new(FailingStats), "svc");
        let stored = storage.insert_event(&event(0)).await.unwrap();
        publish(&storage, stored.id).await;

        let seen = engine
            .public_by_id(stored.id, &visitor("1.1.1.1", "/events/1"))
            .await
            .unwrap();
        assert_eq!(seen.views, 0);
    }
}
