//! Storage backend integration tests
//!
//! The SQL backend renders filters to SQL while the in-memory backend folds
//! them in Rust; both must select the same events in the same order.

use chrono::NaiveDateTime;
use evently::events::{FilterSpec, PageRequest};
use evently::models::{Event, EventChanges, EventState, Location};
use evently::stats::{aggregate, HitRecord, NewHit, StatsQuery};
use evently::storage::{
    EventOrder, EventStorage, HitStorage, MemoryStorage, SqliteStorage, StorageError,
};
use evently::time::{TimeRange, TimestampFormat};
use std::sync::Arc;

fn ts(value: &str) -> NaiveDateTime {
    TimestampFormat::default().parse(value).unwrap()
}

async fn create_sqlite() -> Arc<SqliteStorage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn sample_event(i: i64) -> Event {
    Event {
        id: 0,
        title: format!("Event {i}"),
        annotation: if i == 4 {
            "50% off tickets".to_string()
        } else {
            format!("Annotation {i}")
        },
        description: match i {
            7 => "Open-air JAZZ concert".to_string(),
            9 => "Джаз вечер у реки".to_string(),
            11 => "Ночной ДЖАЗ".to_string(),
            _ => format!("Description {i}"),
        },
        category_id: i % 3 + 1,
        initiator_id: i % 2 + 1,
        event_date: ts(&format!("2099-06-{:02} 18:00:00", 13 - i)),
        created_on: ts("2024-01-01 00:00:00"),
        published_on: None,
        paid: i % 4 == 0,
        participant_limit: if i % 5 == 0 { 0 } else { 2 },
        confirmed_requests: i % 3,
        request_moderation: true,
        state: match i % 3 {
            0 => EventState::Published,
            1 => EventState::Pending,
            _ => EventState::Canceled,
        },
        location: Location { lat: 1.0, lon: 2.0 },
    }
}

async fn seed(storage: &dyn EventStorage) {
    for i in 1..=12 {
        storage.insert_event(&sample_event(i)).await.unwrap();
    }
}

fn filters() -> Vec<FilterSpec> {
    let range = TimeRange::new(ts("2099-06-03 00:00:00"), ts("2099-06-08 23:59:59")).unwrap();
    vec![
        FilterSpec::new(),
        FilterSpec::new().with_actors([1]),
        FilterSpec::new().with_states([EventState::Published, EventState::Pending]),
        FilterSpec::new().with_categories([2, 3]),
        FilterSpec::new().with_categories(Vec::<i64>::new()),
        FilterSpec::new().with_range(range),
        FilterSpec::new().with_text("jazz"),
        FilterSpec::new().with_text("Джаз"),
        FilterSpec::new().with_text("джаз"),
        FilterSpec::new().with_text("ВЕЧЕР"),
        FilterSpec::new().with_text("джаз").with_actors([2]),
        FilterSpec::new().with_text("50%"),
        FilterSpec::new().with_text("0%_"),
        FilterSpec::new().with_paid(true),
        FilterSpec::new().with_only_available(true),
        FilterSpec::new().with_only_available(false),
        FilterSpec::new()
            .with_actors([2])
            .with_categories([1, 2])
            .with_only_available(true)
            .with_paid(false),
    ]
}

fn ids(events: &[Event]) -> Vec<i64> {
    events.iter().map(|e| e.id).collect()
}

#[tokio::test]
async fn test_sql_and_memory_filters_agree() {
    let sqlite = create_sqlite().await;
    let memory = MemoryStorage::new();
    seed(sqlite.as_ref()).await;
    seed(&memory).await;

    for filter in filters() {
        for order in [EventOrder::Id, EventOrder::EventDate] {
            let from_sql = sqlite.find_events(&filter, order, None).await.unwrap();
            let from_memory = memory.find_events(&filter, order, None).await.unwrap();
            assert_eq!(
                ids(&from_sql),
                ids(&from_memory),
                "filter {filter:?} order {order:?}"
            );
        }
    }
}

#[tokio::test]
async fn test_text_filter_treats_wildcards_literally() {
    let sqlite = create_sqlite().await;
    seed(sqlite.as_ref()).await;

    let found = sqlite
        .find_events(&FilterSpec::new().with_text("50%"), EventOrder::Id, None)
        .await
        .unwrap();
    assert_eq!(ids(&found), vec![4]);

    let found = sqlite
        .find_events(&FilterSpec::new().with_text("%"), EventOrder::Id, None)
        .await
        .unwrap();
    assert_eq!(ids(&found), vec![4]);
}

#[tokio::test]
async fn test_text_filter_folds_non_ascii_case() {
    let sqlite = create_sqlite().await;
    seed(sqlite.as_ref()).await;

    for needle in ["Джаз", "джаз", "ДЖАЗ"] {
        let found = sqlite
            .find_events(&FilterSpec::new().with_text(needle), EventOrder::Id, None)
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![9, 11], "needle {needle}");
    }

    // Pages are cut after the text match
    let second = sqlite
        .find_events(
            &FilterSpec::new().with_text("джаз"),
            EventOrder::Id,
            Some(PageRequest::from_offset(1, 1).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(ids(&second), vec![11]);
}

#[tokio::test]
async fn test_pagination_in_sql() {
    let sqlite = create_sqlite().await;
    seed(sqlite.as_ref()).await;

    let page = PageRequest::from_offset(12, 5).unwrap();
    assert_eq!(page.page(), 2);
    let third = sqlite
        .find_events(&FilterSpec::new(), EventOrder::Id, Some(page))
        .await
        .unwrap();
    assert_eq!(ids(&third), vec![11, 12]);

    let by_date = sqlite
        .find_events(
            &FilterSpec::new(),
            EventOrder::EventDate,
            Some(PageRequest::from_offset(0, 3).unwrap()),
        )
        .await
        .unwrap();
    assert_eq!(ids(&by_date), vec![12, 11, 10]);
}

#[tokio::test]
async fn test_event_round_trips_through_sql() {
    let sqlite = create_sqlite().await;
    let mut event = sample_event(3);
    event.published_on = Some(ts("2024-02-02 10:00:00"));

    let stored = sqlite.insert_event(&event).await.unwrap();
    let loaded = sqlite.get_event(stored.id).await.unwrap().unwrap();
    assert_eq!(loaded, stored);
    assert!(sqlite.get_event(999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sql_compare_and_swap() {
    let sqlite = create_sqlite().await;
    let stored = sqlite.insert_event(&sample_event(1)).await.unwrap();
    assert_eq!(stored.state, EventState::Pending);

    let publish = EventChanges {
        state: Some(EventState::Published),
        published_on: Some(ts("2024-03-01 12:00:00")),
        title: Some("Renamed".to_string()),
        location: Some(Location { lat: 3.5, lon: 4.5 }),
        ..Default::default()
    };
    let updated = sqlite
        .update_event(stored.id, EventState::Pending, &publish)
        .await
        .unwrap();
    assert_eq!(updated.state, EventState::Published);
    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.location, Location { lat: 3.5, lon: 4.5 });
    assert_eq!(updated.published_on, Some(ts("2024-03-01 12:00:00")));

    let err = sqlite
        .update_event(stored.id, EventState::Pending, &publish)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    let err = sqlite
        .update_event(999, EventState::Pending, &publish)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));

    let loaded = sqlite.get_event(stored.id).await.unwrap().unwrap();
    assert_eq!(loaded, updated);
}

#[tokio::test]
async fn test_sql_concurrent_swaps_have_one_winner() {
    let sqlite = create_sqlite().await;
    let stored = sqlite.insert_event(&sample_event(1)).await.unwrap();

    let mut handles = vec![];
    for i in 0..10 {
        let storage = Arc::clone(&sqlite);
        handles.push(tokio::spawn(async move {
            let target = if i % 2 == 0 {
                EventState::Published
            } else {
                EventState::Canceled
            };
            let changes = EventChanges {
                state: Some(target),
                ..Default::default()
            };
            storage
                .update_event(stored.id, EventState::Pending, &changes)
                .await
                .is_ok()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_unique_constraints() {
    let sqlite = create_sqlite().await;
    let user = sqlite.insert_user("Ann", "ann@example.com").await.unwrap();
    assert!(sqlite.user_exists(user.id).await.unwrap());
    assert!(!sqlite.user_exists(user.id + 1).await.unwrap());
    assert!(matches!(
        sqlite.insert_user("Ann", "ann@example.com").await,
        Err(StorageError::Conflict(_))
    ));

    let category = sqlite.insert_category("Concerts").await.unwrap();
    assert!(sqlite.category_exists(category.id).await.unwrap());
    assert!(matches!(
        sqlite.insert_category("Concerts").await,
        Err(StorageError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_sql_hit_stats_match_in_memory_aggregation() {
    let sqlite = create_sqlite().await;
    let hits = [
        ("svc", "/events/1", "1.1.1.1", "2024-05-01 10:00:00"),
        ("svc", "/events/2", "1.1.1.1", "2024-05-01 10:00:00"),
        ("svc", "/events/2", "2.2.2.2", "2024-05-01 11:00:00"),
        ("svc", "/events/2", "2.2.2.2", "2024-05-01 12:00:00"),
        ("other", "/events/1", "3.3.3.3", "2024-05-01 13:00:00"),
        ("svc", "/events/3", "1.1.1.1", "2024-05-02 00:00:00"),
    ];

    let mut records: Vec<HitRecord> = Vec::new();
    for (app, uri, ip, at) in hits {
        let record = sqlite
            .insert_hit(&NewHit {
                app: app.to_string(),
                uri: uri.to_string(),
                ip: ip.to_string(),
                timestamp: ts(at),
            })
            .await
            .unwrap();
        records.push(record);
    }

    let day = TimeRange::new(ts("2024-05-01 00:00:00"), ts("2024-05-01 23:59:59")).unwrap();
    let queries = [
        StatsQuery::new(day),
        StatsQuery::new(day).unique(true),
        StatsQuery::new(day).with_uris(["/events/1".to_string()]),
        StatsQuery::new(day).with_uris(Vec::new()),
    ];

    for query in queries {
        let from_sql = sqlite.hit_stats(&query).await.unwrap();
        assert_eq!(from_sql, aggregate(&records, &query), "query {query:?}");
    }
}
