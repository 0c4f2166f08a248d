use crate::events::{FilterSpec, PageRequest};
use crate::models::{Category, Comment, Event, EventChanges, EventState, User};
use crate::storage::{EventOrder, EventStorage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache for single-event lookups
///
/// Listings always go to the inner storage. Every successful write through
/// this wrapper refreshes the cached entry, and a failed compare-and-swap
/// evicts it since the stored state is known to differ.
pub struct CachedEventStorage {
    inner: Arc<dyn EventStorage>,
    read_cache: Cache<i64, Option<Event>>,
}

impl CachedEventStorage {
    pub fn new(inner: Arc<dyn EventStorage>, max_cache_entries: u64, ttl_secs: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, read_cache }
    }

    async fn invalidate(&self, event_id: i64) {
        self.read_cache.invalidate(&event_id).await;
    }
}

#[async_trait]
impl EventStorage for CachedEventStorage {
    async fn insert_user(&self, name: &str, email: &str) -> StorageResult<User> {
        self.inner.insert_user(name, email).await
    }

    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        self.inner.user_exists(user_id).await
    }

    async fn insert_category(&self, name: &str) -> StorageResult<Category> {
        self.inner.insert_category(name).await
    }

    async fn category_exists(&self, category_id: i64) -> Result<bool> {
        self.inner.category_exists(category_id).await
    }

    async fn insert_event(&self, event: &Event) -> StorageResult<Event> {
        let stored = self.inner.insert_event(event).await?;
        self.read_cache
            .insert(stored.id, Some(stored.clone()))
            .await;
        Ok(stored)
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        if let Some(cached) = self.read_cache.get(&event_id).await {
            return Ok(cached);
        }

        let event = self.inner.get_event(event_id).await?;
        self.read_cache.insert(event_id, event.clone()).await;
        Ok(event)
    }

    async fn find_events(
        &self,
        filter: &FilterSpec,
        order: EventOrder,
        page: Option<PageRequest>,
    ) -> Result<Vec<Event>> {
        self.inner.find_events(filter, order, page).await
    }

    async fn update_event(
        &self,
        event_id: i64,
        expected: EventState,
        changes: &EventChanges,
    ) -> StorageResult<Event> {
        match self.inner.update_event(event_id, expected, changes).await {
            Ok(updated) => {
                self.read_cache
                    .insert(event_id, Some(updated.clone()))
                    .await;
                Ok(updated)
            }
            Err(err @ StorageError::Conflict(_)) | Err(err @ StorageError::NotFound(_)) => {
                self.invalidate(event_id).await;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn insert_comment(
        &self,
        event_id: i64,
        author_id: i64,
        text: &str,
        created: NaiveDateTime,
    ) -> StorageResult<Comment> {
        self.inner
            .insert_comment(event_id, author_id, text, created)
            .await
    }

    async fn list_comments(&self, event_id: i64) -> Result<Vec<Comment>> {
        self.inner.list_comments(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::fixtures::event;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_update_refreshes_cached_event() {
        let inner = Arc::new(MemoryStorage::new());
        let cached = CachedEventStorage::new(inner.clone(), 100, 60);

        let stored = cached.insert_event(&event(0)).await.unwrap();
        assert_eq!(
            cached.get_event(stored.id).await.unwrap().unwrap().state,
            EventState::Pending
        );

        let publish = EventChanges {
            state: Some(EventState::Published),
            ..Default::default()
        };
        cached
            .update_event(stored.id, EventState::Pending, &publish)
            .await
            .unwrap();

        let seen = cached.get_event(stored.id).await.unwrap().unwrap();
        assert_eq!(seen.state, EventState::Published);
    }

    #[tokio::test]
    async fn test_failed_swap_evicts_stale_entry() {
        let inner = Arc::new(MemoryStorage::new());
        let cached = CachedEventStorage::new(inner.clone(), 100, 60);
        let stored = cached.insert_event(&event(0)).await.unwrap();

        // Written behind the cache's back
        let cancel = EventChanges {
            state: Some(EventState::Canceled),
            ..Default::default()
        };
        inner
            .update_event(stored.id, EventState::Pending, &cancel)
            .await
            .unwrap();
        assert_eq!(
            cached.get_event(stored.id).await.unwrap().unwrap().state,
            EventState::Pending
        );

        let err = cached
            .update_event(stored.id, EventState::Pending, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(
            cached.get_event(stored.id).await.unwrap().unwrap().state,
            EventState::Canceled
        );
    }
}
