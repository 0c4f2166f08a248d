//! In-process storage backend
//!
//! Used when `DATABASE_BACKEND=memory` and throughout the unit tests. Event
//! filtering folds the same [`Criterion`](crate::events::Criterion) list the
//! SQL backends render, so both paths agree on matching.

use crate::events::{FilterSpec, PageRequest};
use crate::models::{Category, Comment, Event, EventChanges, EventState, User};
use crate::stats::{aggregate, HitRecord, NewHit, StatEntry, StatsQuery};
use crate::storage::{EventOrder, EventStorage, HitStorage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStorage {
    users: DashMap<i64, User>,
    user_emails: DashMap<String, i64>,
    categories: DashMap<i64, Category>,
    category_names: DashMap<String, i64>,
    events: DashMap<i64, Event>,
    comments: DashMap<i64, Comment>,
    hits: RwLock<Vec<HitRecord>>,
    next_user_id: AtomicI64,
    next_category_id: AtomicI64,
    next_event_id: AtomicI64,
    next_comment_id: AtomicI64,
}

fn next_id(counter: &AtomicI64) -> i64 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStorage for MemoryStorage {
    async fn insert_user(&self, name: &str, email: &str) -> StorageResult<User> {
        match self.user_emails.entry(email.to_string()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(format!(
                "email '{email}' is already registered"
            ))),
            Entry::Vacant(slot) => {
                let user = User {
                    id: next_id(&self.next_user_id),
                    name: name.to_string(),
                    email: email.to_string(),
                };
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
                Ok(user)
            }
        }
    }

    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        Ok(self.users.contains_key(&user_id))
    }

    async fn insert_category(&self, name: &str) -> StorageResult<Category> {
        match self.category_names.entry(name.to_string()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(format!(
                "category '{name}' already exists"
            ))),
            Entry::Vacant(slot) => {
                let category = Category {
                    id: next_id(&self.next_category_id),
                    name: name.to_string(),
                };
                slot.insert(category.id);
                self.categories.insert(category.id, category.clone());
                Ok(category)
            }
        }
    }

    async fn category_exists(&self, category_id: i64) -> Result<bool> {
        Ok(self.categories.contains_key(&category_id))
    }

    async fn insert_event(&self, event: &Event) -> StorageResult<Event> {
        let stored = Event {
            id: next_id(&self.next_event_id),
            ..event.clone()
        };
        self.events.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        Ok(self.events.get(&event_id).map(|entry| entry.value().clone()))
    }

    async fn find_events(
        &self,
        filter: &FilterSpec,
        order: EventOrder,
        page: Option<PageRequest>,
    ) -> Result<Vec<Event>> {
        let criteria = filter.criteria();
        let mut matches: Vec<Event> = self
            .events
            .iter()
            .filter(|entry| criteria.iter().all(|c| c.matches(entry.value())))
            .map(|entry| entry.value().clone())
            .collect();

        match order {
            EventOrder::Id => matches.sort_by_key(|e| e.id),
            EventOrder::EventDate => matches.sort_by_key(|e| (e.event_date, e.id)),
        }

        Ok(match page {
            Some(page) => page.slice(matches),
            None => matches,
        })
    }

    async fn update_event(
        &self,
        event_id: i64,
        expected: EventState,
        changes: &EventChanges,
    ) -> StorageResult<Event> {
        // The shard lock is held from the state check to the write
        let mut entry = self
            .events
            .get_mut(&event_id)
            .ok_or_else(|| StorageError::NotFound(format!("event {event_id}")))?;

        if entry.state != expected {
            return Err(StorageError::Conflict(format!(
                "event {event_id} is {} but {expected} was expected",
                entry.state
            )));
        }

        changes.apply(entry.value_mut());
        Ok(entry.value().clone())
    }

    async fn insert_comment(
        &self,
        event_id: i64,
        author_id: i64,
        text: &str,
        created: NaiveDateTime,
    ) -> StorageResult<Comment> {
        let comment = Comment {
            id: next_id(&self.next_comment_id),
            event_id,
            author_id,
            text: text.to_string(),
            created,
        };
        self.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn list_comments(&self, event_id: i64) -> Result<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|entry| entry.event_id == event_id)
            .map(|entry| entry.value().clone())
            .collect();
        comments.sort_by_key(|c| c.id);
        Ok(comments)
    }
}

#[async_trait]
impl HitStorage for MemoryStorage {
    async fn insert_hit(&self, hit: &NewHit) -> Result<HitRecord> {
        let mut hits = self.hits.write().await;
        let record = HitRecord {
            id: hits.len() as i64 + 1,
            app: hit.app.clone(),
            uri: hit.uri.clone(),
            ip: hit.ip.clone(),
            timestamp: hit.timestamp,
        };
        hits.push(record.clone());
        Ok(record)
    }

    async fn hit_stats(&self, query: &StatsQuery) -> Result<Vec<StatEntry>> {
        let hits = self.hits.read().await;
        Ok(aggregate(hits.iter(), query))
    }
}
