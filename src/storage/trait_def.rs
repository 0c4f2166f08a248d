use crate::events::{FilterSpec, PageRequest};
use crate::models::{Category, Comment, Event, EventChanges, EventState, User};
use crate::stats::{HitRecord, NewHit, StatEntry, StatsQuery};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Row order for event listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrder {
    /// Insertion order
    Id,
    /// Event date ascending, id as tiebreak
    EventDate,
}

#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Register a user; the email must be unique
    async fn insert_user(&self, name: &str, email: &str) -> StorageResult<User>;

    async fn user_exists(&self, user_id: i64) -> Result<bool>;

    /// Register a category; the name must be unique
    async fn insert_category(&self, name: &str) -> StorageResult<Category>;

    async fn category_exists(&self, category_id: i64) -> Result<bool>;

    /// Persist a new event. The id on `event` is ignored and a fresh one assigned.
    async fn insert_event(&self, event: &Event) -> StorageResult<Event>;

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>>;

    /// Events matching every present criterion of `filter`, in `order`.
    /// Without a page request all matches are returned.
    async fn find_events(
        &self,
        filter: &FilterSpec,
        order: EventOrder,
        page: Option<PageRequest>,
    ) -> Result<Vec<Event>>;

    /// Apply `changes` only if the stored state still equals `expected`.
    ///
    /// Fails with `NotFound` for an unknown event and `Conflict` when the
    /// state moved underneath the caller.
    async fn update_event(
        &self,
        event_id: i64,
        expected: EventState,
        changes: &EventChanges,
    ) -> StorageResult<Event>;

    async fn insert_comment(
        &self,
        event_id: i64,
        author_id: i64,
        text: &str,
        created: NaiveDateTime,
    ) -> StorageResult<Comment>;

    /// Comments for an event in creation order
    async fn list_comments(&self, event_id: i64) -> Result<Vec<Comment>>;
}

/// Append-only hit log
#[async_trait]
pub trait HitStorage: Send + Sync {
    async fn insert_hit(&self, hit: &NewHit) -> Result<HitRecord>;

    /// Group matching hits by `(app, uri)`, ordered by count descending
    async fn hit_stats(&self, query: &StatsQuery) -> Result<Vec<StatEntry>>;
}
