use crate::events::{FilterSpec, PageRequest};
use crate::models::{Category, Comment, Event, EventChanges, EventState, User};
use crate::stats::{HitRecord, NewHit, StatEntry, StatsQuery};
use crate::storage::sql::{
    self, CommentRow, Dialect, EventRow, HitRow, HitStatRow, SqlPart, SqlValue,
};
use crate::storage::{EventOrder, EventStorage, HitStorage, StorageError, StorageResult};
use crate::time::to_unix;
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

fn build(parts: Vec<SqlPart>) -> QueryBuilder<'static, Sqlite> {
    let mut qb = QueryBuilder::new("");
    for part in parts {
        match part {
            SqlPart::Raw(sql) => {
                qb.push(sql);
            }
            SqlPart::Bind(SqlValue::Int(v)) => {
                qb.push_bind(v);
            }
            SqlPart::Bind(SqlValue::Float(v)) => {
                qb.push_bind(v);
            }
            SqlPart::Bind(SqlValue::Text(v)) => {
                qb.push_bind(v);
            }
            SqlPart::Bind(SqlValue::Bool(v)) => {
                qb.push_bind(v);
            }
        }
    }
    qb
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                annotation TEXT NOT NULL,
                description TEXT NOT NULL,
                category_id INTEGER NOT NULL,
                initiator_id INTEGER NOT NULL,
                event_date INTEGER NOT NULL,
                created_on INTEGER NOT NULL,
                published_on INTEGER,
                paid BOOLEAN NOT NULL,
                participant_limit INTEGER NOT NULL DEFAULT 0,
                confirmed_requests INTEGER NOT NULL DEFAULT 0,
                request_moderation BOOLEAN NOT NULL,
                state TEXT NOT NULL,
                lat REAL NOT NULL,
                lon REAL NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_initiator ON events(initiator_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_state_date ON events(state, event_date)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id INTEGER NOT NULL,
                author_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                created INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_event ON comments(event_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app TEXT NOT NULL,
                uri TEXT NOT NULL,
                ip TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_hits_timestamp ON hits(timestamp)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }
}

#[async_trait]
impl EventStorage for SqliteStorage {
    async fn insert_user(&self, name: &str, email: &str) -> StorageResult<User> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO users (name, email)
            VALUES (?, ?)
            ON CONFLICT(email) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match id {
            Some(id) => Ok(User {
                id,
                name: name.to_string(),
                email: email.to_string(),
            }),
            None => Err(StorageError::Conflict(format!(
                "email '{email}' is already registered"
            ))),
        }
    }

    async fn user_exists(&self, user_id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(found.is_some())
    }

    async fn insert_category(&self, name: &str) -> StorageResult<Category> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO categories (name)
            VALUES (?)
            ON CONFLICT(name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(name)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match id {
            Some(id) => Ok(Category {
                id,
                name: name.to_string(),
            }),
            None => Err(StorageError::Conflict(format!(
                "category '{name}' already exists"
            ))),
        }
    }

    async fn category_exists(&self, category_id: i64) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_optional(self.pool.as_ref())
            .await?;
        Ok(found.is_some())
    }

    async fn insert_event(&self, event: &Event) -> StorageResult<Event> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO events (
                title, annotation, description, category_id, initiator_id,
                event_date, created_on, published_on, paid, participant_limit,
                confirmed_requests, request_moderation, state, lat, lon
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&event.title)
        .bind(&event.annotation)
        .bind(&event.description)
        .bind(event.category_id)
        .bind(event.initiator_id)
        .bind(to_unix(event.event_date))
        .bind(to_unix(event.created_on))
        .bind(event.published_on.map(to_unix))
        .bind(event.paid)
        .bind(event.participant_limit)
        .bind(event.confirmed_requests)
        .bind(event.request_moderation)
        .bind(event.state.as_ref())
        .bind(event.location.lat)
        .bind(event.location.lon)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(Event {
            id,
            ..event.clone()
        })
    }

    async fn get_event(&self, event_id: i64) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {} FROM events WHERE id = ?",
            sql::EVENT_COLUMNS
        ))
        .bind(event_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Event::try_from).transpose()
    }

    async fn find_events(
        &self,
        filter: &FilterSpec,
        order: EventOrder,
        page: Option<PageRequest>,
    ) -> Result<Vec<Event>> {
        let select = sql::select_events(filter, order, page, Dialect::Sqlite);
        let mut qb = build(select.parts.clone());
        let rows = qb
            .build_query_as::<EventRow>()
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(select.finish(sql::events_from_rows(rows)?))
    }

    async fn update_event(
        &self,
        event_id: i64,
        expected: EventState,
        changes: &EventChanges,
    ) -> StorageResult<Event> {
        let mut qb = build(sql::update_event(event_id, expected, changes));
        let row = qb
            .build_query_as::<EventRow>()
            .fetch_optional(self.pool.as_ref())
            .await?;

        match row {
            Some(row) => Ok(Event::try_from(row)?),
            None => match self.get_event(event_id).await? {
                None => Err(StorageError::NotFound(format!("event {event_id}"))),
                Some(current) => Err(StorageError::Conflict(format!(
                    "event {event_id} is {} but {expected} was expected",
                    current.state
                ))),
            },
        }
    }

    async fn insert_comment(
        &self,
        event_id: i64,
        author_id: i64,
        text: &str,
        created: NaiveDateTime,
    ) -> StorageResult<Comment> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO comments (event_id, author_id, text, created)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(event_id)
        .bind(author_id)
        .bind(text)
        .bind(to_unix(created))
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(Comment {
            id,
            event_id,
            author_id,
            text: text.to_string(),
            created,
        })
    }

    async fn list_comments(&self, event_id: i64) -> Result<Vec<Comment>> {
        let rows = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {} FROM comments WHERE event_id = ? ORDER BY id ASC",
            sql::COMMENT_COLUMNS
        ))
        .bind(event_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(Comment::from).collect())
    }
}

#[async_trait]
impl HitStorage for SqliteStorage {
    async fn insert_hit(&self, hit: &NewHit) -> Result<HitRecord> {
        let row = sqlx::query_as::<_, HitRow>(&format!(
            "INSERT INTO hits (app, uri, ip, timestamp) VALUES (?, ?, ?, ?) RETURNING {}",
            sql::HIT_COLUMNS
        ))
        .bind(&hit.app)
        .bind(&hit.uri)
        .bind(&hit.ip)
        .bind(to_unix(hit.timestamp))
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }

    async fn hit_stats(&self, query: &StatsQuery) -> Result<Vec<StatEntry>> {
        let mut qb = build(sql::select_hit_stats(query));
        let rows = qb
            .build_query_as::<HitStatRow>()
            .fetch_all(self.pool.as_ref())
            .await?;
        Ok(rows.into_iter().map(StatEntry::from).collect())
    }
}
