//! SQL shared by the SQLite and PostgreSQL backends
//!
//! Filters are rendered into a backend-neutral list of [`SqlPart`]s. Each
//! backend replays the list into its own `QueryBuilder`, which takes care of
//! placeholder syntax.

use anyhow::{anyhow, Result};
use sqlx::FromRow;
use std::str::FromStr;

use crate::events::{Criterion, FilterSpec, PageRequest};
use crate::models::{Comment, Event, EventChanges, EventState, Location};
use crate::stats::{HitRecord, StatEntry, StatsQuery};
use crate::storage::EventOrder;
use crate::time::{from_unix, to_unix};

pub const EVENT_COLUMNS: &str = "id, title, annotation, description, category_id, initiator_id, \
     event_date, created_on, published_on, paid, participant_limit, confirmed_requests, \
     request_moderation, state, lat, lon";

pub const COMMENT_COLUMNS: &str = "id, event_id, author_id, text, created";

pub const HIT_COLUMNS: &str = "id, app, uri, ip, timestamp";

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlPart {
    Raw(&'static str),
    Bind(SqlValue),
}

fn push_in_list<T>(
    parts: &mut Vec<SqlPart>,
    column: &'static str,
    values: impl ExactSizeIterator<Item = T>,
    bind: impl Fn(T) -> SqlValue,
) {
    if values.len() == 0 {
        parts.push(SqlPart::Raw("1 = 0"));
        return;
    }
    parts.push(SqlPart::Raw(column));
    parts.push(SqlPart::Raw(" IN ("));
    for (i, value) in values.enumerate() {
        if i > 0 {
            parts.push(SqlPart::Raw(", "));
        }
        parts.push(SqlPart::Bind(bind(value)));
    }
    parts.push(SqlPart::Raw(")"));
}

/// Escape `LIKE` metacharacters; pairs with `ESCAPE '\'`
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_criterion(parts: &mut Vec<SqlPart>, criterion: &Criterion<'_>) {
    match criterion {
        Criterion::Initiators(ids) => {
            push_in_list(parts, "initiator_id", ids.iter(), |id| SqlValue::Int(*id))
        }
        Criterion::States(states) => push_in_list(parts, "state", states.iter(), |state| {
            SqlValue::Text(state.as_ref().to_string())
        }),
        Criterion::Categories(ids) => {
            push_in_list(parts, "category_id", ids.iter(), |id| SqlValue::Int(*id))
        }
        Criterion::EventDate(range) => {
            parts.push(SqlPart::Raw("event_date BETWEEN "));
            parts.push(SqlPart::Bind(SqlValue::Int(to_unix(range.start()))));
            parts.push(SqlPart::Raw(" AND "));
            parts.push(SqlPart::Bind(SqlValue::Int(to_unix(range.end()))));
        }
        Criterion::Text(needle) => {
            let pattern = like_pattern(needle);
            parts.push(SqlPart::Raw("(LOWER(annotation) LIKE "));
            parts.push(SqlPart::Bind(SqlValue::Text(pattern.clone())));
            parts.push(SqlPart::Raw(" ESCAPE '\\' OR LOWER(description) LIKE "));
            parts.push(SqlPart::Bind(SqlValue::Text(pattern)));
            parts.push(SqlPart::Raw(" ESCAPE '\\')"));
        }
        Criterion::Paid(paid) => {
            parts.push(SqlPart::Raw("paid = "));
            parts.push(SqlPart::Bind(SqlValue::Bool(*paid)));
        }
        Criterion::Available => parts.push(SqlPart::Raw(
            "(participant_limit = 0 OR confirmed_requests < participant_limit)",
        )),
    }
}

/// SQL flavour an event listing is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `LOWER` folds ASCII letters only
    Sqlite,
    Postgres,
}

impl Dialect {
    fn folds_unicode(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

/// `WHERE` clause for `filter`; empty when the filter is unconstrained.
///
/// Text criteria are left out when the dialect cannot fold their case.
pub fn where_clause(filter: &FilterSpec, dialect: Dialect) -> Vec<SqlPart> {
    let mut parts = Vec::new();
    let criteria = filter.criteria();
    let rendered = criteria
        .iter()
        .filter(|c| dialect.folds_unicode() || !matches!(c, Criterion::Text(_)));
    for (i, criterion) in rendered.enumerate() {
        parts.push(SqlPart::Raw(if i == 0 { " WHERE " } else { " AND " }));
        push_criterion(&mut parts, criterion);
    }
    parts
}

/// An event listing: the query to run plus whatever is finished in Rust
#[derive(Debug, Clone, PartialEq)]
pub struct EventSelect {
    pub parts: Vec<SqlPart>,
    /// Lowercased needle matched on the fetched rows
    deferred_text: Option<String>,
    /// Page cut after the deferred match
    deferred_page: Option<PageRequest>,
}

impl EventSelect {
    /// Apply the deferred text match and page to rows already in order
    pub fn finish(&self, events: Vec<Event>) -> Vec<Event> {
        let Some(needle) = &self.deferred_text else {
            return events;
        };
        let text = Criterion::Text(needle.clone());
        let matched: Vec<Event> = events.into_iter().filter(|e| text.matches(e)).collect();
        match self.deferred_page {
            Some(page) => page.slice(matched),
            None => matched,
        }
    }
}

/// Full `SELECT` for an event listing
pub fn select_events(
    filter: &FilterSpec,
    order: EventOrder,
    page: Option<PageRequest>,
    dialect: Dialect,
) -> EventSelect {
    let deferred_text = if dialect.folds_unicode() {
        None
    } else {
        filter.text.as_ref().map(|text| text.to_lowercase())
    };

    let mut parts = vec![
        SqlPart::Raw("SELECT "),
        SqlPart::Raw(EVENT_COLUMNS),
        SqlPart::Raw(" FROM events"),
    ];
    parts.extend(where_clause(filter, dialect));
    parts.push(SqlPart::Raw(match order {
        EventOrder::Id => " ORDER BY id ASC",
        EventOrder::EventDate => " ORDER BY event_date ASC, id ASC",
    }));

    if deferred_text.is_some() {
        return EventSelect {
            parts,
            deferred_text,
            deferred_page: page,
        };
    }
    if let Some(page) = page {
        parts.push(SqlPart::Raw(" LIMIT "));
        parts.push(SqlPart::Bind(SqlValue::Int(page.size())));
        parts.push(SqlPart::Raw(" OFFSET "));
        parts.push(SqlPart::Bind(SqlValue::Int(page.offset())));
    }
    EventSelect {
        parts,
        deferred_text: None,
        deferred_page: None,
    }
}

/// Grouped counts for a stats query. Ties fall back to first-seen order.
pub fn select_hit_stats(query: &StatsQuery) -> Vec<SqlPart> {
    let mut parts = vec![SqlPart::Raw(if query.unique {
        "SELECT app, uri, COUNT(DISTINCT ip) AS hit_count FROM hits WHERE timestamp BETWEEN "
    } else {
        "SELECT app, uri, COUNT(*) AS hit_count FROM hits WHERE timestamp BETWEEN "
    })];
    parts.push(SqlPart::Bind(SqlValue::Int(to_unix(query.range.start()))));
    parts.push(SqlPart::Raw(" AND "));
    parts.push(SqlPart::Bind(SqlValue::Int(to_unix(query.range.end()))));
    if let Some(uris) = &query.uris {
        parts.push(SqlPart::Raw(" AND "));
        push_in_list(&mut parts, "uri", uris.iter(), |uri| {
            SqlValue::Text(uri.clone())
        });
    }
    parts.push(SqlPart::Raw(
        " GROUP BY app, uri ORDER BY hit_count DESC, MIN(id) ASC",
    ));
    parts
}

/// Compare-and-swap update guarded by the stored state.
///
/// `state` is always assigned so the `SET` list is never empty. Yields the
/// updated row, or no row when the id is unknown or the state moved.
pub fn update_event(event_id: i64, expected: EventState, changes: &EventChanges) -> Vec<SqlPart> {
    let mut parts = vec![SqlPart::Raw("UPDATE events SET state = ")];
    parts.push(SqlPart::Bind(SqlValue::Text(
        changes.state.unwrap_or(expected).as_ref().to_string(),
    )));

    let mut set = |column: &'static str, value: SqlValue| {
        parts.push(SqlPart::Raw(column));
        parts.push(SqlPart::Bind(value));
    };
    if let Some(title) = &changes.title {
        set(", title = ", SqlValue::Text(title.clone()));
    }
    if let Some(annotation) = &changes.annotation {
        set(", annotation = ", SqlValue::Text(annotation.clone()));
    }
    if let Some(description) = &changes.description {
        set(", description = ", SqlValue::Text(description.clone()));
    }
    if let Some(category_id) = changes.category_id {
        set(", category_id = ", SqlValue::Int(category_id));
    }
    if let Some(event_date) = changes.event_date {
        set(", event_date = ", SqlValue::Int(to_unix(event_date)));
    }
    if let Some(location) = changes.location {
        set(", lat = ", SqlValue::Float(location.lat));
        set(", lon = ", SqlValue::Float(location.lon));
    }
    if let Some(paid) = changes.paid {
        set(", paid = ", SqlValue::Bool(paid));
    }
    if let Some(limit) = changes.participant_limit {
        set(", participant_limit = ", SqlValue::Int(limit));
    }
    if let Some(moderation) = changes.request_moderation {
        set(", request_moderation = ", SqlValue::Bool(moderation));
    }
    if let Some(published_on) = changes.published_on {
        set(", published_on = ", SqlValue::Int(to_unix(published_on)));
    }

    parts.push(SqlPart::Raw(" WHERE id = "));
    parts.push(SqlPart::Bind(SqlValue::Int(event_id)));
    parts.push(SqlPart::Raw(" AND state = "));
    parts.push(SqlPart::Bind(SqlValue::Text(expected.as_ref().to_string())));
    parts.push(SqlPart::Raw(" RETURNING "));
    parts.push(SqlPart::Raw(EVENT_COLUMNS));
    parts
}

#[derive(Debug, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub title: String,
    pub annotation: String,
    pub description: String,
    pub category_id: i64,
    pub initiator_id: i64,
    pub event_date: i64,
    pub created_on: i64,
    pub published_on: Option<i64>,
    pub paid: bool,
    pub participant_limit: i64,
    pub confirmed_requests: i64,
    pub request_moderation: bool,
    pub state: String,
    pub lat: f64,
    pub lon: f64,
}

impl TryFrom<EventRow> for Event {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self> {
        let state = EventState::from_str(&row.state)
            .map_err(|_| anyhow!("event {} has unknown state '{}'", row.id, row.state))?;

        Ok(Event {
            id: row.id,
            title: row.title,
            annotation: row.annotation,
            description: row.description,
            category_id: row.category_id,
            initiator_id: row.initiator_id,
            event_date: from_unix(row.event_date),
            created_on: from_unix(row.created_on),
            published_on: row.published_on.map(from_unix),
            paid: row.paid,
            participant_limit: row.participant_limit,
            confirmed_requests: row.confirmed_requests,
            request_moderation: row.request_moderation,
            state,
            location: Location {
                lat: row.lat,
                lon: row.lon,
            },
        })
    }
}

pub fn events_from_rows(rows: Vec<EventRow>) -> Result<Vec<Event>> {
    rows.into_iter().map(Event::try_from).collect()
}

#[derive(Debug, FromRow)]
pub struct CommentRow {
    pub id: i64,
    pub event_id: i64,
    pub author_id: i64,
    pub text: String,
    pub created: i64,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            event_id: row.event_id,
            author_id: row.author_id,
            text: row.text,
            created: from_unix(row.created),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct HitRow {
    pub id: i64,
    pub app: String,
    pub uri: String,
    pub ip: String,
    pub timestamp: i64,
}

impl From<HitRow> for HitRecord {
    fn from(row: HitRow) -> Self {
        HitRecord {
            id: row.id,
            app: row.app,
            uri: row.uri,
            ip: row.ip,
            timestamp: from_unix(row.timestamp),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct HitStatRow {
    pub app: String,
    pub uri: String,
    pub hit_count: i64,
}

impl From<HitStatRow> for StatEntry {
    fn from(row: HitStatRow) -> Self {
        StatEntry {
            app: row.app,
            uri: row.uri,
            hits: row.hit_count.max(0) as u64,
        }
    }
}
