use chrono::NaiveDateTime;

/// Comment left on an event, ordered by id within an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: i64,
    pub event_id: i64,
    pub author_id: i64,
    pub text: String,
    pub created: NaiveDateTime,
}
