//! Response bodies. Timestamps are rendered with the configured format.

use serde::Serialize;

use crate::events::{EnrichedEvent, Page};
use crate::models::{Comment, EventState, Location};
use crate::time::TimestampFormat;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDto {
    pub id: i64,
    pub event_id: i64,
    pub author_id: i64,
    pub text: String,
    pub created: String,
}

impl CommentDto {
    pub fn new(comment: &Comment, format: &TimestampFormat) -> Self {
        Self {
            id: comment.id,
            event_id: comment.event_id,
            author_id: comment.author_id,
            text: comment.text.clone(),
            created: format.format(comment.created),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    pub id: i64,
    pub title: String,
    pub annotation: String,
    pub description: String,
    pub category: i64,
    pub initiator: i64,
    pub event_date: String,
    pub created_on: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_on: Option<String>,
    pub paid: bool,
    pub participant_limit: i64,
    pub confirmed_requests: i64,
    pub request_moderation: bool,
    pub state: EventState,
    pub location: Location,
    pub views: u64,
    pub comments: Vec<CommentDto>,
}

impl EventDto {
    pub fn new(enriched: EnrichedEvent, format: &TimestampFormat) -> Self {
        let EnrichedEvent {
            event,
            views,
            comments,
        } = enriched;

        Self {
            id: event.id,
            title: event.title,
            annotation: event.annotation,
            description: event.description,
            category: event.category_id,
            initiator: event.initiator_id,
            event_date: format.format(event.event_date),
            created_on: format.format(event.created_on),
            published_on: event.published_on.map(|t| format.format(t)),
            paid: event.paid,
            participant_limit: event.participant_limit,
            confirmed_requests: event.confirmed_requests,
            request_moderation: event.request_moderation,
            state: event.state,
            location: event.location,
            views,
            comments: comments
                .iter()
                .map(|c| CommentDto::new(c, format))
                .collect(),
        }
    }

    pub fn page(page: Page<EnrichedEvent>, format: &TimestampFormat) -> Page<EventDto> {
        page.map(|enriched| EventDto::new(enriched, format))
    }
}
