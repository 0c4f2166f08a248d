//! Event writes: registration, creation, moderation and comments
//!
//! Every state change is a compare-and-swap on the state the decision was
//! based on, so two moderators racing on the same event cannot both win.

use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};
use crate::events::state::{AdminAction, InitiatorAction};
use crate::models::{Category, Comment, Event, EventChanges, EventState, Location, User};
use crate::storage::EventStorage;
use crate::time::{self, TimestampFormat};

fn default_request_moderation() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    pub annotation: String,
    pub description: String,
    pub category: i64,
    pub event_date: String,
    pub location: Location,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub participant_limit: i64,
    #[serde(default = "default_request_moderation")]
    pub request_moderation: bool,
}

/// Field edits shared by the admin and initiator update requests
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEdits {
    pub title: Option<String>,
    pub annotation: Option<String>,
    pub description: Option<String>,
    pub category: Option<i64>,
    pub event_date: Option<String>,
    pub location: Option<Location>,
    pub paid: Option<bool>,
    pub participant_limit: Option<i64>,
    pub request_moderation: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventAdmin {
    #[serde(flatten)]
    pub edits: EventEdits,
    pub state_action: Option<AdminAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventUser {
    #[serde(flatten)]
    pub edits: EventEdits,
    pub state_action: Option<InitiatorAction>,
}

fn require_text(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{field} must not be blank")));
    }
    Ok(())
}

fn require_limit(limit: i64) -> ServiceResult<()> {
    if limit < 0 {
        return Err(ServiceError::Validation(format!(
            "participant limit must not be negative, got {limit}"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct EventService {
    events: Arc<dyn EventStorage>,
    format: TimestampFormat,
}

impl EventService {
    pub fn new(events: Arc<dyn EventStorage>, format: TimestampFormat) -> Self {
        Self { events, format }
    }

    pub async fn create_user(&self, name: &str, email: &str) -> ServiceResult<User> {
        require_text("name", name)?;
        require_text("email", email)?;
        if !email.contains('@') {
            return Err(ServiceError::Validation(format!(
                "'{email}' is not an email address"
            )));
        }

        let user = self.events.insert_user(name.trim(), email.trim()).await?;
        info!(user_id = user.id, "Registered user");
        Ok(user)
    }

    pub async fn create_category(&self, name: &str) -> ServiceResult<Category> {
        require_text("name", name)?;
        let category = self.events.insert_category(name.trim()).await?;
        info!(category_id = category.id, name = %category.name, "Created category");
        Ok(category)
    }

    async fn require_user(&self, user_id: i64) -> ServiceResult<()> {
        if !self.events.user_exists(user_id).await? {
            return Err(ServiceError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    async fn require_category(&self, category_id: i64) -> ServiceResult<()> {
        if !self.events.category_exists(category_id).await? {
            return Err(ServiceError::NotFound(format!("category {category_id}")));
        }
        Ok(())
    }

    async fn load(&self, event_id: i64) -> ServiceResult<Event> {
        self.events
            .get_event(event_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))
    }

    /// Event dates are wire strings and must not lie in the past
    fn parse_event_date(&self, value: &str) -> ServiceResult<chrono::NaiveDateTime> {
        let date = self.format.parse(value)?;
        if date < time::now() {
            return Err(ServiceError::Validation(format!(
                "event date {value} is in the past"
            )));
        }
        Ok(date)
    }

    async fn changes_from(&self, edits: &EventEdits) -> ServiceResult<EventChanges> {
        if let Some(title) = &edits.title {
            require_text("title", title)?;
        }
        if let Some(annotation) = &edits.annotation {
            require_text("annotation", annotation)?;
        }
        if let Some(description) = &edits.description {
            require_text("description", description)?;
        }
        if let Some(limit) = edits.participant_limit {
            require_limit(limit)?;
        }
        if let Some(category_id) = edits.category {
            self.require_category(category_id).await?;
        }
        let event_date = edits
            .event_date
            .as_deref()
            .map(|value| self.parse_event_date(value))
            .transpose()?;

        Ok(EventChanges {
            title: edits.title.clone(),
            annotation: edits.annotation.clone(),
            description: edits.description.clone(),
            category_id: edits.category,
            event_date,
            location: edits.location,
            paid: edits.paid,
            participant_limit: edits.participant_limit,
            request_moderation: edits.request_moderation,
            state: None,
            published_on: None,
        })
    }

    pub async fn create_event(&self, initiator_id: i64, new: NewEvent) -> ServiceResult<Event> {
        require_text("title", &new.title)?;
        require_text("annotation", &new.annotation)?;
        require_text("description", &new.description)?;
        require_limit(new.participant_limit)?;
        let event_date = self.parse_event_date(&new.event_date)?;

        self.require_user(initiator_id).await?;
        self.require_category(new.category).await?;

        let event = Event {
            id: 0,
            title: new.title,
            annotation: new.annotation,
            description: new.description,
            category_id: new.category,
            initiator_id,
            event_date,
            created_on: time::now(),
            published_on: None,
            paid: new.paid,
            participant_limit: new.participant_limit,
            confirmed_requests: 0,
            request_moderation: new.request_moderation,
            state: EventState::Pending,
            location: new.location,
        };

        let stored = self.events.insert_event(&event).await?;
        info!(event_id = stored.id, initiator_id, "Created event");
        Ok(stored)
    }

    /// Moderator edit with an optional publish or reject decision
    pub async fn admin_update(
        &self,
        event_id: i64,
        request: UpdateEventAdmin,
    ) -> ServiceResult<Event> {
        let current = self.load(event_id).await?;
        let mut changes = self.changes_from(&request.edits).await?;

        if let Some(action) = request.state_action {
            let next = current.state.after_admin(action)?;
            if next == EventState::Published {
                changes.published_on = Some(time::now());
            }
            changes.state = Some(next);
        }

        let updated = self
            .events
            .update_event(event_id, current.state, &changes)
            .await?;
        info!(
            event_id,
            from = %current.state,
            to = %updated.state,
            "Admin updated event"
        );
        Ok(updated)
    }

    /// Initiator edit; only the owner may edit, and only while the event is pending
    pub async fn initiator_update(
        &self,
        user_id: i64,
        event_id: i64,
        request: UpdateEventUser,
    ) -> ServiceResult<Event> {
        self.require_user(user_id).await?;
        let current = self.load(event_id).await?;
        if current.initiator_id != user_id {
            return Err(ServiceError::Conflict(format!(
                "user {user_id} is not the initiator of event {event_id}"
            )));
        }

        let next = current.state.after_initiator(request.state_action)?;
        let mut changes = self.changes_from(&request.edits).await?;
        changes.state = Some(next);

        let updated = self
            .events
            .update_event(event_id, current.state, &changes)
            .await?;
        info!(event_id, user_id, state = %updated.state, "Initiator updated event");
        Ok(updated)
    }

    pub async fn add_comment(
        &self,
        user_id: i64,
        event_id: i64,
        text: &str,
    ) -> ServiceResult<Comment> {
        require_text("text", text)?;
        self.require_user(user_id).await?;
        self.load(event_id).await?;

        let comment = self
            .events
            .insert_comment(event_id, user_id, text.trim(), time::now())
            .await?;
        info!(comment_id = comment.id, event_id, user_id, "Added comment");
        Ok(comment)
    }

    pub fn format(&self) -> &TimestampFormat {
        &self.format
    }
}
