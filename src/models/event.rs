use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Moderation state of an event
///
/// Events start `PENDING`; only moderation moves them to `PUBLISHED` or
/// `CANCELED`. See `events::state` for the transition tables.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum EventState {
    Pending,
    Published,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// Stored event. Related entities are referenced by id only.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub annotation: String,
    pub description: String,
    pub category_id: i64,
    pub initiator_id: i64,
    pub event_date: NaiveDateTime,
    pub created_on: NaiveDateTime,
    pub published_on: Option<NaiveDateTime>,
    pub paid: bool,
    pub participant_limit: i64,
    pub confirmed_requests: i64,
    pub request_moderation: bool,
    pub state: EventState,
    pub location: Location,
}

impl Event {
    /// An event is available when it has no participant limit or the
    /// limit has not been reached yet.
    pub fn is_available(&self) -> bool {
        self.participant_limit == 0 || self.confirmed_requests < self.participant_limit
    }

    pub fn uri(&self) -> String {
        event_uri(self.id)
    }
}

/// Public path of a single event; hits for an event are recorded under it
pub fn event_uri(event_id: i64) -> String {
    format!("/events/{event_id}")
}

/// Partial update applied to a stored event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventChanges {
    pub title: Option<String>,
    pub annotation: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub event_date: Option<NaiveDateTime>,
    pub location: Option<Location>,
    pub paid: Option<bool>,
    pub participant_limit: Option<i64>,
    pub request_moderation: Option<bool>,
    pub state: Option<EventState>,
    pub published_on: Option<NaiveDateTime>,
}

impl EventChanges {
    pub fn apply(&self, event: &mut Event) {
        if let Some(title) = &self.title {
            event.title = title.clone();
        }
        if let Some(annotation) = &self.annotation {
            event.annotation = annotation.clone();
        }
        if let Some(description) = &self.description {
            event.description = description.clone();
        }
        if let Some(category_id) = self.category_id {
            event.category_id = category_id;
        }
        if let Some(event_date) = self.event_date {
            event.event_date = event_date;
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(paid) = self.paid {
            event.paid = paid;
        }
        if let Some(limit) = self.participant_limit {
            event.participant_limit = limit;
        }
        if let Some(moderation) = self.request_moderation {
            event.request_moderation = moderation;
        }
        if let Some(state) = self.state {
            event.state = state;
        }
        if let Some(published_on) = self.published_on {
            event.published_on = Some(published_on);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::event;
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_unlimited_event_is_always_available() {
        let mut e = event(1);
        e.participant_limit = 0;
        for confirmed in [0, 1, 500] {
            e.confirmed_requests = confirmed;
            assert!(e.is_available());
        }
    }

    #[test]
    fn test_limited_event_availability() {
        let mut e = event(1);
        e.participant_limit = 2;
        e.confirmed_requests = 1;
        assert!(e.is_available());
        e.confirmed_requests = 2;
        assert!(!e.is_available());
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(EventState::from_str("PUBLISHED").unwrap(), EventState::Published);
        assert_eq!(EventState::from_str("pending").unwrap(), EventState::Pending);
        assert!(EventState::from_str("REJECTED").is_err());
        assert_eq!(EventState::Canceled.as_ref(), "CANCELED");
    }

    #[test]
    fn test_changes_apply_only_present_fields() {
        let mut e = event(3);
        let changes = EventChanges {
            title: Some("Renamed".to_string()),
            paid: Some(true),
            ..Default::default()
        };
        changes.apply(&mut e);
        assert_eq!(e.title, "Renamed");
        assert!(e.paid);
        assert_eq!(e.annotation, "Annotation for event 3");
        assert_eq!(e.state, EventState::Pending);
    }

    #[test]
    fn test_event_uri() {
        assert_eq!(event(42).uri(), "/events/42");
    }
}
