//! Event search criteria
//!
//! A [`FilterSpec`] holds optional, orthogonal constraints. It expands into a
//! list of [`Criterion`] values, one per present field, and a match is the
//! conjunction of that list. Storage backends fold the same list: the
//! in-memory store calls [`Criterion::matches`], the SQL stores render each
//! criterion to a `WHERE` fragment.

use std::collections::BTreeSet;

use crate::models::{Event, EventState};
use crate::time::TimeRange;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub actor_ids: Option<BTreeSet<i64>>,
    pub states: Option<BTreeSet<EventState>>,
    pub category_ids: Option<BTreeSet<i64>>,
    pub range: Option<TimeRange>,
    pub text: Option<String>,
    pub paid: Option<bool>,
    pub only_available: Option<bool>,
}

/// One present constraint of a [`FilterSpec`]
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion<'a> {
    Initiators(&'a BTreeSet<i64>),
    States(&'a BTreeSet<EventState>),
    Categories(&'a BTreeSet<i64>),
    EventDate(&'a TimeRange),
    /// Lowercased needle matched against annotation or description
    Text(String),
    Paid(bool),
    Available,
}

impl Criterion<'_> {
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Criterion::Initiators(ids) => ids.contains(&event.initiator_id),
            Criterion::States(states) => states.contains(&event.state),
            Criterion::Categories(ids) => ids.contains(&event.category_id),
            Criterion::EventDate(range) => range.contains(event.event_date),
            Criterion::Text(needle) => {
                event.annotation.to_lowercase().contains(needle.as_str())
                    || event.description.to_lowercase().contains(needle.as_str())
            }
            Criterion::Paid(paid) => event.paid == *paid,
            Criterion::Available => event.is_available(),
        }
    }
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actors(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.actor_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_states(mut self, states: impl IntoIterator<Item = EventState>) -> Self {
        self.states = Some(states.into_iter().collect());
        self
    }

    pub fn with_categories(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.category_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_paid(mut self, paid: bool) -> Self {
        self.paid = Some(paid);
        self
    }

    pub fn with_only_available(mut self, only_available: bool) -> Self {
        self.only_available = Some(only_available);
        self
    }

    /// Expand into the list of present constraints.
    ///
    /// `only_available = Some(false)` places no constraint.
    pub fn criteria(&self) -> Vec<Criterion<'_>> {
        let mut criteria = Vec::new();

        if let Some(ids) = &self.actor_ids {
            criteria.push(Criterion::Initiators(ids));
        }
        if let Some(states) = &self.states {
            criteria.push(Criterion::States(states));
        }
        if let Some(ids) = &self.category_ids {
            criteria.push(Criterion::Categories(ids));
        }
        if let Some(range) = &self.range {
            criteria.push(Criterion::EventDate(range));
        }
        if let Some(text) = &self.text {
            criteria.push(Criterion::Text(text.to_lowercase()));
        }
        if let Some(paid) = self.paid {
            criteria.push(Criterion::Paid(paid));
        }
        if self.only_available == Some(true) {
            criteria.push(Criterion::Available);
        }

        criteria
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.criteria().iter().all(|c| c.matches(event))
    }

    pub fn is_unconstrained(&self) -> bool {
        self.criteria().is_empty()
    }
}
