//! Moderation state transitions
//!
//! Admin: `PENDING -> PUBLISHED | CANCELED`; finalized events reject any action.
//! Initiator: `PENDING -> PENDING | CANCELED`; anything else is rejected.
//! The stored transition is a compare-and-swap on the state read here.

use serde::Deserialize;
use strum::{Display, EnumString};

use crate::error::{ServiceError, ServiceResult};
use crate::models::EventState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AdminAction {
    PublishEvent,
    RejectEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum InitiatorAction {
    SendToReview,
    CancelReview,
}

impl EventState {
    pub fn after_admin(self, action: AdminAction) -> ServiceResult<EventState> {
        match (self, action) {
            (EventState::Pending, AdminAction::PublishEvent) => Ok(EventState::Published),
            (EventState::Pending, AdminAction::RejectEvent) => Ok(EventState::Canceled),
            (state, action) => Err(ServiceError::Conflict(format!(
                "event is already {state}, cannot {action}"
            ))),
        }
    }

    /// State after an initiator edit. `None` is a plain edit, which keeps the
    /// event pending.
    pub fn after_initiator(self, action: Option<InitiatorAction>) -> ServiceResult<EventState> {
        match (self, action) {
            (EventState::Pending, None | Some(InitiatorAction::SendToReview)) => {
                Ok(EventState::Pending)
            }
            (EventState::Pending, Some(InitiatorAction::CancelReview)) => Ok(EventState::Canceled),
            (state, _) => Err(ServiceError::Conflict(format!(
                "event is {state} and can no longer be changed by its initiator"
            ))),
        }
    }
}
