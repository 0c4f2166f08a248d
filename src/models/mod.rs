pub mod comment;
pub mod event;
pub mod user;

pub use comment::Comment;
pub use event::{event_uri, Event, EventChanges, EventState, Location};
pub use user::{Category, User};
