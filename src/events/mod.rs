//! Event search, enrichment and moderation

pub mod engine;
pub mod filter;
pub mod page;
pub mod service;
pub mod state;

pub use engine::{EnrichedEvent, EventQueryEngine, EventSort, RequestInfo};
pub use filter::{Criterion, FilterSpec};
pub use page::{Page, PageRequest};
pub use service::{EventEdits, EventService, NewEvent, UpdateEventAdmin, UpdateEventUser};
pub use state::{AdminAction, InitiatorAction};
