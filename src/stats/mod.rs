//! Hit statistics
//!
//! Every public event access is appended to an immutable hit log. The log is
//! aggregated on demand into per-`(app, uri)` counts, either raw or by
//! distinct client address.

pub mod aggregator;
pub mod client;
pub mod ip_extractor;
pub mod models;
pub mod recorder;

pub use aggregator::{aggregate, StatsAggregator};
pub use client::{HttpStatsClient, LocalStatsClient, StatsClient};
pub use ip_extractor::extract_client_ip;
pub use models::{HitPayload, HitRecord, NewHit, StatEntry, StatsQuery};
pub use recorder::HitRecorder;
