use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{get_stats, record_hit, StatsState};
use crate::api::handlers::health_check;
use crate::stats::{HitRecorder, StatsAggregator};
use crate::storage::HitStorage;
use crate::time::TimestampFormat;

pub fn create_stats_router(hits: Arc<dyn HitStorage>, format: TimestampFormat) -> Router {
    let state = Arc::new(StatsState {
        recorder: HitRecorder::new(Arc::clone(&hits), format),
        aggregator: StatsAggregator::new(hits),
    });

    Router::new()
        .route("/health", get(health_check))
        .route("/hit", post(record_hit))
        .route("/stats", get(get_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
