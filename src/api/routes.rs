use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::admin::{admin_events, admin_update_event, create_category, create_user};
use super::handlers::{
    add_comment, create_event, health_check, initiator_event, initiator_events, public_event,
    public_events, update_initiator_event, AppState,
};

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/events", get(public_events))
        .route("/events/{event_id}", get(public_event));

    let private_routes = Router::new()
        .route(
            "/users/{user_id}/events",
            post(create_event).get(initiator_events),
        )
        .route(
            "/users/{user_id}/events/{event_id}",
            get(initiator_event).patch(update_initiator_event),
        )
        .route(
            "/users/{user_id}/events/{event_id}/comments",
            post(add_comment),
        );

    let admin_routes = Router::new()
        .route("/admin/events", get(admin_events))
        .route("/admin/events/{event_id}", patch(admin_update_event))
        .route("/admin/users", post(create_user))
        .route("/admin/categories", post(create_category));

    Router::new()
        .route("/health", get(health_check))
        .merge(public_routes)
        .merge(private_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
