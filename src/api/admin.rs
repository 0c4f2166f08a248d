//! Moderator endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::dto::EventDto;
use super::handlers::{event_range, page_request, AppState};
use super::params::QueryParams;
use crate::error::ServiceResult;
use crate::events::{FilterSpec, Page, UpdateEventAdmin};
use crate::models::user::{NewCategoryRequest, NewUserRequest};
use crate::models::{Category, EventState, User};

/// Search over every event regardless of state
pub async fn admin_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> ServiceResult<Json<Page<EventDto>>> {
    let params = QueryParams::new(query);

    let mut filter = FilterSpec::new();
    if let Some(users) = params.parsed_list::<i64>("users")? {
        filter = filter.with_actors(users);
    }
    if let Some(states) = params.parsed_list::<EventState>("states")? {
        filter = filter.with_states(states);
    }
    if let Some(categories) = params.parsed_list::<i64>("categories")? {
        filter = filter.with_categories(categories);
    }
    if let Some(range) = event_range(&params, &state.format)? {
        filter = filter.with_range(range);
    }

    let page = page_request(&params)?;
    let result = state.engine.admin_search(&filter, page).await?;
    Ok(Json(EventDto::page(result, &state.format)))
}

pub async fn admin_update_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
    Json(payload): Json<UpdateEventAdmin>,
) -> ServiceResult<Json<EventDto>> {
    let event = state.service.admin_update(event_id, payload).await?;
    let enriched = state.engine.enrich_one(event).await?;
    Ok(Json(EventDto::new(enriched, &state.format)))
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewUserRequest>,
) -> ServiceResult<(StatusCode, Json<User>)> {
    let user = state
        .service
        .create_user(&payload.name, &payload.email)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewCategoryRequest>,
) -> ServiceResult<(StatusCode, Json<Category>)> {
    let category = state.service.create_category(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(category)))
}
