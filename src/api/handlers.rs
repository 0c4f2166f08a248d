use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode, Uri},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use super::dto::{CommentDto, EventDto};
use super::params::QueryParams;
use crate::config::ClientIpConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::events::{
    EventQueryEngine, EventService, EventSort, FilterSpec, NewEvent, Page, PageRequest,
    RequestInfo, UpdateEventUser,
};
use crate::stats::extract_client_ip;
use crate::time::{TimeRange, TimestampFormat};

pub const DEFAULT_PAGE_SIZE: i64 = 10;

pub struct AppState {
    pub engine: EventQueryEngine,
    pub service: EventService,
    pub format: TimestampFormat,
    pub client_ip: ClientIpConfig,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Deserialize)]
pub struct NewCommentRequest {
    pub text: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

/// `from` / `size` pagination with the service defaults
pub(crate) fn page_request(params: &QueryParams) -> ServiceResult<PageRequest> {
    PageRequest::from_offset(
        params.parsed_or("from", 0)?,
        params.parsed_or("size", DEFAULT_PAGE_SIZE)?,
    )
}

/// `rangeStart` / `rangeEnd`; either bound may be omitted
pub(crate) fn event_range(
    params: &QueryParams,
    format: &TimestampFormat,
) -> ServiceResult<Option<TimeRange>> {
    let start = params
        .one("rangeStart")
        .map(|value| format.parse(value))
        .transpose()?;
    let end = params
        .one("rangeEnd")
        .map(|value| format.parse(value))
        .transpose()?;
    TimeRange::from_bounds(start, end)
}

fn request_info(
    uri: &Uri,
    headers: &HeaderMap,
    addr: SocketAddr,
    config: &ClientIpConfig,
) -> RequestInfo {
    RequestInfo {
        uri: uri.path().to_string(),
        ip: extract_client_ip(headers, addr.ip(), config).to_string(),
    }
}

/// Public search over published events
pub async fn public_events(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
) -> ServiceResult<Json<Page<EventDto>>> {
    let params = QueryParams::new(query);

    let mut filter = FilterSpec::new();
    if let Some(text) = params.one("text").filter(|t| !t.trim().is_empty()) {
        filter = filter.with_text(text);
    }
    if let Some(categories) = params.parsed_list::<i64>("categories")? {
        filter = filter.with_categories(categories);
    }
    if let Some(paid) = params.parsed::<bool>("paid")? {
        filter = filter.with_paid(paid);
    }
    if let Some(range) = event_range(&params, &state.format)? {
        filter = filter.with_range(range);
    }
    if let Some(only_available) = params.parsed::<bool>("onlyAvailable")? {
        filter = filter.with_only_available(only_available);
    }

    let sort = params
        .one("sort")
        .map(|value| {
            EventSort::from_str(value)
                .map_err(|_| ServiceError::Validation(format!("unknown sort '{value}'")))
        })
        .transpose()?;
    let page = page_request(&params)?;

    let request = request_info(&uri, &headers, addr, &state.client_ip);
    let result = state
        .engine
        .public_search(filter, sort, page, &request)
        .await?;
    Ok(Json(EventDto::page(result, &state.format)))
}

pub async fn public_event(
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    uri: Uri,
) -> ServiceResult<Json<EventDto>> {
    let request = request_info(&uri, &headers, addr, &state.client_ip);
    let event = state.engine.public_by_id(event_id, &request).await?;
    Ok(Json(EventDto::new(event, &state.format)))
}

pub async fn create_event(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(payload): Json<NewEvent>,
) -> ServiceResult<(StatusCode, Json<EventDto>)> {
    let event = state.service.create_event(user_id, payload).await?;
    let enriched = state.engine.enrich_one(event).await?;
    Ok((StatusCode::CREATED, Json(EventDto::new(enriched, &state.format))))
}

pub async fn initiator_events(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Query(query): Query<Vec<(String, String)>>,
) -> ServiceResult<Json<Page<EventDto>>> {
    let page = page_request(&QueryParams::new(query))?;
    let result = state.engine.by_initiator(user_id, page).await?;
    Ok(Json(EventDto::page(result, &state.format)))
}

pub async fn initiator_event(
    State(state): State<Arc<AppState>>,
    Path((user_id, event_id)): Path<(i64, i64)>,
) -> ServiceResult<Json<EventDto>> {
    let event = state.engine.initiator_event(user_id, event_id).await?;
    Ok(Json(EventDto::new(event, &state.format)))
}

pub async fn update_initiator_event(
    State(state): State<Arc<AppState>>,
    Path((user_id, event_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateEventUser>,
) -> ServiceResult<Json<EventDto>> {
    let event = state
        .service
        .initiator_update(user_id, event_id, payload)
        .await?;
    let enriched = state.engine.enrich_one(event).await?;
    Ok(Json(EventDto::new(enriched, &state.format)))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path((user_id, event_id)): Path<(i64, i64)>,
    Json(payload): Json<NewCommentRequest>,
) -> ServiceResult<(StatusCode, Json<CommentDto>)> {
    let comment = state
        .service
        .add_comment(user_id, event_id, &payload.text)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CommentDto::new(&comment, &state.format)),
    ))
}
