use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::params::QueryParams;
use crate::error::ServiceResult;
use crate::stats::{HitPayload, HitRecorder, StatEntry, StatsAggregator, StatsQuery};

pub struct StatsState {
    pub recorder: HitRecorder,
    pub aggregator: StatsAggregator,
}

/// Append one hit to the log
pub async fn record_hit(
    State(state): State<Arc<StatsState>>,
    Json(payload): Json<HitPayload>,
) -> ServiceResult<(StatusCode, Json<HitPayload>)> {
    let record = state.recorder.record_payload(&payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(HitPayload::from_record(&record, state.recorder.format())),
    ))
}

/// `GET /stats?start=&end=&uris=&unique=`
pub async fn get_stats(
    State(state): State<Arc<StatsState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> ServiceResult<Json<Vec<StatEntry>>> {
    let params = QueryParams::new(query);
    let stats_query = StatsQuery::parse(
        params.require("start")?,
        params.require("end")?,
        params.list("uris"),
        params.parsed_or("unique", false)?,
        state.recorder.format(),
    )?;

    let entries = state.aggregator.query(&stats_query).await?;
    Ok(Json(entries))
}
