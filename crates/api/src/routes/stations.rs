//! Station Routes
//!
//! Both handlers answer 200 with a reply body once the request decodes;
//! storage failures are reported in the reply's `error` field.

use axum::{extract::State, Json};
use station_service::{RecordTempsReply, RecordTempsRequest, StationMaxReply, StationMaxRequest};
use std::sync::Arc;

use crate::AppState;

/// Record one day's temperature range
pub async fn record_temps(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecordTempsRequest>,
) -> Json<RecordTempsReply> {
    Json(state.service.record_temperatures(request).await)
}

/// Highest recorded `tmax` of a station
pub async fn station_max(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StationMaxRequest>,
) -> Json<StationMaxReply> {
    Json(state.service.station_maximum(request).await)
}
