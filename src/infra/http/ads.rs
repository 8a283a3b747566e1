//! Demo ad endpoints: time-stamped reads and a mutation that can be forced
//! to fail.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

#[derive(Debug, Serialize)]
pub struct AdView {
    pub date: String,
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateOutcome {
    pub ok: bool,
}

pub async fn show_ad(Path(id): Path<String>) -> Json<AdView> {
    // Rfc3339 carries nanoseconds, so two renders never share a body.
    let date = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(AdView { date, id })
}

/// Succeeds unless the query string contains an `error` parameter.
pub async fn update_ad(
    Path(_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.contains_key("error") {
        (StatusCode::BAD_REQUEST, Json(UpdateOutcome { ok: false })).into_response()
    } else {
        Json(UpdateOutcome { ok: true }).into_response()
    }
}
