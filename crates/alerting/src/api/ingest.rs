use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::state::ApiState;

#[derive(Deserialize)]
pub struct Sample {
    pub metric: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Defaults to the time the sample is received.
    pub timestamp_ms: Option<i64>,
    pub value: Option<f64>,
}

#[derive(Deserialize)]
pub struct IngestRequest {
    pub samples: Vec<Sample>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
}

pub async fn push_samples(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(body): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestResponse>), StatusCode> {
    let source = state.sources.get(&name).ok_or(StatusCode::NOT_FOUND)?;
    if body.samples.iter().any(|s| s.metric.trim().is_empty()) {
        return Err(StatusCode::BAD_REQUEST);
    }

    let now = Utc::now().timestamp_millis();
    let accepted = body.samples.len();
    for s in body.samples {
        source.ingest(&s.metric, s.tags, s.timestamp_ms.unwrap_or(now), s.value);
    }
    tracing::debug!(datasource = %name, accepted, "samples ingested");

    Ok((StatusCode::ACCEPTED, Json(IngestResponse { accepted })))
}
