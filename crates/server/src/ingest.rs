//! HTTP entry point for the Report Extractor. Workflow tools post their raw
//! node output here; the response body is always the extraction envelope.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use crashdesk_core::config::IngestConfig;
use crashdesk_core::extract::{Envelope, ReportExtractor};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

const INGEST_SECRET_HEADER: &str = "x-crashdesk-ingest-secret";

#[derive(Clone)]
pub struct IngestState {
    extractor: Arc<ReportExtractor>,
    shared_secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct IngestError {
    error: String,
}

pub fn router(config: &IngestConfig) -> Router {
    let state = IngestState {
        extractor: Arc::new(ReportExtractor::new(config.link_incidents)),
        shared_secret: config
            .shared_secret
            .as_ref()
            .map(|secret| secret.expose_secret().to_string()),
    };

    Router::new().route("/api/v1/ingest", post(ingest)).with_state(state)
}

async fn ingest(
    State(state): State<IngestState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Envelope>), (StatusCode, Json<IngestError>)> {
    secret_guard(&headers, state.shared_secret.as_deref())?;

    let records = decode_records(payload)?;
    let envelope = state.extractor.extract(&records);

    info!(
        event_name = "ingest.extraction_completed",
        success = envelope.success,
        has_incident_id = envelope.has_incident_id,
        "ingest extraction finished"
    );

    let status = if envelope.success { StatusCode::OK } else { StatusCode::UNPROCESSABLE_ENTITY };
    Ok((status, Json(envelope)))
}

fn secret_guard(
    headers: &HeaderMap,
    shared_secret: Option<&str>,
) -> Result<(), (StatusCode, Json<IngestError>)> {
    let Some(secret) = shared_secret else {
        return Ok(());
    };

    let provided = headers.get(INGEST_SECRET_HEADER).and_then(|value| value.to_str().ok());
    match provided {
        Some(value) if value == secret => Ok(()),
        Some(_) => Err((
            StatusCode::UNAUTHORIZED,
            Json(IngestError { error: "invalid ingest secret".to_string() }),
        )),
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(IngestError { error: "missing ingest secret".to_string() }),
        )),
    }
}

/// Workflow tools deliver the record array directly, a single record object,
/// or the whole payload double-encoded as a JSON string.
fn decode_records(payload: Value) -> Result<Vec<Value>, (StatusCode, Json<IngestError>)> {
    let payload = match payload {
        Value::String(inner) => serde_json::from_str::<Value>(&inner).map_err(|error| {
            (
                StatusCode::BAD_REQUEST,
                Json(IngestError {
                    error: format!("double-encoded payload is not valid JSON: {error}"),
                }),
            )
        })?,
        other => other,
    };

    match payload {
        Value::Array(records) => Ok(records),
        record @ Value::Object(_) => Ok(vec![record]),
        _ => Err((
            StatusCode::BAD_REQUEST,
            Json(IngestError {
                error: "expected a workflow record array or a single record object".to_string(),
            }),
        )),
    }
}
