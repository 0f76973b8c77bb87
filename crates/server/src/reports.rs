//! Dashboard report API: CRUD over the report store, the workflow-facing
//! create/enrich endpoints, and the fire-and-forget workflow trigger.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use crashdesk_core::domain::incident::IncidentId;
use crashdesk_core::domain::report::{PartEntry, ReportStatus};
use crashdesk_db::repositories::{
    NewReport, ReportPatch, ReportRecord, ReportRepository, RepositoryError, SqlReportRepository,
};
use crashdesk_db::DbPool;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct ReportsState {
    repository: Arc<SqlReportRepository>,
    http_client: Client,
    workflow_webhook_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

#[derive(Debug, Serialize)]
struct ReportEnvelope {
    success: bool,
    message: String,
    report: ReportRecord,
}

#[derive(Debug, Serialize)]
struct WorkflowCreateResponse {
    success: bool,
    message: String,
    status: &'static str,
    report: ReportRecord,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
}

/// Inbound report fields. Parts arrive as arbitrary JSON entries (sometimes
/// as a JSON-encoded string) and are normalized with the same coercions the
/// extractor applies.
#[derive(Debug, Default, Deserialize)]
struct ReportPayload {
    #[serde(default)]
    driver: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    chassis: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    accident_damage: Option<String>,
    #[serde(default)]
    parts: Option<Value>,
}

impl ReportPayload {
    fn into_new_report(self, incident_id: Option<IncidentId>) -> NewReport {
        NewReport {
            incident_id,
            driver: self.driver.unwrap_or_default(),
            date: self.date.unwrap_or_default(),
            chassis: self.chassis.unwrap_or_default(),
            event: self.event.unwrap_or_default(),
            accident_damage: self.accident_damage.unwrap_or_default(),
            parts: self.parts.and_then(part_entries).unwrap_or_default(),
        }
    }

    fn into_patch(self) -> ReportPatch {
        ReportPatch {
            driver: self.driver,
            date: self.date,
            chassis: self.chassis,
            event: self.event,
            accident_damage: self.accident_damage,
            parts: self.parts.and_then(part_entries),
            status: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: String,
}

pub fn router(db_pool: DbPool, http_client: Client, workflow_webhook_url: Option<String>) -> Router {
    let state = ReportsState {
        repository: Arc::new(SqlReportRepository::new(db_pool)),
        http_client,
        workflow_webhook_url,
    };

    Router::new()
        .route("/api/v1/reports", get(list_reports).post(create_report))
        .route("/api/v1/reports/from-workflow", post(create_from_workflow))
        .route("/api/v1/reports/pending", get(pending_reports))
        .route("/api/v1/reports/by-incident/{incident_id}", put(update_by_incident))
        .route(
            "/api/v1/reports/{report_id}",
            get(get_report).put(update_report).delete(delete_report),
        )
        .route("/api/v1/reports/{report_id}/status", put(update_status))
        .with_state(state)
}

async fn list_reports(
    State(state): State<ReportsState>,
) -> Result<Json<Vec<ReportRecord>>, (StatusCode, Json<ApiError>)> {
    let reports = state.repository.list(None).await.map_err(repository_error)?;
    Ok(Json(reports))
}

async fn pending_reports(
    State(state): State<ReportsState>,
) -> Result<Json<Vec<ReportRecord>>, (StatusCode, Json<ApiError>)> {
    let reports =
        state.repository.list(Some(ReportStatus::Pending)).await.map_err(repository_error)?;
    Ok(Json(reports))
}

async fn get_report(
    Path(report_id): Path<i64>,
    State(state): State<ReportsState>,
) -> Result<Json<ReportRecord>, (StatusCode, Json<ApiError>)> {
    state
        .repository
        .find_by_id(report_id)
        .await
        .map_err(repository_error)?
        .map(Json)
        .ok_or_else(report_not_found)
}

/// Dashboard-initiated creation: mint an incident id the workflow can link
/// back to, store the report as pending, and kick the workflow off.
async fn create_report(
    State(state): State<ReportsState>,
    Json(payload): Json<ReportPayload>,
) -> Result<(StatusCode, Json<ReportEnvelope>), (StatusCode, Json<ApiError>)> {
    let incident_id = IncidentId::generate(Utc::now());
    let record = state
        .repository
        .create(payload.into_new_report(Some(incident_id)), ReportStatus::Pending)
        .await
        .map_err(repository_error)?;

    notify_workflow(&state, &record);

    Ok((
        StatusCode::CREATED,
        Json(ReportEnvelope {
            success: true,
            message: "Report created successfully".to_string(),
            report: record,
        }),
    ))
}

/// Workflow-initiated creation from an already-extracted report payload.
async fn create_from_workflow(
    State(state): State<ReportsState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<WorkflowCreateResponse>), (StatusCode, Json<ApiError>)> {
    let payload = decode_report_payload(payload)?;
    let record = state
        .repository
        .create(payload.into_new_report(None), ReportStatus::Pending)
        .await
        .map_err(repository_error)?;

    Ok((
        StatusCode::CREATED,
        Json(WorkflowCreateResponse {
            success: true,
            message: "Report created successfully and marked as pending for review".to_string(),
            status: ReportStatus::Pending.as_str(),
            report: record,
        }),
    ))
}

async fn update_report(
    Path(report_id): Path<i64>,
    State(state): State<ReportsState>,
    Json(payload): Json<ReportPayload>,
) -> Result<Json<ReportEnvelope>, (StatusCode, Json<ApiError>)> {
    let record = state
        .repository
        .update(report_id, payload.into_patch())
        .await
        .map_err(repository_error)?
        .ok_or_else(report_not_found)?;

    Ok(Json(ReportEnvelope {
        success: true,
        message: "Report updated successfully".to_string(),
        report: record,
    }))
}

async fn update_status(
    Path(report_id): Path<i64>,
    State(state): State<ReportsState>,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<ReportEnvelope>, (StatusCode, Json<ApiError>)> {
    let Some(status) = ReportStatus::parse(&payload.status) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: "Invalid status. Must be: pending, active, or reviewed".to_string(),
            }),
        ));
    };

    let record = state
        .repository
        .update(report_id, ReportPatch { status: Some(status), ..ReportPatch::default() })
        .await
        .map_err(repository_error)?
        .ok_or_else(report_not_found)?;

    Ok(Json(ReportEnvelope {
        success: true,
        message: format!("Report status updated to {}", status.as_str()),
        report: record,
    }))
}

/// Enrichment path used by the workflow once the AI report is extracted:
/// update the pending report addressed by incident id and promote it to
/// active.
async fn update_by_incident(
    Path(incident_id): Path<String>,
    State(state): State<ReportsState>,
    Json(payload): Json<Value>,
) -> Result<Json<ReportEnvelope>, (StatusCode, Json<ApiError>)> {
    let incident_id = IncidentId::normalize(&incident_id);
    let payload = decode_report_payload(payload)?;

    let existing = state
        .repository
        .find_by_incident(&incident_id)
        .await
        .map_err(repository_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiError { error: format!("Report with incident id {incident_id} not found") }),
            )
        })?;

    let mut patch = payload.into_patch();
    patch.status = Some(ReportStatus::Active);

    let record = state
        .repository
        .update(existing.id, patch)
        .await
        .map_err(repository_error)?
        .ok_or_else(report_not_found)?;

    info!(
        event_name = "reports.enriched",
        incident_id = %incident_id,
        report_id = record.id,
        "report enriched by workflow"
    );

    Ok(Json(ReportEnvelope {
        success: true,
        message: "Report updated successfully by incident id".to_string(),
        report: record,
    }))
}

async fn delete_report(
    Path(report_id): Path<i64>,
    State(state): State<ReportsState>,
) -> Result<Json<DeleteResponse>, (StatusCode, Json<ApiError>)> {
    let deleted = state.repository.delete(report_id).await.map_err(repository_error)?;
    if !deleted {
        return Err(report_not_found());
    }

    Ok(Json(DeleteResponse {
        success: true,
        message: "Report deleted successfully".to_string(),
    }))
}

/// Fire-and-forget trigger: the dashboard response is never held up by the
/// workflow webhook.
fn notify_workflow(state: &ReportsState, record: &ReportRecord) {
    let Some(webhook_url) = state.workflow_webhook_url.clone() else {
        return;
    };
    let Some(incident_id) = record.incident_id.clone() else {
        return;
    };

    let payload = serde_json::json!({
        "incident_id": incident_id.as_str(),
        "driver": record.driver,
        "date": record.date,
        "chassis": record.chassis,
        "event": record.event,
        "accident_damage": record.accident_damage,
    });
    let client = state.http_client.clone();

    tokio::spawn(async move {
        match client.post(&webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(
                    event_name = "reports.workflow_triggered",
                    incident_id = %incident_id,
                    "workflow webhook accepted the report"
                );
            }
            Ok(response) => {
                warn!(
                    event_name = "reports.workflow_trigger_rejected",
                    incident_id = %incident_id,
                    status = %response.status(),
                    "workflow webhook returned a non-success status"
                );
            }
            Err(error) => {
                error!(
                    event_name = "reports.workflow_trigger_failed",
                    incident_id = %incident_id,
                    error = %error,
                    "workflow webhook request failed"
                );
            }
        }
    });
}

/// Workflow tools occasionally double-encode the body as a JSON string.
fn decode_report_payload(payload: Value) -> Result<ReportPayload, (StatusCode, Json<ApiError>)> {
    let payload = match payload {
        Value::String(inner) => serde_json::from_str::<Value>(&inner).map_err(|error| {
            bad_request(format!("double-encoded payload is not valid JSON: {error}"))
        })?,
        other => other,
    };

    serde_json::from_value(payload)
        .map_err(|error| bad_request(format!("invalid report payload: {error}")))
}

/// Part lists may arrive as an array or as a JSON-encoded string; anything
/// else leaves the stored parts untouched.
fn part_entries(parts: Value) -> Option<Vec<PartEntry>> {
    let parts = match parts {
        Value::String(inner) => serde_json::from_str::<Value>(&inner).unwrap_or(Value::Null),
        other => other,
    };

    match parts {
        Value::Array(entries) => Some(entries.iter().map(PartEntry::from_json).collect()),
        _ => None,
    }
}

fn repository_error(error: RepositoryError) -> (StatusCode, Json<ApiError>) {
    error!(error = %error, "report repository error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: "an internal repository error occurred".to_string() }),
    )
}

fn report_not_found() -> (StatusCode, Json<ApiError>) {
    (StatusCode::NOT_FOUND, Json(ApiError { error: "Report not found".to_string() }))
}

fn bad_request(message: String) -> (StatusCode, Json<ApiError>) {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message }))
}
