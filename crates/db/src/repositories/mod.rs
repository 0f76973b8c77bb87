use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crashdesk_core::domain::incident::IncidentId;
use crashdesk_core::domain::report::{PartEntry, ReportStatus};

pub mod report;

pub use report::SqlReportRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// A report as stored by the dashboard, including its part lines.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReportRecord {
    pub id: i64,
    pub incident_id: Option<IncidentId>,
    pub driver: String,
    pub date: String,
    pub chassis: String,
    pub event: String,
    pub accident_damage: String,
    pub status: ReportStatus,
    pub total: f64,
    pub created_at: String,
    pub updated_at: String,
    pub parts: Vec<PartRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartRecord {
    pub id: i64,
    pub report_id: i64,
    pub part_number: String,
    pub part: String,
    pub likelihood: String,
    pub price: f64,
    pub qty: i64,
    pub total: f64,
}

#[derive(Clone, Debug, Default)]
pub struct NewReport {
    pub incident_id: Option<IncidentId>,
    pub driver: String,
    pub date: String,
    pub chassis: String,
    pub event: String,
    pub accident_damage: String,
    pub parts: Vec<PartEntry>,
}

/// Partial update; `parts` replaces the whole part set and recomputes the
/// report total when present.
#[derive(Clone, Debug, Default)]
pub struct ReportPatch {
    pub driver: Option<String>,
    pub date: Option<String>,
    pub chassis: Option<String>,
    pub event: Option<String>,
    pub accident_damage: Option<String>,
    pub parts: Option<Vec<PartEntry>>,
    pub status: Option<ReportStatus>,
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(
        &self,
        new_report: NewReport,
        status: ReportStatus,
    ) -> Result<ReportRecord, RepositoryError>;
    async fn find_by_id(&self, report_id: i64) -> Result<Option<ReportRecord>, RepositoryError>;
    async fn find_by_incident(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Option<ReportRecord>, RepositoryError>;
    async fn list(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportRecord>, RepositoryError>;
    async fn update(
        &self,
        report_id: i64,
        patch: ReportPatch,
    ) -> Result<Option<ReportRecord>, RepositoryError>;
    async fn delete(&self, report_id: i64) -> Result<bool, RepositoryError>;
}
