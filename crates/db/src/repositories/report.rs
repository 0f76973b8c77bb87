use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use crashdesk_core::domain::incident::IncidentId;
use crashdesk_core::domain::report::{PartEntry, ReportStatus};

use super::{NewReport, PartRecord, ReportPatch, ReportRecord, ReportRepository, RepositoryError};
use crate::DbPool;

pub struct SqlReportRepository {
    pool: DbPool,
}

impl SqlReportRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_parts(&self, report_id: i64) -> Result<Vec<PartRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, report_id, part_number, part, likelihood, price, qty, total
             FROM report_part WHERE report_id = ? ORDER BY id",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(part_from_row).collect())
    }

    async fn hydrate(
        &self,
        row: Option<SqliteRow>,
    ) -> Result<Option<ReportRecord>, RepositoryError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut record = report_from_row(&row)?;
        record.parts = self.load_parts(record.id).await?;
        Ok(Some(record))
    }
}

#[async_trait]
impl ReportRepository for SqlReportRepository {
    async fn create(
        &self,
        new_report: NewReport,
        status: ReportStatus,
    ) -> Result<ReportRecord, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO report (incident_id, driver, date, chassis, event, accident_damage, status, total, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(new_report.incident_id.as_ref().map(IncidentId::as_str))
        .bind(&new_report.driver)
        .bind(&new_report.date)
        .bind(&new_report.chassis)
        .bind(&new_report.event)
        .bind(&new_report.accident_damage)
        .bind(status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        let report_id = inserted.last_insert_rowid();

        let total = replace_parts(&mut tx, report_id, &new_report.parts).await?;
        sqlx::query("UPDATE report SET total = ? WHERE id = ?")
            .bind(total)
            .bind(report_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.find_by_id(report_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("report {report_id} vanished after insert"))
        })
    }

    async fn find_by_id(&self, report_id: i64) -> Result<Option<ReportRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM report WHERE id = ?")
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    async fn find_by_incident(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Option<ReportRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM report WHERE incident_id = ?")
            .bind(incident_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate(row).await
    }

    async fn list(
        &self,
        status: Option<ReportStatus>,
    ) -> Result<Vec<ReportRecord>, RepositoryError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM report WHERE status = ? ORDER BY created_at DESC, id DESC",
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM report ORDER BY created_at DESC, id DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = report_from_row(row)?;
            record.parts = self.load_parts(record.id).await?;
            records.push(record);
        }
        Ok(records)
    }

    async fn update(
        &self,
        report_id: i64,
        patch: ReportPatch,
    ) -> Result<Option<ReportRecord>, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE report SET
                driver = COALESCE(?, driver),
                date = COALESCE(?, date),
                chassis = COALESCE(?, chassis),
                event = COALESCE(?, event),
                accident_damage = COALESCE(?, accident_damage),
                status = COALESCE(?, status),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(&patch.driver)
        .bind(&patch.date)
        .bind(&patch.chassis)
        .bind(&patch.event)
        .bind(&patch.accident_damage)
        .bind(patch.status.map(|status| status.as_str()))
        .bind(&now)
        .bind(report_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(parts) = &patch.parts {
            let total = replace_parts(&mut tx, report_id, parts).await?;
            sqlx::query("UPDATE report SET total = ? WHERE id = ?")
                .bind(total)
                .bind(report_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        self.find_by_id(report_id).await
    }

    async fn delete(&self, report_id: i64) -> Result<bool, RepositoryError> {
        let deleted = sqlx::query("DELETE FROM report WHERE id = ?")
            .bind(report_id)
            .execute(&self.pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }
}

async fn replace_parts(
    tx: &mut Transaction<'_, Sqlite>,
    report_id: i64,
    parts: &[PartEntry],
) -> Result<f64, RepositoryError> {
    sqlx::query("DELETE FROM report_part WHERE report_id = ?")
        .bind(report_id)
        .execute(&mut **tx)
        .await?;

    let mut total = 0.0;
    for part in parts {
        let line_total = part.line_total();
        total += line_total;

        sqlx::query(
            "INSERT INTO report_part (report_id, part_number, part, likelihood, price, qty, total)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(report_id)
        .bind(&part.part_number)
        .bind(&part.part)
        .bind(&part.likelihood)
        .bind(part.price)
        .bind(part.qty)
        .bind(line_total)
        .execute(&mut **tx)
        .await?;
    }

    Ok(total)
}

fn report_from_row(row: &SqliteRow) -> Result<ReportRecord, RepositoryError> {
    let status_raw: String = row.get("status");
    let status = ReportStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown report status `{status_raw}`")))?;

    Ok(ReportRecord {
        id: row.get("id"),
        incident_id: row.get::<Option<String>, _>("incident_id").map(IncidentId),
        driver: row.get("driver"),
        date: row.get("date"),
        chassis: row.get("chassis"),
        event: row.get("event"),
        accident_damage: row.get("accident_damage"),
        status,
        total: row.get("total"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        parts: Vec::new(),
    })
}

fn part_from_row(row: &SqliteRow) -> PartRecord {
    PartRecord {
        id: row.get("id"),
        report_id: row.get("report_id"),
        part_number: row.get("part_number"),
        part: row.get("part"),
        likelihood: row.get("likelihood"),
        price: row.get("price"),
        qty: row.get("qty"),
        total: row.get("total"),
    }
}

#[cfg(test)]
mod tests {
    use crashdesk_core::domain::incident::IncidentId;
    use crashdesk_core::domain::report::{PartEntry, ReportStatus};

    use crate::repositories::{NewReport, ReportPatch, ReportRepository};
    use crate::{connect_with_settings, migrations};

    use super::SqlReportRepository;

    async fn repository() -> SqlReportRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlReportRepository::new(pool)
    }

    fn sample_report() -> NewReport {
        NewReport {
            incident_id: Some(IncidentId("VRD-20240115-AB12CD".to_string())),
            driver: "A. Senna".to_string(),
            date: "2024-01-15".to_string(),
            chassis: "C-07".to_string(),
            event: "collision".to_string(),
            accident_damage: "front wing and nose".to_string(),
            parts: vec![
                PartEntry {
                    part_number: "FW-01".to_string(),
                    part: "front wing".to_string(),
                    price: 100.0,
                    qty: 2,
                    ..PartEntry::default()
                },
                PartEntry { part: "nose cone".to_string(), price: 12.5, ..PartEntry::default() },
            ],
        }
    }

    #[tokio::test]
    async fn create_computes_part_and_report_totals() {
        let repository = repository().await;

        let record =
            repository.create(sample_report(), ReportStatus::Pending).await.expect("create");

        assert_eq!(record.status, ReportStatus::Pending);
        assert_eq!(record.total, 212.5);
        assert_eq!(record.parts.len(), 2);
        assert_eq!(record.parts[0].total, 200.0);
        assert_eq!(record.parts[1].total, 12.5);
        assert_eq!(record.parts[1].qty, 1);
        assert_eq!(record.incident_id.as_ref().map(|id| id.as_str()), Some("VRD-20240115-AB12CD"));
    }

    #[tokio::test]
    async fn find_by_incident_returns_the_report() {
        let repository = repository().await;
        let created =
            repository.create(sample_report(), ReportStatus::Pending).await.expect("create");

        let found = repository
            .find_by_incident(&IncidentId("VRD-20240115-AB12CD".to_string()))
            .await
            .expect("find")
            .expect("report should exist");

        assert_eq!(found.id, created.id);
        assert_eq!(found.parts.len(), 2);
    }

    #[tokio::test]
    async fn update_replaces_parts_and_recomputes_total() {
        let repository = repository().await;
        let created =
            repository.create(sample_report(), ReportStatus::Pending).await.expect("create");

        let updated = repository
            .update(
                created.id,
                ReportPatch {
                    driver: Some("M. Hakkinen".to_string()),
                    parts: Some(vec![PartEntry {
                        part: "floor".to_string(),
                        price: 50.0,
                        qty: 3,
                        ..PartEntry::default()
                    }]),
                    ..ReportPatch::default()
                },
            )
            .await
            .expect("update")
            .expect("report should exist");

        assert_eq!(updated.driver, "M. Hakkinen");
        assert_eq!(updated.event, "collision", "unpatched fields should be preserved");
        assert_eq!(updated.parts.len(), 1);
        assert_eq!(updated.total, 150.0);
    }

    #[tokio::test]
    async fn status_only_patch_promotes_without_touching_parts() {
        let repository = repository().await;
        let created =
            repository.create(sample_report(), ReportStatus::Pending).await.expect("create");

        let updated = repository
            .update(
                created.id,
                ReportPatch { status: Some(ReportStatus::Active), ..ReportPatch::default() },
            )
            .await
            .expect("update")
            .expect("report should exist");

        assert_eq!(updated.status, ReportStatus::Active);
        assert_eq!(updated.parts.len(), 2);
        assert_eq!(updated.total, 212.5);
    }

    #[tokio::test]
    async fn update_of_missing_report_returns_none() {
        let repository = repository().await;

        let updated = repository
            .update(999, ReportPatch { driver: Some("ghost".to_string()), ..ReportPatch::default() })
            .await
            .expect("update");

        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn delete_cascades_part_rows() {
        let repository = repository().await;
        let created =
            repository.create(sample_report(), ReportStatus::Pending).await.expect("create");

        assert!(repository.delete(created.id).await.expect("delete"));
        assert!(repository.find_by_id(created.id).await.expect("find").is_none());

        let orphan_parts: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM report_part WHERE report_id = ?")
                .bind(created.id)
                .fetch_one(&repository.pool)
                .await
                .expect("count parts");
        assert_eq!(orphan_parts, 0);
        assert!(!repository.delete(created.id).await.expect("second delete"));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let repository = repository().await;
        let first =
            repository.create(sample_report(), ReportStatus::Pending).await.expect("create");
        let mut second = sample_report();
        second.incident_id = Some(IncidentId("VRD-20240116-0A1B2C".to_string()));
        let second = repository.create(second, ReportStatus::Pending).await.expect("create");

        repository
            .update(
                second.id,
                ReportPatch { status: Some(ReportStatus::Active), ..ReportPatch::default() },
            )
            .await
            .expect("update")
            .expect("report should exist");

        let pending = repository.list(Some(ReportStatus::Pending)).await.expect("list pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first.id);

        let all = repository.list(None).await.expect("list all");
        assert_eq!(all.len(), 2);
    }
}
