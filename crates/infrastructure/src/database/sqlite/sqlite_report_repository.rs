use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regreport_core::{ReportRepository, ReportStatusRecord, ReportingResult, StoredReport};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

const REPORT_COLUMNS: &str = "report_id, report_type, format, reporting_period, institution_id, \
    file_path, file_size, checksum, created_at";

pub struct SqliteReportRepository {
    pool: SqlitePool,
}

impl SqliteReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_report(row: &SqliteRow) -> ReportingResult<StoredReport> {
        Ok(StoredReport {
            report_id: row.try_get("report_id")?,
            report_type: row.try_get("report_type")?,
            format: row.try_get("format")?,
            reporting_period: row.try_get("reporting_period")?,
            institution_id: row.try_get("institution_id")?,
            file_path: row.try_get("file_path")?,
            file_size: row.try_get("file_size")?,
            checksum: row.try_get("checksum")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    #[instrument(skip(self, record), fields(report_id = %record.report_id, status = record.status.as_str()))]
    async fn upsert_status(&self, record: &ReportStatusRecord) -> ReportingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO report_generation_status (report_id, status, error_message, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(report_id) DO UPDATE SET
                status = excluded.status,
                error_message = excluded.error_message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.report_id)
        .bind(record.status)
        .bind(&record.error_message)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_status(&self, report_id: &str) -> ReportingResult<Option<ReportStatusRecord>> {
        let row = sqlx::query(
            "SELECT report_id, status, error_message, updated_at \
             FROM report_generation_status WHERE report_id = ?",
        )
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(ReportStatusRecord {
                report_id: row.try_get("report_id")?,
                status: row.try_get("status")?,
                error_message: row.try_get("error_message")?,
                updated_at: row.try_get("updated_at")?,
            })),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, report), fields(report_id = %report.report_id))]
    async fn upsert_report(&self, report: &StoredReport) -> ReportingResult<()> {
        sqlx::query(&format!(
            "INSERT INTO compliance_reports ({REPORT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(report_id) DO UPDATE SET \
                 file_path = excluded.file_path, \
                 file_size = excluded.file_size, \
                 checksum = excluded.checksum, \
                 created_at = excluded.created_at"
        ))
        .bind(&report.report_id)
        .bind(report.report_type)
        .bind(report.format)
        .bind(&report.reporting_period)
        .bind(&report.institution_id)
        .bind(&report.file_path)
        .bind(report.file_size)
        .bind(&report.checksum)
        .bind(report.created_at)
        .execute(&self.pool)
        .await?;

        debug!("报告元数据已保存: {} -> {}", report.report_id, report.file_path);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_report(&self, report_id: &str) -> ReportingResult<Option<StoredReport>> {
        let row = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM compliance_reports WHERE report_id = ?"
        ))
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_report).transpose()
    }

    #[instrument(skip(self))]
    async fn find_reports_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> ReportingResult<Vec<StoredReport>> {
        let rows = sqlx::query(&format!(
            "SELECT {REPORT_COLUMNS} FROM compliance_reports WHERE created_at < ? ORDER BY created_at"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_report).collect()
    }

    #[instrument(skip(self))]
    async fn delete_report(&self, report_id: &str) -> ReportingResult<()> {
        sqlx::query("DELETE FROM compliance_reports WHERE report_id = ?")
            .bind(report_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM report_generation_status WHERE report_id = ?")
            .bind(report_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
