use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regreport_core::{ReportingError, ReportingResult, ScheduleDefinition, ScheduleRepository};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::priority_from_column;

const SCHEDULE_COLUMNS: &str = "schedule_id, report_type, format, institution_id, jurisdiction, \
    cron_expression, priority, status, next_run_time, last_run_time, dependencies, max_retries, \
    retry_delay_minutes, timeout_minutes, resource_requirements, metadata, created_at, updated_at";

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(row: &SqliteRow) -> ReportingResult<ScheduleDefinition> {
        let dependencies: String = row.try_get("dependencies")?;
        let resource_requirements: String = row.try_get("resource_requirements")?;
        let metadata: String = row.try_get("metadata")?;
        let max_retries: i64 = row.try_get("max_retries")?;

        Ok(ScheduleDefinition {
            schedule_id: row.try_get("schedule_id")?,
            report_type: row.try_get("report_type")?,
            format: row.try_get("format")?,
            institution_id: row.try_get("institution_id")?,
            jurisdiction: row.try_get("jurisdiction")?,
            cron_expression: row.try_get("cron_expression")?,
            priority: priority_from_column(row.try_get("priority")?)?,
            status: row.try_get("status")?,
            next_run_time: row.try_get("next_run_time")?,
            last_run_time: row.try_get("last_run_time")?,
            dependencies: serde_json::from_str(&dependencies)?,
            max_retries: u32::try_from(max_retries).unwrap_or(0),
            retry_delay_minutes: row.try_get("retry_delay_minutes")?,
            timeout_minutes: row.try_get("timeout_minutes")?,
            resource_requirements: serde_json::from_str(&resource_requirements)?,
            metadata: serde_json::from_str(&metadata)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.schedule_id))]
    async fn create(&self, schedule: &ScheduleDefinition) -> ReportingResult<()> {
        let dependencies = serde_json::to_string(&schedule.dependencies)?;
        let resource_requirements = serde_json::to_string(&schedule.resource_requirements)?;
        let metadata = serde_json::to_string(&schedule.metadata)?;

        sqlx::query(&format!(
            "INSERT INTO report_schedules ({SCHEDULE_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&schedule.schedule_id)
        .bind(schedule.report_type)
        .bind(schedule.format)
        .bind(&schedule.institution_id)
        .bind(&schedule.jurisdiction)
        .bind(&schedule.cron_expression)
        .bind(schedule.priority.value())
        .bind(schedule.status)
        .bind(schedule.next_run_time)
        .bind(schedule.last_run_time)
        .bind(dependencies)
        .bind(i64::from(schedule.max_retries))
        .bind(schedule.retry_delay_minutes)
        .bind(schedule.timeout_minutes)
        .bind(resource_requirements)
        .bind(metadata)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("创建报告计划成功: {}", schedule.entity_description());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, schedule_id: &str) -> ReportingResult<Option<ScheduleDefinition>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM report_schedules WHERE schedule_id = ?"
        ))
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.schedule_id))]
    async fn update(&self, schedule: &ScheduleDefinition) -> ReportingResult<()> {
        let dependencies = serde_json::to_string(&schedule.dependencies)?;
        let resource_requirements = serde_json::to_string(&schedule.resource_requirements)?;
        let metadata = serde_json::to_string(&schedule.metadata)?;

        let result = sqlx::query(
            r#"
            UPDATE report_schedules
            SET report_type = ?, format = ?, institution_id = ?, jurisdiction = ?,
                cron_expression = ?, priority = ?, status = ?, next_run_time = ?,
                last_run_time = ?, dependencies = ?, max_retries = ?, retry_delay_minutes = ?,
                timeout_minutes = ?, resource_requirements = ?, metadata = ?, updated_at = ?
            WHERE schedule_id = ?
            "#,
        )
        .bind(schedule.report_type)
        .bind(schedule.format)
        .bind(&schedule.institution_id)
        .bind(&schedule.jurisdiction)
        .bind(&schedule.cron_expression)
        .bind(schedule.priority.value())
        .bind(schedule.status)
        .bind(schedule.next_run_time)
        .bind(schedule.last_run_time)
        .bind(dependencies)
        .bind(i64::from(schedule.max_retries))
        .bind(schedule.retry_delay_minutes)
        .bind(schedule.timeout_minutes)
        .bind(resource_requirements)
        .bind(metadata)
        .bind(schedule.updated_at)
        .bind(&schedule.schedule_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ReportingError::ScheduleNotFound {
                id: schedule.schedule_id.clone(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> ReportingResult<Vec<ScheduleDefinition>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM report_schedules ORDER BY created_at, schedule_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_schedule).collect()
    }

    #[instrument(skip(self))]
    async fn find_due(&self, now: DateTime<Utc>) -> ReportingResult<Vec<ScheduleDefinition>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM report_schedules \
             WHERE status = 'ACTIVE' AND next_run_time IS NOT NULL AND next_run_time <= ? \
             ORDER BY next_run_time"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let schedules = rows
            .iter()
            .map(Self::row_to_schedule)
            .collect::<ReportingResult<Vec<_>>>()?;
        debug!("到期报告计划 {} 个", schedules.len());
        Ok(schedules)
    }

    async fn count(&self) -> ReportingResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM report_schedules")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
