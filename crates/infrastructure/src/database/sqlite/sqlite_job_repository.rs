use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regreport_core::{JobRepository, JobStatus, ReportingError, ReportingResult, ScheduledJob};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::{debug, instrument};

use super::priority_from_column;

const JOB_COLUMNS: &str = "job_id, schedule_id, report_type, format, institution_id, jurisdiction, \
    reporting_period, scheduled_time, started_time, completed_time, status, priority, retry_count, \
    max_retries, retry_delay_minutes, timeout_minutes, resource_pool, result_data, \
    resource_allocation, dependencies_met, dependency_jobs, error_message, created_at";

const RUNNABLE_STATUSES: [JobStatus; 3] =
    [JobStatus::Scheduled, JobStatus::Queued, JobStatus::Retrying];

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &SqliteRow) -> ReportingResult<ScheduledJob> {
        let result_data: Option<String> = row.try_get("result_data")?;
        let resource_allocation: Option<String> = row.try_get("resource_allocation")?;
        let dependency_jobs: String = row.try_get("dependency_jobs")?;
        let retry_count: i64 = row.try_get("retry_count")?;
        let max_retries: i64 = row.try_get("max_retries")?;

        Ok(ScheduledJob {
            job_id: row.try_get("job_id")?,
            schedule_id: row.try_get("schedule_id")?,
            report_type: row.try_get("report_type")?,
            format: row.try_get("format")?,
            institution_id: row.try_get("institution_id")?,
            jurisdiction: row.try_get("jurisdiction")?,
            reporting_period: row.try_get("reporting_period")?,
            scheduled_time: row.try_get("scheduled_time")?,
            started_time: row.try_get("started_time")?,
            completed_time: row.try_get("completed_time")?,
            status: row.try_get("status")?,
            priority: priority_from_column(row.try_get("priority")?)?,
            retry_count: u32::try_from(retry_count).unwrap_or(0),
            max_retries: u32::try_from(max_retries).unwrap_or(0),
            retry_delay_minutes: row.try_get("retry_delay_minutes")?,
            timeout_minutes: row.try_get("timeout_minutes")?,
            resource_pool: row.try_get("resource_pool")?,
            result_data: result_data
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            resource_allocation: resource_allocation
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            dependencies_met: row.try_get("dependencies_met")?,
            dependency_jobs: serde_json::from_str(&dependency_jobs)?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn encode_json_columns(
        job: &ScheduledJob,
    ) -> ReportingResult<(Option<String>, Option<String>, String)> {
        let result_data = job
            .result_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let resource_allocation = job
            .resource_allocation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let dependency_jobs = serde_json::to_string(&job.dependency_jobs)?;
        Ok((result_data, resource_allocation, dependency_jobs))
    }

    fn push_status_list(builder: &mut QueryBuilder<'_, Sqlite>, statuses: &[JobStatus]) {
        builder.push("(");
        let mut separated = builder.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");
    }
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(job_id = %job.job_id, schedule_id = %job.schedule_id))]
    async fn create(&self, job: &ScheduledJob) -> ReportingResult<()> {
        let (result_data, resource_allocation, dependency_jobs) = Self::encode_json_columns(job)?;

        sqlx::query(&format!(
            "INSERT INTO scheduled_jobs ({JOB_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&job.job_id)
        .bind(&job.schedule_id)
        .bind(job.report_type)
        .bind(job.format)
        .bind(&job.institution_id)
        .bind(&job.jurisdiction)
        .bind(&job.reporting_period)
        .bind(job.scheduled_time)
        .bind(job.started_time)
        .bind(job.completed_time)
        .bind(job.status)
        .bind(job.priority.value())
        .bind(i64::from(job.retry_count))
        .bind(i64::from(job.max_retries))
        .bind(job.retry_delay_minutes)
        .bind(job.timeout_minutes)
        .bind(&job.resource_pool)
        .bind(result_data)
        .bind(resource_allocation)
        .bind(job.dependencies_met)
        .bind(dependency_jobs)
        .bind(&job.error_message)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        debug!("创建作业成功: {}", job.entity_description());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, job_id: &str) -> ReportingResult<Option<ScheduledJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE job_id = ?"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_job).transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id, status = job.status.as_str()))]
    async fn update(&self, job: &ScheduledJob) -> ReportingResult<()> {
        let (result_data, resource_allocation, dependency_jobs) = Self::encode_json_columns(job)?;

        let result = sqlx::query(
            r#"
            UPDATE scheduled_jobs
            SET scheduled_time = ?, started_time = ?, completed_time = ?, status = ?,
                priority = ?, retry_count = ?, max_retries = ?, retry_delay_minutes = ?,
                timeout_minutes = ?, resource_pool = ?, result_data = ?, resource_allocation = ?,
                dependencies_met = ?, dependency_jobs = ?, error_message = ?
            WHERE job_id = ?
            "#,
        )
        .bind(job.scheduled_time)
        .bind(job.started_time)
        .bind(job.completed_time)
        .bind(job.status)
        .bind(job.priority.value())
        .bind(i64::from(job.retry_count))
        .bind(i64::from(job.max_retries))
        .bind(job.retry_delay_minutes)
        .bind(job.timeout_minutes)
        .bind(&job.resource_pool)
        .bind(result_data)
        .bind(resource_allocation)
        .bind(job.dependencies_met)
        .bind(dependency_jobs)
        .bind(&job.error_message)
        .bind(&job.job_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ReportingError::JobNotFound {
                id: job.job_id.clone(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_for_period(
        &self,
        schedule_id: &str,
        reporting_period: &str,
    ) -> ReportingResult<Vec<ScheduledJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs \
             WHERE schedule_id = ? AND reporting_period = ? ORDER BY created_at"
        ))
        .bind(schedule_id)
        .bind(reporting_period)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self))]
    async fn latest_dependency_status(
        &self,
        dependency_id: &str,
        reporting_period: &str,
    ) -> ReportingResult<Option<JobStatus>> {
        let by_job: Option<JobStatus> =
            sqlx::query_scalar("SELECT status FROM scheduled_jobs WHERE job_id = ?")
                .bind(dependency_id)
                .fetch_optional(&self.pool)
                .await?;
        if by_job.is_some() {
            return Ok(by_job);
        }

        let by_schedule: Option<JobStatus> = sqlx::query_scalar(
            "SELECT status FROM scheduled_jobs \
             WHERE schedule_id = ? AND reporting_period = ? \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(dependency_id)
        .bind(reporting_period)
        .fetch_optional(&self.pool)
        .await?;
        Ok(by_schedule)
    }

    #[instrument(skip(self))]
    async fn find_by_status(&self, statuses: &[JobStatus]) -> ReportingResult<Vec<ScheduledJob>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE status IN "
        ));
        Self::push_status_list(&mut builder, statuses);
        builder.push(" ORDER BY priority DESC, scheduled_time");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self))]
    async fn find_waiting_on_dependencies(
        &self,
        horizon: DateTime<Utc>,
    ) -> ReportingResult<Vec<ScheduledJob>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {JOB_COLUMNS} FROM scheduled_jobs WHERE dependencies_met = 0 AND status IN "
        ));
        Self::push_status_list(&mut builder, &RUNNABLE_STATUSES);
        builder.push(" AND scheduled_time <= ");
        builder.push_bind(horizon);
        builder.push(" ORDER BY scheduled_time");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_job).collect()
    }

    #[instrument(skip(self))]
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> ReportingResult<u64> {
        let result = sqlx::query(
            "DELETE FROM scheduled_jobs \
             WHERE status IN ('COMPLETED', 'CANCELLED') \
             AND completed_time IS NOT NULL AND completed_time < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        debug!("清理历史作业 {} 个", deleted);
        Ok(deleted)
    }
}
