use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::report::{ReportFormat, ReportType, ValidationOutcome};
use super::schedule::{Priority, ScheduleDefinition};

/// 调度作业状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "SCHEDULED")]
    Scheduled,
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "RETRYING")]
    Retrying,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "SCHEDULED",
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Retrying => "RETRYING",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// 同一期间内阻止再次创建作业的状态（除失败与取消外的所有状态）
    pub fn blocks_new_job(&self) -> bool {
        !matches!(self, JobStatus::Failed | JobStatus::Cancelled)
    }

    /// 可以被执行器取出运行的状态
    pub fn is_runnable(&self) -> bool {
        matches!(
            self,
            JobStatus::Scheduled | JobStatus::Queued | JobStatus::Retrying
        )
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(JobStatus::Scheduled),
            "QUEUED" => Ok(JobStatus::Queued),
            "RUNNING" => Ok(JobStatus::Running),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            "RETRYING" => Ok(JobStatus::Retrying),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl_sqlite_text_enum!(JobStatus);

/// 作业占用的资源
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceAllocation {
    pub pool: String,
    pub allocated_at: DateTime<Utc>,
}

/// 作业成功后记录的报告信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResultData {
    pub report_id: String,
    pub file_path: Option<String>,
    pub file_size: Option<u64>,
    pub checksum: Option<String>,
    pub validation_results: ValidationOutcome,
}

/// 报告计划在某个报告期间的一次执行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledJob {
    pub job_id: String,
    pub schedule_id: String,
    pub report_type: ReportType,
    pub format: ReportFormat,
    pub institution_id: String,
    pub jurisdiction: String,
    pub reporting_period: String,
    pub scheduled_time: DateTime<Utc>,
    pub started_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub priority: Priority,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retry_delay_minutes: i64,
    pub timeout_minutes: i64,
    pub resource_pool: String,
    pub result_data: Option<JobResultData>,
    pub resource_allocation: Option<ResourceAllocation>,
    pub dependencies_met: bool,
    /// 依赖的报告计划ID或作业ID
    pub dependency_jobs: Vec<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// 根据报告计划为指定期间创建新作业
    pub fn from_schedule(
        schedule: &ScheduleDefinition,
        reporting_period: impl Into<String>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            schedule_id: schedule.schedule_id.clone(),
            report_type: schedule.report_type,
            format: schedule.format,
            institution_id: schedule.institution_id.clone(),
            jurisdiction: schedule.jurisdiction.clone(),
            reporting_period: reporting_period.into(),
            scheduled_time,
            started_time: None,
            completed_time: None,
            status: JobStatus::Scheduled,
            priority: schedule.priority,
            retry_count: 0,
            max_retries: schedule.max_retries,
            retry_delay_minutes: schedule.retry_delay_minutes,
            timeout_minutes: schedule.timeout_minutes,
            resource_pool: schedule.resource_pool(),
            result_data: None,
            resource_allocation: None,
            dependencies_met: schedule.dependencies.is_empty(),
            dependency_jobs: schedule.dependencies.clone(),
            error_message: None,
            created_at: scheduled_time,
        }
    }

    /// 是否还能重试
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// 运行耗时（秒）
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_time, self.completed_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }

    pub fn entity_description(&self) -> String {
        format!(
            "作业 '{}' ({} {} / {})",
            self.job_id, self.report_type, self.reporting_period, self.institution_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_schedule() -> ScheduleDefinition {
        ScheduleDefinition::new("finrep_q", ReportType::Finrep, "INST_001", "EU", "0 9 28 3,6,9,12 *")
            .with_priority(Priority::High)
            .with_dependencies(vec!["corep_q".to_string()])
    }

    #[test]
    fn test_job_from_schedule() {
        let at = Utc.with_ymd_and_hms(2024, 6, 28, 9, 0, 0).unwrap();
        let job = ScheduledJob::from_schedule(&sample_schedule(), "2024-Q1", at);

        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.priority, Priority::High);
        assert_eq!(job.resource_pool, "finrep");
        assert!(!job.dependencies_met);
        assert_eq!(job.dependency_jobs, vec!["corep_q".to_string()]);
        assert!(job.can_retry());
    }

    #[test]
    fn test_status_classification() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Completed.blocks_new_job());
        assert!(!JobStatus::Failed.blocks_new_job());
        assert!(!JobStatus::Cancelled.blocks_new_job());
        assert!(JobStatus::Retrying.is_runnable());
        assert!(!JobStatus::Running.is_runnable());
    }

    #[test]
    fn test_duration_seconds() {
        let at = Utc.with_ymd_and_hms(2024, 6, 28, 9, 0, 0).unwrap();
        let mut job = ScheduledJob::from_schedule(&sample_schedule(), "2024-Q1", at);
        assert_eq!(job.duration_seconds(), None);

        job.started_time = Some(at);
        job.completed_time = Some(at + Duration::milliseconds(2500));
        assert_eq!(job.duration_seconds(), Some(2.5));
    }
}
