use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use regreport_core::{JobRepository, JobStatus, ReportingResult, ScheduledJob};

/// 依赖检查结果
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyCheckResult {
    pub can_execute: bool,
    pub blocking_dependencies: Vec<String>,
    pub reason: Option<String>,
}

impl DependencyCheckResult {
    fn satisfied() -> Self {
        Self {
            can_execute: true,
            blocking_dependencies: Vec::new(),
            reason: None,
        }
    }
}

/// 检查作业依赖是否已在同一报告期间完成
///
/// 只看每个依赖在同一期间最近一次运行的状态，不做环检测。
pub struct DependencyChecker {
    job_repo: Arc<dyn JobRepository>,
}

impl DependencyChecker {
    pub fn new(job_repo: Arc<dyn JobRepository>) -> Self {
        Self { job_repo }
    }

    async fn check_single_dependency(
        &self,
        dependency_id: &str,
        reporting_period: &str,
    ) -> ReportingResult<bool> {
        match self
            .job_repo
            .latest_dependency_status(dependency_id, reporting_period)
            .await?
        {
            Some(JobStatus::Completed) => {
                debug!("依赖 {} 在 {} 已完成", dependency_id, reporting_period);
                Ok(true)
            }
            Some(status) => {
                debug!(
                    "依赖 {} 在 {} 的最近状态为 {}，不满足依赖条件",
                    dependency_id,
                    reporting_period,
                    status.as_str()
                );
                Ok(false)
            }
            None => {
                debug!("依赖 {} 在 {} 没有运行记录", dependency_id, reporting_period);
                Ok(false)
            }
        }
    }

    pub async fn check_dependencies(
        &self,
        job: &ScheduledJob,
    ) -> ReportingResult<DependencyCheckResult> {
        if job.dependency_jobs.is_empty() {
            return Ok(DependencyCheckResult::satisfied());
        }

        let mut blocking_dependencies = Vec::new();
        for dependency_id in &job.dependency_jobs {
            if !self
                .check_single_dependency(dependency_id, &job.reporting_period)
                .await?
            {
                blocking_dependencies.push(dependency_id.clone());
            }
        }

        if blocking_dependencies.is_empty() {
            return Ok(DependencyCheckResult::satisfied());
        }

        let reason = format!("以下依赖未完成: {blocking_dependencies:?}");
        Ok(DependencyCheckResult {
            can_execute: false,
            blocking_dependencies,
            reason: Some(reason),
        })
    }
}

/// 作业等待依赖是否已超时（从创建时间算起）
pub fn dependency_wait_expired(
    job: &ScheduledJob,
    now: DateTime<Utc>,
    timeout_minutes: i64,
) -> bool {
    now - job.created_at > Duration::minutes(timeout_minutes)
}
