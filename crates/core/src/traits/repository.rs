use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::ReportingResult;
use crate::models::{
    JobStatus, ReportData, ReportStatusRecord, ReportType, ScheduleDefinition, ScheduledJob,
    StoredReport,
};

/// 报告计划仓库
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn create(&self, schedule: &ScheduleDefinition) -> ReportingResult<()>;
    async fn get_by_id(&self, schedule_id: &str) -> ReportingResult<Option<ScheduleDefinition>>;
    async fn update(&self, schedule: &ScheduleDefinition) -> ReportingResult<()>;
    async fn list_all(&self) -> ReportingResult<Vec<ScheduleDefinition>>;
    /// 状态为ACTIVE且 `next_run_time <= now` 的计划，按下次运行时间排序
    async fn find_due(&self, now: DateTime<Utc>) -> ReportingResult<Vec<ScheduleDefinition>>;
    async fn count(&self) -> ReportingResult<u64>;
}

/// 调度作业仓库
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &ScheduledJob) -> ReportingResult<()>;
    async fn get_by_id(&self, job_id: &str) -> ReportingResult<Option<ScheduledJob>>;
    async fn update(&self, job: &ScheduledJob) -> ReportingResult<()>;
    /// 某个报告计划在指定期间的全部作业
    async fn find_for_period(
        &self,
        schedule_id: &str,
        reporting_period: &str,
    ) -> ReportingResult<Vec<ScheduledJob>>;
    /// 依赖项在指定期间最近一次运行的状态
    ///
    /// 依赖ID既可以是作业ID，也可以是报告计划ID（此时只看同一期间的作业）。
    async fn latest_dependency_status(
        &self,
        dependency_id: &str,
        reporting_period: &str,
    ) -> ReportingResult<Option<JobStatus>>;
    async fn find_by_status(&self, statuses: &[JobStatus]) -> ReportingResult<Vec<ScheduledJob>>;
    /// 仍在等待依赖、计划时间不晚于 `horizon` 的可运行作业
    async fn find_waiting_on_dependencies(
        &self,
        horizon: DateTime<Utc>,
    ) -> ReportingResult<Vec<ScheduledJob>>;
    /// 删除在 `cutoff` 之前结束的已完成或已取消作业，返回删除数量
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> ReportingResult<u64>;
}

/// 报告元数据与生成状态仓库
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn upsert_status(&self, record: &ReportStatusRecord) -> ReportingResult<()>;
    async fn get_status(&self, report_id: &str) -> ReportingResult<Option<ReportStatusRecord>>;
    async fn upsert_report(&self, report: &StoredReport) -> ReportingResult<()>;
    async fn get_report(&self, report_id: &str) -> ReportingResult<Option<StoredReport>>;
    async fn find_reports_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> ReportingResult<Vec<StoredReport>>;
    async fn delete_report(&self, report_id: &str) -> ReportingResult<()>;
}

/// 上游只读数据源
#[async_trait]
pub trait ReportDataSource: Send + Sync {
    /// 机构基本信息：institution_name、institution_code、jurisdiction、currency
    async fn institution_profile(&self, institution_id: &str) -> ReportingResult<Option<ReportData>>;
    /// 指定报告类型在某期间的业务数据
    async fn report_figures(
        &self,
        report_type: ReportType,
        institution_id: &str,
        reporting_period: &str,
    ) -> ReportingResult<Option<ReportData>>;
}
