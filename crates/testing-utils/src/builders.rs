//! Test data builders with sensible defaults

use chrono::{DateTime, Duration, TimeZone, Utc};
use regreport_core::{
    JobStatus, Priority, ReportData, ReportFormat, ReportRequest, ReportType, ScheduleDefinition,
    ScheduleStatus, ScheduledJob,
};
use serde_json::json;
use uuid::Uuid;

/// 测试中常用的固定时间点：2024-06-28 09:00 UTC
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 28, 9, 0, 0).unwrap()
}

/// Builder for ScheduleDefinition
pub struct ScheduleBuilder {
    schedule: ScheduleDefinition,
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        let mut schedule = ScheduleDefinition::new(
            "finrep_quarterly",
            ReportType::Finrep,
            "INST_001",
            "EU",
            "0 9 28 3,6,9,12 *",
        );
        schedule.created_at = fixed_time();
        schedule.updated_at = fixed_time();
        Self { schedule }
    }

    pub fn with_id(mut self, schedule_id: &str) -> Self {
        self.schedule.schedule_id = schedule_id.to_string();
        self
    }

    pub fn with_report_type(mut self, report_type: ReportType) -> Self {
        self.schedule.report_type = report_type;
        self.schedule.format = report_type.default_format();
        self
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.schedule.format = format;
        self
    }

    pub fn with_cron(mut self, cron_expression: &str) -> Self {
        self.schedule.cron_expression = cron_expression.to_string();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.schedule.priority = priority;
        self
    }

    pub fn with_status(mut self, status: ScheduleStatus) -> Self {
        self.schedule.status = status;
        self
    }

    pub fn with_next_run_time(mut self, next_run_time: DateTime<Utc>) -> Self {
        self.schedule.next_run_time = Some(next_run_time);
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.schedule.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay_minutes: i64) -> Self {
        self.schedule.max_retries = max_retries;
        self.schedule.retry_delay_minutes = retry_delay_minutes;
        self
    }

    pub fn with_resource_pool(mut self, pool: &str) -> Self {
        self.schedule.resource_requirements.pool = Some(pool.to_string());
        self
    }

    pub fn build(self) -> ScheduleDefinition {
        self.schedule
    }
}

impl Default for ScheduleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for ScheduledJob
pub struct JobBuilder {
    job: ScheduledJob,
}

impl JobBuilder {
    pub fn new() -> Self {
        let schedule = ScheduleBuilder::new().build();
        Self {
            job: ScheduledJob::from_schedule(&schedule, "2024-Q1", fixed_time()),
        }
    }

    /// 以给定计划为模板
    pub fn for_schedule(schedule: &ScheduleDefinition, reporting_period: &str) -> Self {
        Self {
            job: ScheduledJob::from_schedule(schedule, reporting_period, fixed_time()),
        }
    }

    pub fn with_id(mut self, job_id: &str) -> Self {
        self.job.job_id = job_id.to_string();
        self
    }

    pub fn with_schedule_id(mut self, schedule_id: &str) -> Self {
        self.job.schedule_id = schedule_id.to_string();
        self
    }

    pub fn with_report_type(mut self, report_type: ReportType) -> Self {
        self.job.report_type = report_type;
        self.job.format = report_type.default_format();
        self.job.resource_pool = report_type.resource_pool().to_string();
        self
    }

    pub fn with_period(mut self, reporting_period: &str) -> Self {
        self.job.reporting_period = reporting_period.to_string();
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.job.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.job.priority = priority;
        self
    }

    pub fn with_scheduled_time(mut self, scheduled_time: DateTime<Utc>) -> Self {
        self.job.scheduled_time = scheduled_time;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.job.created_at = created_at;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.job.retry_count = retry_count;
        self
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay_minutes: i64) -> Self {
        self.job.max_retries = max_retries;
        self.job.retry_delay_minutes = retry_delay_minutes;
        self
    }

    pub fn with_resource_pool(mut self, pool: &str) -> Self {
        self.job.resource_pool = pool.to_string();
        self
    }

    pub fn with_dependencies(mut self, dependencies: &[&str]) -> Self {
        self.job.dependency_jobs = dependencies.iter().map(|d| d.to_string()).collect();
        self.job.dependencies_met = dependencies.is_empty();
        self
    }

    pub fn completed_at(mut self, completed_time: DateTime<Utc>) -> Self {
        self.job.status = JobStatus::Completed;
        self.job.started_time = Some(completed_time - Duration::minutes(5));
        self.job.completed_time = Some(completed_time);
        self
    }

    pub fn build(self) -> ScheduledJob {
        self.job
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for ReportRequest
pub struct ReportRequestBuilder {
    request: ReportRequest,
}

impl ReportRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: ReportRequest {
                report_id: Uuid::new_v4().to_string(),
                report_type: ReportType::Finrep,
                format: ReportFormat::Xbrl,
                reporting_period: "2024-Q1".to_string(),
                institution_id: "INST_001".to_string(),
                jurisdiction: "EU".to_string(),
                template_version: "3.2.0".to_string(),
                data_sources: vec!["database".to_string()],
                delivery_method: "SFTP".to_string(),
                deadline: fixed_time() + Duration::hours(2),
                priority: Priority::Medium,
            },
        }
    }

    pub fn with_report_id(mut self, report_id: &str) -> Self {
        self.request.report_id = report_id.to_string();
        self
    }

    pub fn with_report_type(mut self, report_type: ReportType) -> Self {
        self.request.report_type = report_type;
        self
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.request.format = format;
        self
    }

    pub fn with_period(mut self, reporting_period: &str) -> Self {
        self.request.reporting_period = reporting_period.to_string();
        self
    }

    pub fn with_institution(mut self, institution_id: &str) -> Self {
        self.request.institution_id = institution_id.to_string();
        self
    }

    pub fn with_data_sources(mut self, data_sources: &[&str]) -> Self {
        self.request.data_sources = data_sources.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> ReportRequest {
        self.request
    }
}

impl Default for ReportRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn object(value: serde_json::Value) -> ReportData {
    value.as_object().cloned().unwrap_or_default()
}

/// 机构基本信息
pub fn institution_profile() -> ReportData {
    object(json!({
        "institution_name": "Test Bank AG",
        "institution_code": "TESTBANK01",
        "jurisdiction": "EU",
        "currency": "EUR",
    }))
}

/// 资产 = 负债 + 权益 的FINREP数据
pub fn balanced_finrep_figures() -> ReportData {
    object(json!({
        "total_assets": 1_000_000_000.0,
        "total_liabilities": 900_000_000.0,
        "total_equity": 100_000_000.0,
        "total_operating_income": 50_000_000.0,
        "total_operating_expenses": 30_000_000.0,
        "profit_before_tax": 20_000_000.0,
        "net_profit": 15_000_000.0,
    }))
}

pub fn corep_figures() -> ReportData {
    object(json!({
        "tier1_capital": 80_000_000.0,
        "tier2_capital": 20_000_000.0,
        "total_capital": 100_000_000.0,
        "risk_weighted_assets": 600_000_000.0,
        "capital_ratio": 16.67,
        "leverage_ratio": 5.2,
        "liquidity_coverage_ratio": 145.0,
    }))
}

pub fn dora_figures() -> ReportData {
    object(json!({
        "ict_incidents_count": 12,
        "major_incidents_count": 1,
        "third_party_providers_count": 40,
        "critical_services_count": 8,
        "business_continuity_tests": 4,
        "recovery_time_objective": 4.0,
        "recovery_point_objective": 1.0,
    }))
}
