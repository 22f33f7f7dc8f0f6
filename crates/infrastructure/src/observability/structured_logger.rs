//! Structured logging utilities
//!
//! 报告计划与作业生命周期的规范日志事件，字段名在各组件间保持一致。

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_schedule_created(
        schedule_id: &str,
        report_type: &str,
        cron_expression: &str,
        next_run_time: Option<DateTime<Utc>>,
    ) {
        info!(
            event = "schedule_created",
            schedule.id = schedule_id,
            schedule.report_type = report_type,
            schedule.cron = cron_expression,
            schedule.next_run_time = ?next_run_time,
            "Report schedule created"
        );
    }

    pub fn log_job_created(job_id: &str, schedule_id: &str, report_type: &str, period: &str) {
        info!(
            event = "job_created",
            job.id = job_id,
            schedule.id = schedule_id,
            job.report_type = report_type,
            job.reporting_period = period,
            "Scheduled job created"
        );
    }

    pub fn log_job_started(job_id: &str, report_type: &str, pool: &str, retry_count: u32) {
        info!(
            event = "job_started",
            job.id = job_id,
            job.report_type = report_type,
            job.resource_pool = pool,
            job.retry_count = retry_count,
            "Job execution started"
        );
    }

    pub fn log_job_completed(
        job_id: &str,
        report_type: &str,
        duration_seconds: Option<f64>,
        file_path: Option<&str>,
    ) {
        info!(
            event = "job_completed",
            job.id = job_id,
            job.report_type = report_type,
            job.duration_seconds = duration_seconds,
            report.file_path = file_path,
            "Job completed"
        );
    }

    pub fn log_job_retrying(job_id: &str, attempt: u32, next_attempt_at: DateTime<Utc>, error: &str) {
        warn!(
            event = "job_retrying",
            job.id = job_id,
            job.retry_count = attempt,
            job.next_attempt_at = %next_attempt_at,
            error.message = error,
            "Job failed, retry scheduled"
        );
    }

    pub fn log_job_failed(job_id: &str, report_type: &str, retry_count: u32, error: &str) {
        error!(
            event = "job_failed",
            job.id = job_id,
            job.report_type = report_type,
            job.retry_count = retry_count,
            error.message = error,
            "Job failed"
        );
    }

    pub fn log_job_cancelled(job_id: &str, previous_status: &str) {
        info!(
            event = "job_cancelled",
            job.id = job_id,
            job.previous_status = previous_status,
            "Job cancelled"
        );
    }

    pub fn log_dependency_check(job_id: &str, dependencies_met: bool, reason: Option<&str>) {
        if dependencies_met {
            debug!(
                event = "dependency_check_passed",
                job.id = job_id,
                "Job dependencies satisfied"
            );
        } else {
            debug!(
                event = "dependency_check_failed",
                job.id = job_id,
                dependency.reason = reason.unwrap_or("Unknown reason"),
                "Job dependencies not satisfied"
            );
        }
    }

    pub fn log_resource_contention(job_id: &str, pool: &str) {
        debug!(
            event = "resource_contention",
            job.id = job_id,
            resource.pool = pool,
            "Resource pool saturated, job requeued"
        );
    }

    /// Log system error
    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            error.component = component,
            error.operation = operation,
            error.message = %error,
            "System error occurred"
        );
    }
}
