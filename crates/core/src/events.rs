//! 调度事件
//!
//! 报告计划和作业的生命周期事件，通过 [`crate::EventPublisher`] 发布到消息总线

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{JobStatus, Priority, ReportType};

/// 事件所属的主题类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTopic {
    Scheduler,
    Jobs,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type")]
pub enum SchedulerEvent {
    #[serde(rename = "schedule.created")]
    ScheduleCreated {
        schedule_id: String,
        report_type: ReportType,
        institution_id: String,
        cron_expression: String,
        next_run_time: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "job.created")]
    JobCreated {
        job_id: String,
        schedule_id: String,
        report_type: ReportType,
        reporting_period: String,
        scheduled_time: DateTime<Utc>,
        priority: Priority,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "job.completed")]
    JobCompleted {
        job_id: String,
        schedule_id: String,
        report_type: ReportType,
        report_id: String,
        duration_seconds: Option<f64>,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "job.retrying")]
    JobRetrying {
        job_id: String,
        schedule_id: String,
        report_type: ReportType,
        retry_count: u32,
        next_attempt_at: DateTime<Utc>,
        error: String,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "job.failed")]
    JobFailed {
        job_id: String,
        schedule_id: String,
        report_type: ReportType,
        retry_count: u32,
        error: String,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "job.cancelled")]
    JobCancelled {
        job_id: String,
        schedule_id: String,
        report_type: ReportType,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
}

impl SchedulerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SchedulerEvent::ScheduleCreated { .. } => "schedule.created",
            SchedulerEvent::JobCreated { .. } => "job.created",
            SchedulerEvent::JobCompleted { .. } => "job.completed",
            SchedulerEvent::JobRetrying { .. } => "job.retrying",
            SchedulerEvent::JobFailed { .. } => "job.failed",
            SchedulerEvent::JobCancelled { .. } => "job.cancelled",
        }
    }

    pub fn topic(&self) -> EventTopic {
        match self {
            SchedulerEvent::ScheduleCreated { .. } => EventTopic::Scheduler,
            _ => EventTopic::Jobs,
        }
    }

    /// 事件关联的聚合ID（报告计划ID或作业ID）
    pub fn aggregate_id(&self) -> &str {
        match self {
            SchedulerEvent::ScheduleCreated { schedule_id, .. } => schedule_id,
            SchedulerEvent::JobCreated { job_id, .. }
            | SchedulerEvent::JobCompleted { job_id, .. }
            | SchedulerEvent::JobRetrying { job_id, .. }
            | SchedulerEvent::JobFailed { job_id, .. }
            | SchedulerEvent::JobCancelled { job_id, .. } => job_id,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SchedulerEvent::ScheduleCreated { timestamp, .. }
            | SchedulerEvent::JobCreated { timestamp, .. }
            | SchedulerEvent::JobCompleted { timestamp, .. }
            | SchedulerEvent::JobRetrying { timestamp, .. }
            | SchedulerEvent::JobFailed { timestamp, .. }
            | SchedulerEvent::JobCancelled { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_serialization_carries_type_tag() {
        let at = Utc.with_ymd_and_hms(2024, 6, 28, 9, 0, 0).unwrap();
        let event = SchedulerEvent::JobFailed {
            job_id: "job-1".to_string(),
            schedule_id: "finrep_q".to_string(),
            report_type: ReportType::Finrep,
            retry_count: 3,
            error: "disk full".to_string(),
            status: JobStatus::Failed,
            timestamp: at,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event_type"], "job.failed");
        assert_eq!(value["report_type"], "FINREP");
        assert_eq!(value["status"], "FAILED");
        assert_eq!(event.topic(), EventTopic::Jobs);
        assert_eq!(event.aggregate_id(), "job-1");

        let parsed: SchedulerEvent = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }
}
