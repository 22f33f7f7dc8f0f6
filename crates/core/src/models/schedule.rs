use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::report::{ReportFormat, ReportType};

/// 作业优先级，数值越大越先执行
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Priority {
    #[serde(rename = "LOW")]
    Low = 1,
    #[serde(rename = "MEDIUM")]
    #[default]
    Medium = 2,
    #[serde(rename = "HIGH")]
    High = 3,
    #[serde(rename = "CRITICAL")]
    Critical = 4,
    #[serde(rename = "EMERGENCY")]
    Emergency = 5,
}

impl Priority {
    pub fn value(&self) -> i32 {
        *self as i32
    }

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(Priority::Low),
            2 => Some(Priority::Medium),
            3 => Some(Priority::High),
            4 => Some(Priority::Critical),
            5 => Some(Priority::Emergency),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
            Priority::Emergency => "EMERGENCY",
        };
        f.write_str(name)
    }
}

/// 报告计划状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScheduleStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "DISABLED")]
    Disabled,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "ACTIVE",
            ScheduleStatus::Paused => "PAUSED",
            ScheduleStatus::Disabled => "DISABLED",
            ScheduleStatus::Completed => "COMPLETED",
            ScheduleStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(ScheduleStatus::Active),
            "PAUSED" => Ok(ScheduleStatus::Paused),
            "DISABLED" => Ok(ScheduleStatus::Disabled),
            "COMPLETED" => Ok(ScheduleStatus::Completed),
            "FAILED" => Ok(ScheduleStatus::Failed),
            _ => Err(format!("Invalid schedule status: {s}")),
        }
    }
}

impl_sqlite_text_enum!(ScheduleStatus);

/// 资源需求，可覆盖按报告类型选择的默认资源池
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRequirements {
    pub pool: Option<String>,
}

/// 周期性报告计划
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleDefinition {
    pub schedule_id: String,
    pub report_type: ReportType,
    pub format: ReportFormat,
    pub institution_id: String,
    pub jurisdiction: String,
    pub cron_expression: String,
    pub priority: Priority,
    pub status: ScheduleStatus,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_run_time: Option<DateTime<Utc>>,
    /// 依赖的报告计划ID
    pub dependencies: Vec<String>,
    pub max_retries: u32,
    /// 重试基础延迟（分钟）
    pub retry_delay_minutes: i64,
    /// 超时（分钟），仅作为截止时间传递
    pub timeout_minutes: i64,
    pub resource_requirements: ResourceRequirements,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleDefinition {
    /// 创建新的报告计划，其余字段使用默认值
    pub fn new(
        schedule_id: impl Into<String>,
        report_type: ReportType,
        institution_id: impl Into<String>,
        jurisdiction: impl Into<String>,
        cron_expression: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            schedule_id: schedule_id.into(),
            report_type,
            format: report_type.default_format(),
            institution_id: institution_id.into(),
            jurisdiction: jurisdiction.into(),
            cron_expression: cron_expression.into(),
            priority: Priority::Medium,
            status: ScheduleStatus::Active,
            next_run_time: None,
            last_run_time: None,
            dependencies: Vec::new(),
            max_retries: 3,
            retry_delay_minutes: 30,
            timeout_minutes: 120,
            resource_requirements: ResourceRequirements::default(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay_minutes: i64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_minutes = retry_delay_minutes;
        self
    }

    pub fn with_timeout_minutes(mut self, timeout_minutes: i64) -> Self {
        self.timeout_minutes = timeout_minutes;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_resource_pool(mut self, pool: impl Into<String>) -> Self {
        self.resource_requirements.pool = Some(pool.into());
        self
    }

    /// 作业使用的资源池
    pub fn resource_pool(&self) -> String {
        self.resource_requirements
            .pool
            .clone()
            .unwrap_or_else(|| self.report_type.resource_pool().to_string())
    }

    /// 在给定时刻是否需要触发
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Active
            && self.next_run_time.map(|next| next <= now).unwrap_or(false)
    }

    pub fn entity_description(&self) -> String {
        format!(
            "报告计划 '{}' ({} / {})",
            self.schedule_id, self.report_type, self.institution_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High > Priority::Low);
        assert!(Priority::Emergency > Priority::Critical);
        assert_eq!(Priority::from_value(3), Some(Priority::High));
        assert_eq!(Priority::from_value(9), None);
        assert_eq!(Priority::Critical.value(), 4);
    }

    #[test]
    fn test_resource_pool_override() {
        let schedule = ScheduleDefinition::new("s1", ReportType::DoraIct, "INST_001", "EU", "0 8 15 1 *");
        assert_eq!(schedule.resource_pool(), "dora");
        assert_eq!(schedule.format, ReportFormat::Json);

        let schedule = schedule.with_resource_pool("general");
        assert_eq!(schedule.resource_pool(), "general");
    }

    #[test]
    fn test_is_due_only_when_active() {
        let now = Utc.with_ymd_and_hms(2024, 6, 28, 9, 0, 0).unwrap();
        let mut schedule =
            ScheduleDefinition::new("s1", ReportType::Finrep, "INST_001", "EU", "0 9 28 3,6,9,12 *");
        assert!(!schedule.is_due(now));

        schedule.next_run_time = Some(now - Duration::minutes(1));
        assert!(schedule.is_due(now));

        schedule.status = ScheduleStatus::Paused;
        assert!(!schedule.is_due(now));
    }
}
