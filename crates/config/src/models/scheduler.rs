use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 报告调度器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 计划检查间隔（秒）
    pub schedule_check_interval_seconds: u64,
    /// 依赖解析间隔（秒）
    pub dependency_check_interval_seconds: u64,
    /// 资源监控间隔（秒）
    pub resource_monitor_interval_seconds: u64,
    /// 清理间隔（秒）
    pub cleanup_interval_seconds: u64,
    /// 队列为空时执行器的轮询间隔（毫秒）
    pub executor_poll_interval_millis: u64,
    /// 资源不足时重新入队的延迟（秒）
    pub resource_retry_delay_seconds: i64,
    /// 依赖未满足时重新入队的延迟（秒）
    pub dependency_retry_delay_seconds: i64,
    /// 依赖解析扫描的前瞻窗口（分钟）
    pub dependency_lookahead_minutes: i64,
    /// 等待依赖的最长时间（分钟），超时后作业失败
    pub dependency_timeout_minutes: i64,
    pub max_retry_attempts: u32,
    /// 默认重试基础延迟（分钟）
    pub default_retry_delay_minutes: i64,
    pub job_timeout_minutes: i64,
    pub cleanup_completed_jobs_days: i64,
    /// 计划表为空时写入默认报告计划
    pub seed_default_schedules: bool,
    pub default_institution_id: String,
    pub default_jurisdiction: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule_check_interval_seconds: 60,
            dependency_check_interval_seconds: 300,
            resource_monitor_interval_seconds: 120,
            cleanup_interval_seconds: 3600,
            executor_poll_interval_millis: 500,
            resource_retry_delay_seconds: 30,
            dependency_retry_delay_seconds: 60,
            dependency_lookahead_minutes: 60,
            dependency_timeout_minutes: 1440,
            max_retry_attempts: 3,
            default_retry_delay_minutes: 30,
            job_timeout_minutes: 120,
            cleanup_completed_jobs_days: 30,
            seed_default_schedules: true,
            default_institution_id: "INST_001".to_string(),
            default_jurisdiction: "EU".to_string(),
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_interval_seconds(
            self.schedule_check_interval_seconds,
            "scheduler.schedule_check_interval_seconds",
        )?;
        ValidationUtils::validate_interval_seconds(
            self.dependency_check_interval_seconds,
            "scheduler.dependency_check_interval_seconds",
        )?;
        ValidationUtils::validate_interval_seconds(
            self.resource_monitor_interval_seconds,
            "scheduler.resource_monitor_interval_seconds",
        )?;
        ValidationUtils::validate_interval_seconds(
            self.cleanup_interval_seconds,
            "scheduler.cleanup_interval_seconds",
        )?;
        if self.executor_poll_interval_millis == 0 {
            return Err(crate::ConfigError::Validation(
                "scheduler.executor_poll_interval_millis must be greater than 0".to_string(),
            ));
        }
        ValidationUtils::validate_positive(
            self.resource_retry_delay_seconds,
            "scheduler.resource_retry_delay_seconds",
        )?;
        ValidationUtils::validate_positive(
            self.dependency_retry_delay_seconds,
            "scheduler.dependency_retry_delay_seconds",
        )?;
        ValidationUtils::validate_positive(
            self.dependency_timeout_minutes,
            "scheduler.dependency_timeout_minutes",
        )?;
        ValidationUtils::validate_positive(
            self.default_retry_delay_minutes,
            "scheduler.default_retry_delay_minutes",
        )?;
        ValidationUtils::validate_positive(self.job_timeout_minutes, "scheduler.job_timeout_minutes")?;
        ValidationUtils::validate_positive(
            self.cleanup_completed_jobs_days,
            "scheduler.cleanup_completed_jobs_days",
        )?;
        if self.max_retry_attempts > 10 {
            return Err(crate::ConfigError::Validation(
                "scheduler.max_retry_attempts must be less than or equal to 10".to_string(),
            ));
        }
        if self.seed_default_schedules {
            ValidationUtils::validate_not_empty(
                &self.default_institution_id,
                "scheduler.default_institution_id",
            )?;
        }
        Ok(())
    }
}

/// 各报告类别的并发上限
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResourcePoolsConfig {
    pub finrep: usize,
    pub corep: usize,
    pub dora: usize,
    pub general: usize,
}

impl Default for ResourcePoolsConfig {
    fn default() -> Self {
        Self {
            finrep: 3,
            corep: 3,
            dora: 2,
            general: 5,
        }
    }
}

impl ResourcePoolsConfig {
    /// 资源池名称与并发上限
    pub fn pools(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("finrep", self.finrep),
            ("corep", self.corep),
            ("dora", self.dora),
            ("general", self.general),
        ]
    }
}

impl ConfigValidator for ResourcePoolsConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        for (name, limit) in self.pools() {
            ValidationUtils::validate_count(limit, &format!("resource_pools.{name}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.schedule_check_interval_seconds, 60);
        assert_eq!(config.dependency_timeout_minutes, 1440);
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.cleanup_completed_jobs_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheduler_config_validation() {
        let mut config = SchedulerConfig::default();
        config.schedule_check_interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = SchedulerConfig::default();
        config.default_institution_id = String::new();
        assert!(config.validate().is_err());

        config.seed_default_schedules = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_resource_pools_validation() {
        let pools = ResourcePoolsConfig::default();
        assert!(pools.validate().is_ok());
        assert_eq!(pools.pools().len(), 4);

        let invalid = ResourcePoolsConfig {
            dora: 0,
            ..ResourcePoolsConfig::default()
        };
        assert!(invalid.validate().is_err());
    }
}
