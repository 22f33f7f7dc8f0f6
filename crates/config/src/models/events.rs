use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 调度事件发布配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    pub enabled: bool,
    pub scheduler_topic: String,
    pub job_topic: String,
    /// 广播通道容量
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scheduler_topic: "report.scheduler".to_string(),
            job_topic: "report.jobs".to_string(),
            channel_capacity: 1024,
        }
    }
}

impl ConfigValidator for EventsConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.scheduler_topic, "events.scheduler_topic")?;
        ValidationUtils::validate_not_empty(&self.job_topic, "events.job_topic")?;
        ValidationUtils::validate_count(self.channel_capacity, "events.channel_capacity")?;
        Ok(())
    }
}
