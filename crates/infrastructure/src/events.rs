//! 进程内事件总线
//!
//! 调度事件序列化为JSON后通过 tokio 广播通道分发，订阅者按主题过滤。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regreport_config::EventsConfig;
use regreport_core::{EventPublisher, EventTopic, ReportingError, ReportingResult, SchedulerEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, instrument};

/// 发布到总线上的事件信封
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub topic: String,
    pub event_type: String,
    /// 报告计划ID或作业ID
    pub key: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    config: EventsConfig,
    sender: broadcast::Sender<EventEnvelope>,
}

impl BroadcastEventPublisher {
    pub fn new(config: EventsConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self { config, sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    fn topic_name(&self, topic: EventTopic) -> &str {
        match topic {
            EventTopic::Scheduler => &self.config.scheduler_topic,
            EventTopic::Jobs => &self.config.job_topic,
        }
    }

    fn envelope(&self, event: &SchedulerEvent) -> ReportingResult<EventEnvelope> {
        Ok(EventEnvelope {
            topic: self.topic_name(event.topic()).to_string(),
            event_type: event.event_type().to_string(),
            key: event.aggregate_id().to_string(),
            payload: serde_json::to_value(event)?,
            published_at: Utc::now(),
        })
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    #[instrument(skip(self, event), fields(event_type = event.event_type(), key = event.aggregate_id()))]
    async fn publish(&self, event: &SchedulerEvent) -> ReportingResult<()> {
        if !self.config.enabled {
            debug!("事件发布已禁用，丢弃 {}", event.event_type());
            return Ok(());
        }

        let envelope = self.envelope(event)?;
        match self.sender.send(envelope) {
            Ok(receivers) => {
                debug!("事件 {} 已发送给 {} 个订阅者", event.event_type(), receivers);
                Ok(())
            }
            Err(broadcast::error::SendError(envelope)) if self.sender.receiver_count() == 0 => {
                debug!("没有订阅者，事件 {} 未投递", envelope.event_type);
                Ok(())
            }
            Err(e) => Err(ReportingError::EventPublish(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use regreport_core::{JobStatus, ReportType};

    fn job_failed() -> SchedulerEvent {
        SchedulerEvent::JobFailed {
            job_id: "job-1".to_string(),
            schedule_id: "finrep_q".to_string(),
            report_type: ReportType::Finrep,
            retry_count: 3,
            error: "disk full".to_string(),
            status: JobStatus::Failed,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 28, 9, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_publish_routes_to_topic() {
        let publisher = BroadcastEventPublisher::new(EventsConfig::default());
        let mut rx = publisher.subscribe();

        publisher.publish(&job_failed()).await.unwrap();

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.topic, "report.jobs");
        assert_eq!(envelope.event_type, "job.failed");
        assert_eq!(envelope.key, "job-1");
        assert_eq!(envelope.payload["retry_count"], 3);
        assert_eq!(envelope.payload["status"], "FAILED");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = BroadcastEventPublisher::new(EventsConfig::default());
        assert!(publisher.publish(&job_failed()).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_publisher_drops_events() {
        let config = EventsConfig {
            enabled: false,
            ..EventsConfig::default()
        };
        let publisher = BroadcastEventPublisher::new(config);
        let mut rx = publisher.subscribe();

        publisher.publish(&job_failed()).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
