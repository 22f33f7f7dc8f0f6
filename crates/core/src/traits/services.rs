use async_trait::async_trait;

use crate::errors::ReportingResult;
use crate::events::SchedulerEvent;
use crate::models::{ReportRequest, ReportResult};

/// 事件发布接口
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &SchedulerEvent) -> ReportingResult<()>;
}

/// 调度器视角下的报告生成服务
///
/// `generate_report` 不返回错误：所有失败都体现在状态为FAILED的 [`ReportResult`] 中。
#[async_trait]
pub trait ReportGenerationService: Send + Sync {
    async fn generate_report(&self, request: ReportRequest) -> ReportResult;

    /// 清理超过保留期的报告文件，返回清理数量
    async fn cleanup_old_reports(&self) -> ReportingResult<usize> {
        Ok(0)
    }
}
