//! 报告调度
//!
//! 报告计划按CRON触发，生成的作业经过优先级队列、依赖检查和资源池后交给
//! 报告生成服务执行，失败时按线性退避重试。

pub mod cron_utils;
pub mod dependency_checker;
pub mod queue;
pub mod resource_pool;
pub mod retry;
pub mod runner;
pub mod scheduler;

pub use cron_utils::{next_fire_time, CronScheduler};
pub use dependency_checker::{DependencyCheckResult, DependencyChecker};
pub use queue::{JobQueue, QueuedJob};
pub use resource_pool::{ResourceLease, ResourceManager, ResourcePool, GENERAL_POOL};
pub use retry::RetryDecision;
pub use scheduler::{
    CleanupSummary, DeferReason, DispatchOutcome, ReadyJob, ReportScheduler, SchedulerMetrics,
    SchedulerServices,
};
