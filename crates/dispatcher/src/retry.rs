use chrono::{DateTime, Duration, Utc};
use regreport_core::{ReportResult, ScheduledJob};

/// 一次失败后的处理决定
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// 第 `attempt` 次重试，在 `ready_at` 之后重新入队
    Retry {
        attempt: u32,
        ready_at: DateTime<Utc>,
    },
    /// 终止为FAILED
    Fail,
}

/// 线性退避：第n次重试延迟 n × base_delay_minutes
pub fn retry_delay(attempt: u32, base_delay_minutes: i64) -> Duration {
    Duration::minutes(i64::from(attempt) * base_delay_minutes)
}

/// 根据失败结果和作业的重试计数决定是否重试
///
/// 只有瞬时IO类失败会重试；模板缺失与验证失败直接终止。
/// 退避基数取调度器配置的 `default_retry_delay_minutes`（默认30分钟），
/// 与计划上记录的 `retry_delay_minutes` 无关。
pub fn decide(
    job: &ScheduledJob,
    result: &ReportResult,
    now: DateTime<Utc>,
    base_delay_minutes: i64,
) -> RetryDecision {
    if !result.is_retryable() || !job.can_retry() {
        return RetryDecision::Fail;
    }
    let attempt = job.retry_count + 1;
    RetryDecision::Retry {
        attempt,
        ready_at: now + retry_delay(attempt, base_delay_minutes),
    }
}
