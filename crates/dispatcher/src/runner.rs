//! 调度器后台循环
//!
//! 计划检查、作业执行、依赖解析、资源监控和清理各自是一个tokio任务，
//! 通过调度器的广播通道统一停止。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use regreport_infrastructure::StructuredLogger;

use crate::scheduler::{DispatchOutcome, ReportScheduler};

impl ReportScheduler {
    /// 订阅停止信号
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// 启动所有后台循环，返回各任务句柄
    pub async fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        if !self.config.enabled {
            info!("调度器已禁用，不启动后台任务");
            return Vec::new();
        }

        if let Err(e) = self.recover_pending_jobs().await {
            StructuredLogger::log_system_error("scheduler", "recover_pending_jobs", &e);
        }

        let config = &self.config;
        let handles = vec![
            self.spawn_loop(
                "schedule_monitor",
                StdDuration::from_secs(config.schedule_check_interval_seconds),
                |scheduler| async move {
                    if let Err(e) = scheduler.check_schedules().await {
                        StructuredLogger::log_system_error("scheduler", "check_schedules", &e);
                    }
                },
            ),
            self.spawn_loop(
                "job_executor",
                StdDuration::from_millis(config.executor_poll_interval_millis),
                |scheduler| async move { scheduler.drain_queue().await },
            ),
            self.spawn_loop(
                "dependency_resolver",
                StdDuration::from_secs(config.dependency_check_interval_seconds),
                |scheduler| async move {
                    if let Err(e) = scheduler.resolve_dependencies().await {
                        StructuredLogger::log_system_error("scheduler", "resolve_dependencies", &e);
                    }
                },
            ),
            self.spawn_loop(
                "resource_monitor",
                StdDuration::from_secs(config.resource_monitor_interval_seconds),
                |scheduler| async move { scheduler.monitor_resources() },
            ),
            self.spawn_loop(
                "cleanup",
                StdDuration::from_secs(config.cleanup_interval_seconds),
                |scheduler| async move {
                    if let Err(e) = scheduler.cleanup().await {
                        StructuredLogger::log_system_error("scheduler", "cleanup", &e);
                    }
                },
            ),
        ];

        info!("报告调度器已启动，{} 个后台任务", handles.len());
        handles
    }

    fn spawn_loop<F, Fut>(self: &Arc<Self>, name: &'static str, period: StdDuration, tick: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let scheduler = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("后台任务 {} 已启动，间隔 {:?}", name, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick(Arc::clone(&scheduler)).await,
                    _ = shutdown_rx.recv() => {
                        info!("后台任务 {} 收到停止信号", name);
                        break;
                    }
                }
            }
        })
    }

    /// 取出所有就绪作业，每个可执行作业在独立任务中运行
    async fn drain_queue(self: Arc<Self>) {
        loop {
            match self.dispatch_next().await {
                Ok(DispatchOutcome::Idle) => break,
                Ok(DispatchOutcome::Ready(ready)) => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        let job_id = ready.job.job_id.clone();
                        if let Err(e) = scheduler.execute_job(*ready).await {
                            error!("作业 {} 执行后状态更新失败: {}", job_id, e);
                        }
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    StructuredLogger::log_system_error("scheduler", "dispatch_next", &e);
                    break;
                }
            }
        }
    }

    /// 发送停止信号并记录仍在运行的作业
    pub fn shutdown(&self) {
        info!("报告调度器正在停止");
        if self.shutdown_tx.send(()).is_err() {
            debug!("没有正在运行的后台任务");
        }

        let in_flight = self.in_flight_jobs();
        if in_flight.is_empty() {
            info!("没有正在运行的作业");
        }
        for (job_id, report_type, started_at) in in_flight {
            warn!(
                job.id = %job_id,
                job.report_type = report_type.as_str(),
                job.started_at = %started_at,
                "停止时作业仍在运行"
            );
        }
    }
}
