//! 报告调度器
//!
//! 负责报告计划的触发、作业的排队与执行、依赖与资源检查、重试和清理。
//! 后台循环见 [`crate::runner`]，这里只包含可单独调用的每一步操作。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use regreport_config::{AppConfig, SchedulerConfig};
use regreport_core::{
    Clock, EventPublisher, JobRepository, JobResultData, JobStatus, Priority,
    ReportGenerationService, ReportRequest, ReportType, ReportingError, ReportingPeriod,
    ReportingResult, ResourceAllocation, ResourcePoolSnapshot, ScheduleDefinition,
    ScheduleRepository, ScheduleStatus, ScheduledJob, SchedulerEvent,
};
use regreport_infrastructure::StructuredLogger;

use crate::cron_utils::CronScheduler;
use crate::dependency_checker::{dependency_wait_expired, DependencyChecker};
use crate::queue::{JobQueue, QueuedJob};
use crate::resource_pool::{ResourceLease, ResourceManager};
use crate::retry::{self, RetryDecision};

/// 调度器依赖的外部服务
#[derive(Clone)]
pub struct SchedulerServices {
    pub schedules: Arc<dyn ScheduleRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub generator: Arc<dyn ReportGenerationService>,
    pub events: Arc<dyn EventPublisher>,
    pub clock: Arc<dyn Clock>,
}

/// 调度器指标快照
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SchedulerMetrics {
    pub schedules_active: usize,
    pub jobs_scheduled: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub jobs_cancelled: u64,
    /// 成功作业的平均耗时（秒）
    pub avg_job_duration: f64,
    pub dependency_violations: u64,
    pub resource_contentions: u64,
    pub success_rate: f64,
    pub active_jobs: usize,
    pub queue_size: usize,
    pub resource_pools: Vec<ResourcePoolSnapshot>,
}

#[derive(Debug, Default)]
struct Counters {
    jobs_scheduled: u64,
    jobs_completed: u64,
    jobs_failed: u64,
    jobs_retried: u64,
    jobs_cancelled: u64,
    dependency_violations: u64,
    avg_job_duration: f64,
}

#[derive(Debug, Clone)]
struct ActiveJob {
    report_type: ReportType,
    started_at: DateTime<Utc>,
}

/// 作业暂缓的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    DependenciesUnmet,
    ResourcesExhausted,
}

/// 已分配资源、标记为RUNNING的作业
#[derive(Debug)]
pub struct ReadyJob {
    pub job: ScheduledJob,
    pub lease: ResourceLease,
}

/// 一次出队的结果
#[derive(Debug)]
pub enum DispatchOutcome {
    /// 没有就绪作业
    Idle,
    /// 作业已被重新延迟入队
    Deferred { job_id: String, reason: DeferReason },
    /// 作业不存在或已不可运行（例如已取消）
    Skipped { job_id: String },
    /// 依赖等待超时，作业已终止
    Failed(ScheduledJob),
    Ready(Box<ReadyJob>),
}

/// 一次清理的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub jobs_purged: u64,
    pub reports_purged: usize,
}

pub struct ReportScheduler {
    pub(crate) config: SchedulerConfig,
    template_version: String,
    delivery_method: String,
    schedules: Arc<dyn ScheduleRepository>,
    jobs: Arc<dyn JobRepository>,
    generator: Arc<dyn ReportGenerationService>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    queue: JobQueue,
    resources: ResourceManager,
    dependency_checker: DependencyChecker,
    active_jobs: Mutex<HashMap<String, ActiveJob>>,
    /// 写入失败、等待下一次出队时补写的作业状态
    unsaved_jobs: Mutex<HashMap<String, ScheduledJob>>,
    counters: Mutex<Counters>,
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ReportScheduler {
    pub fn new(config: &AppConfig, services: SchedulerServices) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config: config.scheduler.clone(),
            template_version: config.reporting.template_version.clone(),
            delivery_method: config.reporting.delivery_method.clone(),
            dependency_checker: DependencyChecker::new(Arc::clone(&services.jobs)),
            schedules: services.schedules,
            jobs: services.jobs,
            generator: services.generator,
            events: services.events,
            clock: services.clock,
            queue: JobQueue::new(),
            resources: ResourceManager::from_config(&config.resource_pools),
            active_jobs: Mutex::new(HashMap::new()),
            unsaved_jobs: Mutex::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
            shutdown_tx,
        }
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// 保存作业状态；失败时保留内存中的状态并在 `retry_at` 重新入队，出队时补写
    async fn save_or_requeue(&self, job: &ScheduledJob, retry_at: DateTime<Utc>) -> bool {
        match self.jobs.update(job).await {
            Ok(()) => true,
            Err(e) => {
                StructuredLogger::log_system_error("scheduler", "save_job", &e);
                lock(&self.unsaved_jobs).insert(job.job_id.clone(), job.clone());
                self.queue.push_delayed(QueuedJob::from(job), retry_at);
                false
            }
        }
    }

    /// 出队时先补写之前保存失败的状态
    async fn flush_unsaved(&self, job_id: &str) -> ReportingResult<()> {
        let Some(job) = lock(&self.unsaved_jobs).remove(job_id) else {
            return Ok(());
        };
        if let Err(e) = self.jobs.update(&job).await {
            lock(&self.unsaved_jobs).insert(job.job_id.clone(), job);
            return Err(e);
        }
        info!("作业 {} 的 {} 状态已补写", job.job_id, job.status.as_str());
        Ok(())
    }

    async fn publish(&self, event: SchedulerEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!("事件 {} 发布失败: {}", event.event_type(), e);
        }
    }

    // ---- 报告计划 ----

    /// 校验CRON表达式，计算首次执行时间并保存报告计划
    #[instrument(skip(self, schedule), fields(schedule.id = %schedule.schedule_id))]
    pub async fn create_schedule(
        &self,
        mut schedule: ScheduleDefinition,
    ) -> ReportingResult<ScheduleDefinition> {
        let cron = CronScheduler::new(&schedule.cron_expression)?;
        let now = self.clock.now();

        schedule.max_retries = schedule.max_retries.min(self.config.max_retry_attempts);
        if schedule.retry_delay_minutes <= 0 {
            schedule.retry_delay_minutes = self.config.default_retry_delay_minutes;
        }
        if schedule.timeout_minutes <= 0 {
            schedule.timeout_minutes = self.config.job_timeout_minutes;
        }
        schedule.next_run_time = cron.next_execution_time(now);
        schedule.created_at = now;
        schedule.updated_at = now;

        self.schedules.create(&schedule).await?;

        StructuredLogger::log_schedule_created(
            &schedule.schedule_id,
            schedule.report_type.as_str(),
            &schedule.cron_expression,
            schedule.next_run_time,
        );
        self.publish(SchedulerEvent::ScheduleCreated {
            schedule_id: schedule.schedule_id.clone(),
            report_type: schedule.report_type,
            institution_id: schedule.institution_id.clone(),
            cron_expression: schedule.cron_expression.clone(),
            next_run_time: schedule.next_run_time,
            timestamp: now,
        })
        .await;

        Ok(schedule)
    }

    /// 默认的三个监管报告计划
    pub fn default_schedules(&self) -> Vec<ScheduleDefinition> {
        let institution = &self.config.default_institution_id;
        let jurisdiction = &self.config.default_jurisdiction;
        let schedule = |report_type, cron: &str| {
            ScheduleDefinition::new(
                Uuid::new_v4().to_string(),
                report_type,
                institution.clone(),
                jurisdiction.clone(),
                cron,
            )
        };

        vec![
            schedule(ReportType::Finrep, "0 9 28 3,6,9,12 *")
                .with_priority(Priority::High)
                .with_retry_policy(3, 60)
                .with_timeout_minutes(180),
            schedule(ReportType::Corep, "0 10 28 3,6,9,12 *")
                .with_priority(Priority::High)
                .with_retry_policy(3, 60)
                .with_timeout_minutes(180),
            schedule(ReportType::DoraIct, "0 8 15 1 *")
                .with_priority(Priority::Medium)
                .with_retry_policy(2, 120)
                .with_timeout_minutes(240),
        ]
    }

    /// 存储为空时写入默认报告计划，返回写入数量
    pub async fn seed_default_schedules(&self) -> ReportingResult<usize> {
        let existing = self.schedules.count().await?;
        if existing > 0 {
            info!("已存在 {} 个报告计划，跳过默认计划初始化", existing);
            return Ok(0);
        }

        let mut created = 0;
        for schedule in self.default_schedules() {
            self.create_schedule(schedule).await?;
            created += 1;
        }
        info!("已初始化 {} 个默认报告计划", created);
        Ok(created)
    }

    /// 暂停、恢复或停用报告计划；恢复为ACTIVE时重新计算下次执行时间
    pub async fn update_schedule_status(
        &self,
        schedule_id: &str,
        status: ScheduleStatus,
    ) -> ReportingResult<ScheduleDefinition> {
        let mut schedule = self
            .schedules
            .get_by_id(schedule_id)
            .await?
            .ok_or_else(|| ReportingError::ScheduleNotFound {
                id: schedule_id.to_string(),
            })?;

        let now = self.clock.now();
        if status == ScheduleStatus::Active && schedule.status != ScheduleStatus::Active {
            schedule.next_run_time =
                CronScheduler::new(&schedule.cron_expression)?.next_execution_time(now);
        }
        info!(
            "报告计划 {} 状态 {} -> {}",
            schedule_id,
            schedule.status.as_str(),
            status.as_str()
        );
        schedule.status = status;
        schedule.updated_at = now;
        self.schedules.update(&schedule).await?;
        Ok(schedule)
    }

    pub async fn get_schedule(&self, schedule_id: &str) -> ReportingResult<Option<ScheduleDefinition>> {
        self.schedules.get_by_id(schedule_id).await
    }

    pub async fn list_schedules(&self) -> ReportingResult<Vec<ScheduleDefinition>> {
        self.schedules.list_all().await
    }

    pub async fn get_job(&self, job_id: &str) -> ReportingResult<Option<ScheduledJob>> {
        self.jobs.get_by_id(job_id).await
    }

    // ---- 触发 ----

    /// 检查到期的报告计划并为每个计划创建作业，返回新建的作业
    #[instrument(skip(self))]
    pub async fn check_schedules(&self) -> ReportingResult<Vec<ScheduledJob>> {
        let now = self.clock.now();
        let due = self.schedules.find_due(now).await?;
        if !due.is_empty() {
            debug!("发现 {} 个到期的报告计划", due.len());
        }

        let mut created = Vec::new();
        for schedule in due {
            match self.fire_schedule(&schedule, now).await {
                Ok(Some(job)) => created.push(job),
                Ok(None) => {}
                Err(e) => StructuredLogger::log_system_error("scheduler", "fire_schedule", &e),
            }
        }
        Ok(created)
    }

    /// 为一个到期计划创建本期作业（已有非终止作业时跳过），并推进下次执行时间
    pub async fn fire_schedule(
        &self,
        schedule: &ScheduleDefinition,
        now: DateTime<Utc>,
    ) -> ReportingResult<Option<ScheduledJob>> {
        let cron = CronScheduler::new(&schedule.cron_expression)?;
        let period = ReportingPeriod::for_cadence(schedule.report_type.cadence(), now).to_string();

        let existing = self
            .jobs
            .find_for_period(&schedule.schedule_id, &period)
            .await?;
        let job = if existing.iter().any(|job| job.status.blocks_new_job()) {
            info!(
                "报告计划 {} 在 {} 已有未结束的作业，跳过",
                schedule.schedule_id, period
            );
            None
        } else {
            Some(self.create_job(schedule, &period, now).await?)
        };

        let mut updated = schedule.clone();
        updated.last_run_time = Some(now);
        updated.next_run_time = cron.next_execution_time(now);
        updated.updated_at = now;
        self.schedules.update(&updated).await?;

        Ok(job)
    }

    async fn create_job(
        &self,
        schedule: &ScheduleDefinition,
        period: &str,
        now: DateTime<Utc>,
    ) -> ReportingResult<ScheduledJob> {
        let mut job = ScheduledJob::from_schedule(schedule, period, now);
        self.jobs.create(&job).await?;

        lock(&self.counters).jobs_scheduled += 1;
        counter!("regreport_jobs_scheduled_total", "report_type" => job.report_type.as_str())
            .increment(1);
        StructuredLogger::log_job_created(
            &job.job_id,
            &job.schedule_id,
            job.report_type.as_str(),
            &job.reporting_period,
        );
        self.publish(SchedulerEvent::JobCreated {
            job_id: job.job_id.clone(),
            schedule_id: job.schedule_id.clone(),
            report_type: job.report_type,
            reporting_period: job.reporting_period.clone(),
            scheduled_time: job.scheduled_time,
            priority: job.priority,
            status: job.status,
            timestamp: now,
        })
        .await;

        self.enqueue(&mut job).await?;
        Ok(job)
    }

    /// SCHEDULED作业转为QUEUED后放入就绪队列
    async fn enqueue(&self, job: &mut ScheduledJob) -> ReportingResult<()> {
        if job.status == JobStatus::Scheduled {
            job.status = JobStatus::Queued;
            self.jobs.update(job).await?;
        }
        self.queue.push(QueuedJob::from(&*job));
        Ok(())
    }

    // ---- 执行 ----

    /// 取出一个就绪作业并完成依赖检查与资源分配
    pub async fn dispatch_next(&self) -> ReportingResult<DispatchOutcome> {
        let now = self.clock.now();
        let Some(entry) = self.queue.pop_ready(now) else {
            return Ok(DispatchOutcome::Idle);
        };
        let requeue_at = now + Duration::seconds(self.config.resource_retry_delay_seconds);

        if let Err(e) = self.flush_unsaved(&entry.job_id).await {
            self.queue.push_delayed(entry, requeue_at);
            return Err(e);
        }

        let job = match self.jobs.get_by_id(&entry.job_id).await {
            Ok(job) => job,
            Err(e) => {
                self.queue.push_delayed(entry, requeue_at);
                return Err(e);
            }
        };
        let Some(mut job) = job else {
            warn!("队列中的作业 {} 已不存在", entry.job_id);
            return Ok(DispatchOutcome::Skipped {
                job_id: entry.job_id,
            });
        };
        if !job.status.is_runnable() {
            debug!("作业 {} 状态为 {}，跳过", job.job_id, job.status.as_str());
            return Ok(DispatchOutcome::Skipped { job_id: job.job_id });
        }

        if !job.dependencies_met {
            let check = match self.dependency_checker.check_dependencies(&job).await {
                Ok(check) => check,
                Err(e) => {
                    self.queue.push_delayed(entry, requeue_at);
                    return Err(e);
                }
            };
            StructuredLogger::log_dependency_check(
                &job.job_id,
                check.can_execute,
                check.reason.as_deref(),
            );

            if !check.can_execute {
                lock(&self.counters).dependency_violations += 1;
                counter!("regreport_dependency_violations_total").increment(1);

                if dependency_wait_expired(&job, now, self.config.dependency_timeout_minutes) {
                    let message = format!(
                        "依赖等待超时（{} 分钟）: {:?}",
                        self.config.dependency_timeout_minutes, check.blocking_dependencies
                    );
                    let job = self.fail_job(job, message).await?;
                    return Ok(DispatchOutcome::Failed(job));
                }

                self.queue.push_delayed(
                    entry,
                    now + Duration::seconds(self.config.dependency_retry_delay_seconds),
                );
                return Ok(DispatchOutcome::Deferred {
                    job_id: job.job_id,
                    reason: DeferReason::DependenciesUnmet,
                });
            }
            job.dependencies_met = true;
        }

        let Some(lease) = self.resources.try_acquire(&job.resource_pool) else {
            StructuredLogger::log_resource_contention(&job.job_id, &job.resource_pool);
            let saved = self.jobs.update(&job).await;
            self.queue.push_delayed(entry, requeue_at);
            saved?;
            return Ok(DispatchOutcome::Deferred {
                job_id: job.job_id,
                reason: DeferReason::ResourcesExhausted,
            });
        };

        job.status = JobStatus::Running;
        job.started_time = Some(now);
        job.resource_allocation = Some(ResourceAllocation {
            pool: lease.pool_name().to_string(),
            allocated_at: now,
        });
        if let Err(e) = self.jobs.update(&job).await {
            self.queue.push_delayed(entry, requeue_at);
            return Err(e);
        }

        lock(&self.active_jobs).insert(
            job.job_id.clone(),
            ActiveJob {
                report_type: job.report_type,
                started_at: now,
            },
        );
        StructuredLogger::log_job_started(
            &job.job_id,
            job.report_type.as_str(),
            lease.pool_name(),
            job.retry_count,
        );

        Ok(DispatchOutcome::Ready(Box::new(ReadyJob { job, lease })))
    }

    fn build_request(&self, job: &ScheduledJob) -> ReportRequest {
        ReportRequest {
            report_id: Uuid::new_v4().to_string(),
            report_type: job.report_type,
            format: job.format,
            reporting_period: job.reporting_period.clone(),
            institution_id: job.institution_id.clone(),
            jurisdiction: job.jurisdiction.clone(),
            template_version: self.template_version.clone(),
            data_sources: vec!["database".to_string()],
            delivery_method: self.delivery_method.clone(),
            deadline: self.clock.now() + Duration::minutes(job.timeout_minutes),
            priority: job.priority,
        }
    }

    /// 调用报告生成服务并按结果推进作业状态；资源在返回前归还
    #[instrument(skip(self, ready), fields(job.id = %ready.job.job_id))]
    pub async fn execute_job(&self, ready: ReadyJob) -> ReportingResult<ScheduledJob> {
        let ReadyJob { mut job, lease } = ready;
        let request = self.build_request(&job);
        let result = self.generator.generate_report(request).await;

        lease.release();
        lock(&self.active_jobs).remove(&job.job_id);

        let now = self.clock.now();
        if result.is_success() {
            job.status = JobStatus::Completed;
            job.completed_time = Some(now);
            job.error_message = None;
            job.result_data = Some(JobResultData {
                report_id: result.report_id.clone(),
                file_path: result.file_path.clone(),
                file_size: result.file_size,
                checksum: result.checksum.clone(),
                validation_results: result.validation_results.clone(),
            });
            self.save_or_requeue(
                &job,
                now + Duration::seconds(self.config.resource_retry_delay_seconds),
            )
            .await;

            let duration = job.duration_seconds();
            self.record_completion(job.report_type, duration);
            StructuredLogger::log_job_completed(
                &job.job_id,
                job.report_type.as_str(),
                duration,
                result.file_path.as_deref(),
            );
            self.publish(SchedulerEvent::JobCompleted {
                job_id: job.job_id.clone(),
                schedule_id: job.schedule_id.clone(),
                report_type: job.report_type,
                report_id: result.report_id,
                duration_seconds: duration,
                status: job.status,
                timestamp: now,
            })
            .await;
            return Ok(job);
        }

        let error = result
            .error_message
            .clone()
            .unwrap_or_else(|| "报告生成失败".to_string());

        match retry::decide(&job, &result, now, self.config.default_retry_delay_minutes) {
            RetryDecision::Retry { attempt, ready_at } => {
                job.status = JobStatus::Retrying;
                job.retry_count = attempt;
                job.error_message = Some(error.clone());
                if self.save_or_requeue(&job, ready_at).await {
                    self.queue.push_delayed(QueuedJob::from(&job), ready_at);
                }

                lock(&self.counters).jobs_retried += 1;
                counter!("regreport_jobs_retried_total", "report_type" => job.report_type.as_str())
                    .increment(1);
                StructuredLogger::log_job_retrying(&job.job_id, attempt, ready_at, &error);
                self.publish(SchedulerEvent::JobRetrying {
                    job_id: job.job_id.clone(),
                    schedule_id: job.schedule_id.clone(),
                    report_type: job.report_type,
                    retry_count: job.retry_count,
                    next_attempt_at: ready_at,
                    error,
                    status: job.status,
                    timestamp: now,
                })
                .await;
                Ok(job)
            }
            RetryDecision::Fail => self.fail_job(job, error).await,
        }
    }

    /// 取出并同步执行一个作业，没有可执行作业时返回 None
    pub async fn run_next(&self) -> ReportingResult<Option<ScheduledJob>> {
        match self.dispatch_next().await? {
            DispatchOutcome::Ready(ready) => self.execute_job(*ready).await.map(Some),
            DispatchOutcome::Failed(job) => Ok(Some(job)),
            _ => Ok(None),
        }
    }

    /// 依次执行当前所有就绪作业，返回执行过的作业
    pub async fn run_until_idle(&self) -> ReportingResult<Vec<ScheduledJob>> {
        let mut processed = Vec::new();
        loop {
            match self.dispatch_next().await? {
                DispatchOutcome::Idle => break,
                DispatchOutcome::Ready(ready) => processed.push(self.execute_job(*ready).await?),
                DispatchOutcome::Failed(job) => processed.push(job),
                DispatchOutcome::Deferred { .. } | DispatchOutcome::Skipped { .. } => {}
            }
        }
        Ok(processed)
    }

    async fn fail_job(&self, mut job: ScheduledJob, error: String) -> ReportingResult<ScheduledJob> {
        let now = self.clock.now();
        job.status = JobStatus::Failed;
        job.completed_time = Some(now);
        job.error_message = Some(error.clone());
        self.save_or_requeue(
            &job,
            now + Duration::seconds(self.config.resource_retry_delay_seconds),
        )
        .await;

        lock(&self.counters).jobs_failed += 1;
        counter!("regreport_jobs_failed_total", "report_type" => job.report_type.as_str())
            .increment(1);
        StructuredLogger::log_job_failed(
            &job.job_id,
            job.report_type.as_str(),
            job.retry_count,
            &error,
        );
        self.publish(SchedulerEvent::JobFailed {
            job_id: job.job_id.clone(),
            schedule_id: job.schedule_id.clone(),
            report_type: job.report_type,
            retry_count: job.retry_count,
            error,
            status: job.status,
            timestamp: now,
        })
        .await;
        Ok(job)
    }

    fn record_completion(&self, report_type: ReportType, duration: Option<f64>) {
        let mut counters = lock(&self.counters);
        counters.jobs_completed += 1;
        if let Some(duration) = duration {
            let n = counters.jobs_completed as f64;
            counters.avg_job_duration += (duration - counters.avg_job_duration) / n;
            histogram!("regreport_job_duration_seconds", "report_type" => report_type.as_str())
                .record(duration);
        }
        counter!("regreport_jobs_completed_total", "report_type" => report_type.as_str())
            .increment(1);
    }

    /// 取消尚未运行的作业
    pub async fn cancel_job(&self, job_id: &str) -> ReportingResult<ScheduledJob> {
        let mut job = self
            .jobs
            .get_by_id(job_id)
            .await?
            .ok_or_else(|| ReportingError::JobNotFound {
                id: job_id.to_string(),
            })?;
        if !job.status.is_runnable() {
            return Err(ReportingError::Validation {
                errors: vec![format!(
                    "作业 {} 当前状态为 {}，无法取消",
                    job_id,
                    job.status.as_str()
                )],
            });
        }

        let previous = job.status;
        let now = self.clock.now();
        job.status = JobStatus::Cancelled;
        job.completed_time = Some(now);
        self.jobs.update(&job).await?;
        self.queue.remove(job_id);

        lock(&self.counters).jobs_cancelled += 1;
        counter!("regreport_jobs_cancelled_total").increment(1);
        StructuredLogger::log_job_cancelled(job_id, previous.as_str());
        self.publish(SchedulerEvent::JobCancelled {
            job_id: job.job_id.clone(),
            schedule_id: job.schedule_id.clone(),
            report_type: job.report_type,
            status: job.status,
            timestamp: now,
        })
        .await;
        Ok(job)
    }

    // ---- 后台维护 ----

    /// 重新检查前瞻窗口内等待依赖的作业：满足的立即入队，超时的终止
    #[instrument(skip(self))]
    pub async fn resolve_dependencies(&self) -> ReportingResult<usize> {
        let now = self.clock.now();
        let horizon = now + Duration::minutes(self.config.dependency_lookahead_minutes);
        let waiting = self.jobs.find_waiting_on_dependencies(horizon).await?;

        let mut released = 0;
        for mut job in waiting {
            let check = self.dependency_checker.check_dependencies(&job).await?;
            if check.can_execute {
                job.dependencies_met = true;
                self.jobs.update(&job).await?;
                self.queue.push(QueuedJob::from(&job));
                StructuredLogger::log_dependency_check(&job.job_id, true, None);
                released += 1;
            } else if dependency_wait_expired(&job, now, self.config.dependency_timeout_minutes) {
                self.queue.remove(&job.job_id);
                let message = format!(
                    "依赖等待超时（{} 分钟）: {:?}",
                    self.config.dependency_timeout_minutes, check.blocking_dependencies
                );
                self.fail_job(job, message).await?;
            }
        }

        if released > 0 {
            info!("{} 个作业的依赖已满足，重新入队", released);
        }
        Ok(released)
    }

    /// 启动时把未结束的作业重新放回队列；中断的RUNNING作业回到QUEUED
    pub async fn recover_pending_jobs(&self) -> ReportingResult<usize> {
        let pending = self
            .jobs
            .find_by_status(&[
                JobStatus::Scheduled,
                JobStatus::Queued,
                JobStatus::Retrying,
                JobStatus::Running,
            ])
            .await?;

        let count = pending.len();
        for mut job in pending {
            if job.status == JobStatus::Running {
                warn!("作业 {} 在上次运行中被中断，重新排队", job.job_id);
                job.status = JobStatus::Queued;
                job.started_time = None;
                job.resource_allocation = None;
                self.jobs.update(&job).await?;
            }
            self.enqueue(&mut job).await?;
        }

        if count > 0 {
            info!("恢复了 {} 个未完成的作业", count);
        }
        Ok(count)
    }

    /// 清理过期的已完成/已取消作业和过期报告文件
    #[instrument(skip(self))]
    pub async fn cleanup(&self) -> ReportingResult<CleanupSummary> {
        let cutoff = self.clock.now() - Duration::days(self.config.cleanup_completed_jobs_days);
        let jobs_purged = self.jobs.delete_finished_before(cutoff).await?;

        let reports_purged = match self.generator.cleanup_old_reports().await {
            Ok(count) => count,
            Err(e) => {
                StructuredLogger::log_system_error("scheduler", "cleanup_old_reports", &e);
                0
            }
        };

        info!(
            "清理完成: {} 个作业记录, {} 个报告文件",
            jobs_purged, reports_purged
        );
        Ok(CleanupSummary {
            jobs_purged,
            reports_purged,
        })
    }

    pub fn monitor_resources(&self) {
        self.resources.log_utilization();
        gauge!("regreport_job_queue_size").set(self.queue.len() as f64);
        gauge!("regreport_active_jobs").set(lock(&self.active_jobs).len() as f64);
    }

    pub async fn metrics(&self) -> ReportingResult<SchedulerMetrics> {
        let schedules_active = self
            .schedules
            .list_all()
            .await?
            .iter()
            .filter(|schedule| schedule.status == ScheduleStatus::Active)
            .count();

        let counters = lock(&self.counters);
        let finished = counters.jobs_completed + counters.jobs_failed;
        let success_rate = if finished == 0 {
            0.0
        } else {
            counters.jobs_completed as f64 / finished as f64
        };

        Ok(SchedulerMetrics {
            schedules_active,
            jobs_scheduled: counters.jobs_scheduled,
            jobs_completed: counters.jobs_completed,
            jobs_failed: counters.jobs_failed,
            jobs_retried: counters.jobs_retried,
            jobs_cancelled: counters.jobs_cancelled,
            avg_job_duration: counters.avg_job_duration,
            dependency_violations: counters.dependency_violations,
            resource_contentions: self.resources.contentions(),
            success_rate,
            active_jobs: lock(&self.active_jobs).len(),
            queue_size: self.queue.len(),
            resource_pools: self.resources.snapshots(),
        })
    }

    /// 正在运行的作业及其开始时间
    pub fn in_flight_jobs(&self) -> Vec<(String, ReportType, DateTime<Utc>)> {
        let mut jobs: Vec<_> = lock(&self.active_jobs)
            .iter()
            .map(|(id, active)| (id.clone(), active.report_type, active.started_at))
            .collect();
        jobs.sort_by_key(|(_, _, started_at)| *started_at);
        jobs
    }
}
