//! 仓库与服务接口的内存实现
//!
//! 不依赖数据库或外部服务，用于单元测试和调度器集成测试。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regreport_core::{
    Clock, EventPublisher, FailureKind, JobRepository, JobStatus, ReportData, ReportDataSource,
    ReportGenerationService, ReportRepository, ReportRequest, ReportResult, ReportStatus,
    ReportStatusRecord, ReportType, ReportingError, ReportingResult, ScheduleDefinition,
    ScheduleRepository, ScheduleStatus, ScheduledJob, SchedulerEvent, StoredReport,
    ValidationOutcome,
};

/// Mock implementation of ScheduleRepository
#[derive(Debug, Clone, Default)]
pub struct MockScheduleRepository {
    schedules: Arc<Mutex<HashMap<String, ScheduleDefinition>>>,
}

impl MockScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedules(schedules: Vec<ScheduleDefinition>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.schedules.lock().unwrap();
            for schedule in schedules {
                map.insert(schedule.schedule_id.clone(), schedule);
            }
        }
        repo
    }

    pub fn get_all(&self) -> Vec<ScheduleDefinition> {
        let mut all: Vec<_> = self.schedules.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.schedule_id.cmp(&b.schedule_id));
        all
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn create(&self, schedule: &ScheduleDefinition) -> ReportingResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        if schedules.contains_key(&schedule.schedule_id) {
            return Err(ReportingError::Internal(format!(
                "schedule already exists: {}",
                schedule.schedule_id
            )));
        }
        schedules.insert(schedule.schedule_id.clone(), schedule.clone());
        Ok(())
    }

    async fn get_by_id(&self, schedule_id: &str) -> ReportingResult<Option<ScheduleDefinition>> {
        Ok(self.schedules.lock().unwrap().get(schedule_id).cloned())
    }

    async fn update(&self, schedule: &ScheduleDefinition) -> ReportingResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        if !schedules.contains_key(&schedule.schedule_id) {
            return Err(ReportingError::ScheduleNotFound {
                id: schedule.schedule_id.clone(),
            });
        }
        schedules.insert(schedule.schedule_id.clone(), schedule.clone());
        Ok(())
    }

    async fn list_all(&self) -> ReportingResult<Vec<ScheduleDefinition>> {
        Ok(self.get_all())
    }

    async fn find_due(&self, now: DateTime<Utc>) -> ReportingResult<Vec<ScheduleDefinition>> {
        let mut due: Vec<_> = self
            .schedules
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status == ScheduleStatus::Active)
            .filter(|s| s.next_run_time.map(|t| t <= now).unwrap_or(false))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.next_run_time);
        Ok(due)
    }

    async fn count(&self) -> ReportingResult<u64> {
        Ok(self.schedules.lock().unwrap().len() as u64)
    }
}

/// Mock implementation of JobRepository
#[derive(Debug, Clone, Default)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<HashMap<String, ScheduledJob>>>,
    fail_updates: Arc<AtomicBool>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<ScheduledJob>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.jobs.lock().unwrap();
            for job in jobs {
                map.insert(job.job_id.clone(), job);
            }
        }
        repo
    }

    pub fn insert(&self, job: ScheduledJob) {
        self.jobs.lock().unwrap().insert(job.job_id.clone(), job);
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// 打开后 `update` 返回数据库错误，用于模拟写入失败
    pub fn set_fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// 按创建时间排序的全部作业
    pub fn get_all_jobs(&self) -> Vec<ScheduledJob> {
        let mut all: Vec<_> = self.jobs.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.job_id.cmp(&b.job_id)));
        all
    }

    pub fn jobs_for_schedule(&self, schedule_id: &str) -> Vec<ScheduledJob> {
        self.get_all_jobs()
            .into_iter()
            .filter(|job| job.schedule_id == schedule_id)
            .collect()
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn create(&self, job: &ScheduledJob) -> ReportingResult<()> {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&job.job_id) {
            return Err(ReportingError::Internal(format!(
                "job already exists: {}",
                job.job_id
            )));
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get_by_id(&self, job_id: &str) -> ReportingResult<Option<ScheduledJob>> {
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }

    async fn update(&self, job: &ScheduledJob) -> ReportingResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(ReportingError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "job store unavailable",
            )));
        }
        let mut jobs = self.jobs.lock().unwrap();
        if !jobs.contains_key(&job.job_id) {
            return Err(ReportingError::JobNotFound {
                id: job.job_id.clone(),
            });
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn find_for_period(
        &self,
        schedule_id: &str,
        reporting_period: &str,
    ) -> ReportingResult<Vec<ScheduledJob>> {
        Ok(self
            .get_all_jobs()
            .into_iter()
            .filter(|job| job.schedule_id == schedule_id && job.reporting_period == reporting_period)
            .collect())
    }

    async fn latest_dependency_status(
        &self,
        dependency_id: &str,
        reporting_period: &str,
    ) -> ReportingResult<Option<JobStatus>> {
        let jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get(dependency_id) {
            return Ok(Some(job.status));
        }
        Ok(jobs
            .values()
            .filter(|job| {
                job.schedule_id == dependency_id && job.reporting_period == reporting_period
            })
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then(a.scheduled_time.cmp(&b.scheduled_time))
            })
            .map(|job| job.status))
    }

    async fn find_by_status(&self, statuses: &[JobStatus]) -> ReportingResult<Vec<ScheduledJob>> {
        Ok(self
            .get_all_jobs()
            .into_iter()
            .filter(|job| statuses.contains(&job.status))
            .collect())
    }

    async fn find_waiting_on_dependencies(
        &self,
        horizon: DateTime<Utc>,
    ) -> ReportingResult<Vec<ScheduledJob>> {
        Ok(self
            .get_all_jobs()
            .into_iter()
            .filter(|job| job.status.is_runnable() && !job.dependencies_met)
            .filter(|job| job.scheduled_time <= horizon)
            .collect())
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> ReportingResult<u64> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|_, job| {
            let finished = matches!(job.status, JobStatus::Completed | JobStatus::Cancelled);
            !(finished && job.completed_time.map(|t| t < cutoff).unwrap_or(false))
        });
        Ok((before - jobs.len()) as u64)
    }
}

/// Mock implementation of ReportRepository，保留完整的状态变更历史
#[derive(Debug, Clone, Default)]
pub struct MockReportRepository {
    statuses: Arc<Mutex<HashMap<String, ReportStatusRecord>>>,
    history: Arc<Mutex<Vec<ReportStatusRecord>>>,
    reports: Arc<Mutex<HashMap<String, StoredReport>>>,
    fail_status_updates: Arc<AtomicBool>,
    fail_report_upserts: Arc<AtomicBool>,
}

impl MockReportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让后续的状态更新全部失败
    pub fn fail_status_updates(&self, fail: bool) {
        self.fail_status_updates.store(fail, Ordering::SeqCst);
    }

    /// 让后续的报告元数据写入全部失败
    pub fn fail_report_upserts(&self, fail: bool) {
        self.fail_report_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn status_history(&self, report_id: &str) -> Vec<ReportStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.report_id == report_id)
            .map(|record| record.status)
            .collect()
    }

    pub fn insert_report(&self, report: StoredReport) {
        self.reports
            .lock()
            .unwrap()
            .insert(report.report_id.clone(), report);
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportRepository for MockReportRepository {
    async fn upsert_status(&self, record: &ReportStatusRecord) -> ReportingResult<()> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(ReportingError::Internal("status table unavailable".to_string()));
        }
        self.history.lock().unwrap().push(record.clone());
        self.statuses
            .lock()
            .unwrap()
            .insert(record.report_id.clone(), record.clone());
        Ok(())
    }

    async fn get_status(&self, report_id: &str) -> ReportingResult<Option<ReportStatusRecord>> {
        Ok(self.statuses.lock().unwrap().get(report_id).cloned())
    }

    async fn upsert_report(&self, report: &StoredReport) -> ReportingResult<()> {
        if self.fail_report_upserts.load(Ordering::SeqCst) {
            return Err(ReportingError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "report table unavailable",
            )));
        }
        self.insert_report(report.clone());
        Ok(())
    }

    async fn get_report(&self, report_id: &str) -> ReportingResult<Option<StoredReport>> {
        Ok(self.reports.lock().unwrap().get(report_id).cloned())
    }

    async fn find_reports_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> ReportingResult<Vec<StoredReport>> {
        let mut reports: Vec<_> = self
            .reports
            .lock()
            .unwrap()
            .values()
            .filter(|report| report.created_at < cutoff)
            .cloned()
            .collect();
        reports.sort_by_key(|report| report.created_at);
        Ok(reports)
    }

    async fn delete_report(&self, report_id: &str) -> ReportingResult<()> {
        self.reports.lock().unwrap().remove(report_id);
        self.statuses.lock().unwrap().remove(report_id);
        Ok(())
    }
}

type FiguresKey = (ReportType, String, String);

/// 内存数据源
#[derive(Debug, Clone, Default)]
pub struct MockDataSource {
    profiles: Arc<Mutex<HashMap<String, ReportData>>>,
    figures: Arc<Mutex<HashMap<FiguresKey, ReportData>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, institution_id: &str, profile: ReportData) -> Self {
        self.profiles
            .lock()
            .unwrap()
            .insert(institution_id.to_string(), profile);
        self
    }

    pub fn with_figures(
        self,
        report_type: ReportType,
        institution_id: &str,
        reporting_period: &str,
        figures: ReportData,
    ) -> Self {
        self.figures.lock().unwrap().insert(
            (
                report_type,
                institution_id.to_string(),
                reporting_period.to_string(),
            ),
            figures,
        );
        self
    }

    /// 模拟数据库不可用
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> ReportingResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ReportingError::DataSource("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ReportDataSource for MockDataSource {
    async fn institution_profile(&self, institution_id: &str) -> ReportingResult<Option<ReportData>> {
        self.check_available()?;
        Ok(self.profiles.lock().unwrap().get(institution_id).cloned())
    }

    async fn report_figures(
        &self,
        report_type: ReportType,
        institution_id: &str,
        reporting_period: &str,
    ) -> ReportingResult<Option<ReportData>> {
        self.check_available()?;
        let key = (
            report_type,
            institution_id.to_string(),
            reporting_period.to_string(),
        );
        Ok(self.figures.lock().unwrap().get(&key).cloned())
    }
}

/// 记录所有已发布事件
#[derive(Debug, Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<SchedulerEvent>>>,
    should_fail: Arc<AtomicBool>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| event.event_type())
            .collect()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.event_types()
            .into_iter()
            .filter(|t| *t == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, event: &SchedulerEvent) -> ReportingResult<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(ReportingError::EventPublish("broker unavailable".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// 手动推进的时钟
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// 报告生成替身的单次结果
#[derive(Debug, Clone, PartialEq)]
pub enum StubOutcome {
    Success,
    Failure(FailureKind, String),
}

/// 按脚本返回结果的报告生成服务，脚本用完后一律成功
#[derive(Debug, Clone, Default)]
pub struct StubReportGenerator {
    outcomes: Arc<Mutex<VecDeque<StubOutcome>>>,
    requests: Arc<Mutex<Vec<ReportRequest>>>,
    delay: Arc<Mutex<Option<StdDuration>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    cleanup_calls: Arc<AtomicUsize>,
}

impl StubReportGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: Vec<StubOutcome>) -> Self {
        let stub = Self::new();
        stub.outcomes.lock().unwrap().extend(outcomes);
        stub
    }

    /// 每次生成都失败
    pub fn always_failing(kind: FailureKind, message: &str, attempts: usize) -> Self {
        Self::with_outcomes(vec![StubOutcome::Failure(kind, message.to_string()); attempts])
    }

    pub fn with_delay(self, delay: StdDuration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ReportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// 同时运行的最大生成数量
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn cleanup_calls(&self) -> usize {
        self.cleanup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportGenerationService for StubReportGenerator {
    async fn generate_report(&self, request: ReportRequest) -> ReportResult {
        self.requests.lock().unwrap().push(request.clone());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StubOutcome::Success);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            StubOutcome::Success => ReportResult {
                file_path: Some(format!(
                    "reports/{}.{}",
                    request.report_id,
                    request.format.extension()
                )),
                report_id: request.report_id,
                status: ReportStatus::Completed,
                file_size: Some(128),
                checksum: Some("0".repeat(64)),
                validation_results: ValidationOutcome::new(),
                generation_time: 0.01,
                error_message: None,
                failure: None,
                created_at: Utc::now(),
            },
            StubOutcome::Failure(kind, message) => ReportResult {
                report_id: request.report_id,
                status: ReportStatus::Failed,
                file_path: None,
                file_size: None,
                checksum: None,
                validation_results: ValidationOutcome::invalid(message.clone()),
                generation_time: 0.01,
                error_message: Some(message),
                failure: Some(kind),
                created_at: Utc::now(),
            },
        }
    }

    async fn cleanup_old_reports(&self) -> ReportingResult<usize> {
        self.cleanup_calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}
