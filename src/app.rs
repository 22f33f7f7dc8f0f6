use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use regreport_config::AppConfig;
use regreport_core::{
    Clock, Priority, ReportFormat, ReportRequest, ReportResult, ReportType, ReportingPeriod,
    SystemClock,
};
use regreport_dispatcher::{ReportScheduler, SchedulerServices};
use regreport_engine::ReportGenerator;
use regreport_infrastructure::{
    BroadcastEventPublisher, DatabaseManager, SqliteJobRepository, SqliteReportDataSource,
    SqliteReportRepository, SqliteScheduleRepository,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 单次生成的参数
#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub report_type: ReportType,
    pub format: Option<ReportFormat>,
    pub reporting_period: String,
    pub institution_id: Option<String>,
}

/// 应用运行模式
#[derive(Debug, Clone)]
pub enum AppMode {
    /// 启动调度器和全部后台任务
    Run,
    /// 只写入默认报告计划
    Seed,
    /// 立即生成一份报告
    Generate(GenerateArgs),
    /// 只校验配置
    ValidateConfig,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    generator: Arc<ReportGenerator>,
    scheduler: Arc<ReportScheduler>,
    events: Arc<BroadcastEventPublisher>,
    clock: Arc<dyn Clock>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock)).await
    }

    /// 连接数据库、加载模板并装配调度器
    pub async fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        info!("初始化应用程序");

        let database = DatabaseManager::connect_and_migrate(&config.database)
            .await
            .with_context(|| format!("连接数据库失败: {}", config.database.url))?;
        let pool = database.pool().clone();

        let generator = Arc::new(
            ReportGenerator::initialize(
                &config.reporting,
                Arc::new(SqliteReportDataSource::new(pool.clone())),
                Arc::new(SqliteReportRepository::new(pool.clone())),
                Arc::clone(&clock),
            )
            .await
            .context("初始化报告生成器失败")?,
        );
        if generator.list_available_templates().is_empty() {
            warn!("没有加载任何报告模板: {}", config.reporting.template_dir);
        }

        let events = Arc::new(BroadcastEventPublisher::new(config.events.clone()));

        let scheduler = Arc::new(ReportScheduler::new(
            &config,
            SchedulerServices {
                schedules: Arc::new(SqliteScheduleRepository::new(pool.clone())),
                jobs: Arc::new(SqliteJobRepository::new(pool)),
                generator: generator.clone(),
                events: events.clone(),
                clock: Arc::clone(&clock),
            },
        ));

        Ok(Self {
            config,
            database,
            generator,
            scheduler,
            events,
            clock,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.database
    }

    pub fn generator(&self) -> &Arc<ReportGenerator> {
        &self.generator
    }

    pub fn scheduler(&self) -> &Arc<ReportScheduler> {
        &self.scheduler
    }

    pub fn events(&self) -> &Arc<BroadcastEventPublisher> {
        &self.events
    }

    pub async fn seed(&self) -> Result<usize> {
        self.scheduler
            .seed_default_schedules()
            .await
            .context("写入默认报告计划失败")
    }

    /// 运行调度器直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.database.health_check().await.context("数据库健康检查失败")?;

        if self.config.scheduler.seed_default_schedules {
            self.seed().await?;
        }

        let handles = self.scheduler.start().await;
        if handles.is_empty() {
            info!("调度器未启动，等待关闭信号");
        }

        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号");

        self.scheduler.shutdown();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台任务退出异常: {e}");
            }
        }

        let metrics = self.scheduler.metrics().await?;
        info!(
            jobs.scheduled = metrics.jobs_scheduled,
            jobs.completed = metrics.jobs_completed,
            jobs.failed = metrics.jobs_failed,
            success_rate = metrics.success_rate,
            "调度器已停止"
        );

        self.database.close().await;
        Ok(())
    }

    /// 立即生成一份报告，不经过调度队列
    pub async fn generate(&self, args: GenerateArgs) -> Result<ReportResult> {
        let request = self.build_request(args)?;
        info!(
            "生成报告: {} {} {}",
            request.report_type, request.institution_id, request.reporting_period
        );
        Ok(self.generator.generate_report(request).await)
    }

    fn build_request(&self, args: GenerateArgs) -> Result<ReportRequest> {
        args.reporting_period
            .parse::<ReportingPeriod>()
            .map_err(|e| anyhow::anyhow!("无效的报告期间 {}: {e}", args.reporting_period))?;

        let scheduler = &self.config.scheduler;
        Ok(ReportRequest {
            report_id: Uuid::new_v4().to_string(),
            report_type: args.report_type,
            format: args.format.unwrap_or_else(|| args.report_type.default_format()),
            reporting_period: args.reporting_period,
            institution_id: args
                .institution_id
                .unwrap_or_else(|| scheduler.default_institution_id.clone()),
            jurisdiction: scheduler.default_jurisdiction.clone(),
            template_version: self.config.reporting.template_version.clone(),
            data_sources: vec!["database".to_string()],
            delivery_method: self.config.reporting.delivery_method.clone(),
            deadline: self.clock.now() + Duration::minutes(scheduler.job_timeout_minutes),
            priority: Priority::default(),
        })
    }
}
