use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use regreport_config::ReportingConfig;
use regreport_core::{
    Clock, FailureKind, ReportData, ReportDataSource, ReportFormat, ReportGenerationService,
    ReportRepository, ReportRequest, ReportResult, ReportStatus, ReportStatusRecord, ReportType,
    ReportingError, ReportingResult, StoredReport, ValidationOutcome,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};

use crate::data::ReportDataGatherer;
use crate::registry::{TemplateInfo, TemplateRegistry};
use crate::templates::{taxonomy::check_balance_sheet, RenderContext};

/// 报告生成统计
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GeneratorMetrics {
    pub reports_generated: u64,
    pub reports_failed: u64,
    /// 成功生成的平均耗时（秒）
    pub avg_generation_time: f64,
    pub validation_errors: u64,
    pub templates_loaded: usize,
}

/// 生成失败的内部描述
struct GenerationFailure {
    kind: FailureKind,
    message: String,
    validation: ValidationOutcome,
}

impl GenerationFailure {
    fn from_error(err: ReportingError, validation: ValidationOutcome) -> Self {
        let kind = if err.is_retryable() {
            FailureKind::TransientIo
        } else {
            FailureKind::Validation
        };
        Self {
            kind,
            message: err.to_string(),
            validation,
        }
    }
}

/// 写入磁盘的报告文件
struct SavedReport {
    path: PathBuf,
    size: u64,
    checksum: String,
}

/// 合规报告生成器
///
/// 流程：选择模板 → 收集数据 → 验证 → 序列化 → 写入文件 → 记录元数据与状态。
/// 所有失败都以FAILED状态的 [`ReportResult`] 返回。
pub struct ReportGenerator {
    registry: TemplateRegistry,
    gatherer: ReportDataGatherer,
    reports: Arc<dyn ReportRepository>,
    clock: Arc<dyn Clock>,
    output_dir: PathBuf,
    retention_days: i64,
    metrics: Mutex<GeneratorMetrics>,
}

impl ReportGenerator {
    pub fn new(
        registry: TemplateRegistry,
        data_source: Arc<dyn ReportDataSource>,
        reports: Arc<dyn ReportRepository>,
        clock: Arc<dyn Clock>,
        config: &ReportingConfig,
    ) -> Self {
        let metrics = GeneratorMetrics {
            templates_loaded: registry.len(),
            ..GeneratorMetrics::default()
        };
        Self {
            registry,
            gatherer: ReportDataGatherer::new(data_source),
            reports,
            clock,
            output_dir: PathBuf::from(&config.output_dir),
            retention_days: config.report_retention_days,
            metrics: Mutex::new(metrics),
        }
    }

    /// 从配置的模板目录加载模板并创建输出目录
    pub async fn initialize(
        config: &ReportingConfig,
        data_source: Arc<dyn ReportDataSource>,
        reports: Arc<dyn ReportRepository>,
        clock: Arc<dyn Clock>,
    ) -> ReportingResult<Self> {
        let registry = TemplateRegistry::load_from_dir(&config.template_dir)?;
        tokio::fs::create_dir_all(&config.output_dir).await?;

        info!(
            "报告生成器初始化完成: 模板 {} 个, 输出目录 {}",
            registry.len(),
            config.output_dir
        );
        Ok(Self::new(registry, data_source, reports, clock, config))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn metrics_state(&self) -> MutexGuard<'_, GeneratorMetrics> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[instrument(skip(self, request), fields(
        report_id = %request.report_id,
        report_type = %request.report_type,
        format = %request.format,
    ))]
    pub async fn generate_report(&self, request: ReportRequest) -> ReportResult {
        let started = Instant::now();
        info!(
            "开始生成报告: {} {} {}",
            request.report_type, request.reporting_period, request.institution_id
        );

        let outcome = self.run_pipeline(&request).await;
        let generation_time = started.elapsed().as_secs_f64();
        let created_at = self.clock.now();

        match outcome {
            Ok((saved, validation)) => {
                self.update_status(&request.report_id, ReportStatus::Completed, None)
                    .await;
                self.record_success(request.report_type, generation_time);
                info!(
                    "报告生成完成: {} ({} 字节, {:.3}s)",
                    saved.path.display(),
                    saved.size,
                    generation_time
                );

                ReportResult {
                    report_id: request.report_id,
                    status: ReportStatus::Completed,
                    file_path: Some(saved.path.display().to_string()),
                    file_size: Some(saved.size),
                    checksum: Some(saved.checksum),
                    validation_results: validation,
                    generation_time,
                    error_message: None,
                    failure: None,
                    created_at,
                }
            }
            Err(failure) => {
                self.update_status(
                    &request.report_id,
                    ReportStatus::Failed,
                    Some(&failure.message),
                )
                .await;
                self.record_failure(request.report_type, failure.kind);
                error!("报告生成失败: {}", failure.message);

                ReportResult {
                    report_id: request.report_id,
                    status: ReportStatus::Failed,
                    file_path: None,
                    file_size: None,
                    checksum: None,
                    validation_results: failure.validation,
                    generation_time,
                    error_message: Some(failure.message),
                    failure: Some(failure.kind),
                    created_at,
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        request: &ReportRequest,
    ) -> Result<(SavedReport, ValidationOutcome), GenerationFailure> {
        self.update_status(&request.report_id, ReportStatus::Generating, None)
            .await;

        let template = self
            .registry
            .get(request.format, request.report_type)
            .ok_or_else(|| {
                let key = request.template_key();
                GenerationFailure {
                    kind: FailureKind::TemplateNotFound,
                    message: ReportingError::TemplateNotFound { key: key.clone() }.to_string(),
                    validation: ValidationOutcome::invalid(format!("Template not found: {key}")),
                }
            })?;

        let gathered = self
            .gatherer
            .gather(request)
            .await
            .map_err(|e| GenerationFailure::from_error(e, ValidationOutcome::new()))?;

        self.update_status(&request.report_id, ReportStatus::Validating, None)
            .await;

        let mut validation = self.validate_with_template(
            request.report_type,
            request.format,
            &gathered.data,
            |data| template.validate(data),
        );
        for warning in gathered.warnings {
            validation.add_warning(warning);
        }

        if !validation.is_valid() {
            let error_count = validation.errors.len() as u64;
            self.metrics_state().validation_errors += error_count;
            counter!("regreport_validation_errors_total", "report_type" => request.report_type.as_str())
                .increment(error_count);
            return Err(GenerationFailure {
                kind: FailureKind::Validation,
                message: ReportingError::Validation {
                    errors: validation.errors.clone(),
                }
                .to_string(),
                validation,
            });
        }

        let context = RenderContext {
            generated_at: self.clock.now(),
        };
        let content = template
            .generate(&gathered.data, &context)
            .map_err(|e| GenerationFailure::from_error(e, validation.clone()))?;

        let saved = self
            .save_report_file(request, &content)
            .await
            .map_err(|e| GenerationFailure::from_error(e, validation.clone()))?;

        Ok((saved, validation))
    }

    /// 模板验证加上与格式无关的跨字段检查（XBRL模板自带资产负债表检查）
    fn validate_with_template(
        &self,
        report_type: ReportType,
        format: ReportFormat,
        data: &ReportData,
        template_validate: impl FnOnce(&ReportData) -> ValidationOutcome,
    ) -> ValidationOutcome {
        let mut outcome = template_validate(data);
        if format != ReportFormat::Xbrl && report_type.has_balance_sheet() {
            if let Some(error) = check_balance_sheet(data) {
                outcome.add_error(error);
            }
        }
        outcome
    }

    async fn save_report_file(
        &self,
        request: &ReportRequest,
        content: &str,
    ) -> ReportingResult<SavedReport> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let now = self.clock.now();
        let base = format!(
            "{}_{}_{}",
            request.report_type.as_str(),
            request.reporting_period,
            now.format("%Y%m%d_%H%M%S")
        );
        let extension = request.format.extension();

        let bytes = content.as_bytes();
        let mut attempt = 0u32;
        let (path, mut file) = loop {
            let file_name = if attempt == 0 {
                format!("{base}.{extension}")
            } else {
                format!("{base}_{attempt}.{extension}")
            };
            let path = self.output_dir.join(file_name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        };
        let checksum = hex::encode(Sha256::digest(bytes));
        let size = bytes.len() as u64;

        let persisted = async {
            file.write_all(bytes).await?;
            file.flush().await?;
            drop(file);
            self.reports
                .upsert_report(&StoredReport {
                    report_id: request.report_id.clone(),
                    report_type: request.report_type,
                    format: request.format,
                    reporting_period: request.reporting_period.clone(),
                    institution_id: request.institution_id.clone(),
                    file_path: path.display().to_string(),
                    file_size: size as i64,
                    checksum: checksum.clone(),
                    created_at: now,
                })
                .await
        }
        .await;

        // 元数据没有落库的文件不会被清理任务发现，这里直接删除
        if let Err(e) = persisted {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!("删除未登记的报告文件失败: {}: {}", path.display(), remove_err);
            }
            return Err(e);
        }

        debug!("报告文件已保存: {}", path.display());
        Ok(SavedReport {
            path,
            size,
            checksum,
        })
    }

    /// 更新报告状态，失败只记录日志
    async fn update_status(&self, report_id: &str, status: ReportStatus, error: Option<&str>) {
        let record = ReportStatusRecord {
            report_id: report_id.to_string(),
            status,
            error_message: error.map(str::to_string),
            updated_at: self.clock.now(),
        };
        if let Err(e) = self.reports.upsert_status(&record).await {
            warn!("更新报告状态失败: {report_id} -> {}: {e}", status.as_str());
        }
    }

    fn record_success(&self, report_type: ReportType, generation_time: f64) {
        {
            let mut metrics = self.metrics_state();
            metrics.reports_generated += 1;
            let n = metrics.reports_generated as f64;
            metrics.avg_generation_time += (generation_time - metrics.avg_generation_time) / n;
        }
        counter!("regreport_reports_generated_total", "report_type" => report_type.as_str())
            .increment(1);
        histogram!("regreport_report_generation_seconds", "report_type" => report_type.as_str())
            .record(generation_time);
    }

    fn record_failure(&self, report_type: ReportType, kind: FailureKind) {
        self.metrics_state().reports_failed += 1;
        let reason = match kind {
            FailureKind::TemplateNotFound => "template_not_found",
            FailureKind::Validation => "validation",
            FailureKind::TransientIo => "transient_io",
        };
        counter!(
            "regreport_reports_failed_total",
            "report_type" => report_type.as_str(),
            "reason" => reason
        )
        .increment(1);
    }

    /// 只验证数据，不生成报告
    pub fn validate_report_data(
        &self,
        report_type: ReportType,
        format: ReportFormat,
        data: &ReportData,
    ) -> ValidationOutcome {
        match self.registry.get(format, report_type) {
            Some(template) => {
                self.validate_with_template(report_type, format, data, |d| template.validate(d))
            }
            None => ValidationOutcome::invalid(format!(
                "Template not found: {}",
                TemplateRegistry::template_key(format, report_type)
            )),
        }
    }

    pub async fn get_report_status(
        &self,
        report_id: &str,
    ) -> ReportingResult<Option<ReportStatusRecord>> {
        self.reports.get_status(report_id).await
    }

    pub fn list_available_templates(&self) -> Vec<TemplateInfo> {
        self.registry.list()
    }

    pub fn metrics(&self) -> GeneratorMetrics {
        let snapshot = self.metrics_state().clone();
        gauge!("regreport_templates_loaded").set(snapshot.templates_loaded as f64);
        snapshot
    }

    /// 清理超过保留期的报告，磁盘上已不存在的文件直接跳过
    pub async fn cleanup_old_reports(&self) -> ReportingResult<usize> {
        let cutoff: DateTime<Utc> = self.clock.now() - Duration::days(self.retention_days);
        let old_reports = self.reports.find_reports_created_before(cutoff).await?;

        let mut purged = 0;
        for report in old_reports {
            match tokio::fs::remove_file(&report.file_path).await {
                Ok(()) => debug!("已删除报告文件: {}", report.file_path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("报告文件已不存在: {}", report.file_path);
                }
                Err(e) => {
                    warn!("删除报告文件失败，保留记录: {}: {e}", report.file_path);
                    continue;
                }
            }
            self.reports.delete_report(&report.report_id).await?;
            purged += 1;
        }

        info!("清理过期报告 {} 个", purged);
        Ok(purged)
    }
}

#[async_trait]
impl ReportGenerationService for ReportGenerator {
    async fn generate_report(&self, request: ReportRequest) -> ReportResult {
        ReportGenerator::generate_report(self, request).await
    }

    async fn cleanup_old_reports(&self) -> ReportingResult<usize> {
        ReportGenerator::cleanup_old_reports(self).await
    }
}
