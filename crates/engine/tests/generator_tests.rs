use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Duration;
use regreport_config::ReportingConfig;
use regreport_core::{
    FailureKind, ReportFormat, ReportRepository, ReportStatus, ReportType, StoredReport,
};
use regreport_engine::templates::{CsvTemplate, CsvTemplateConfig};
use regreport_engine::{ReportGenerator, TemplateRegistry};
use regreport_testing_utils::{
    balanced_finrep_figures, dora_figures, fixed_time, institution_profile,
    write_sample_templates, ManualClock, MockDataSource, MockReportRepository,
    ReportRequestBuilder, SAMPLE_TEMPLATE_COUNT,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    generator: ReportGenerator,
    reports: MockReportRepository,
    clock: ManualClock,
}

impl Harness {
    fn output_dir(&self) -> PathBuf {
        self.dir.path().join("reports")
    }

    fn output_files(&self) -> Vec<PathBuf> {
        let dir = self.output_dir();
        if !dir.exists() {
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        files.sort();
        files
    }
}

fn reporting_config(dir: &Path) -> ReportingConfig {
    ReportingConfig {
        template_dir: dir.join("templates").display().to_string(),
        output_dir: dir.join("reports").display().to_string(),
        ..ReportingConfig::default()
    }
}

async fn harness(source: MockDataSource) -> Harness {
    let dir = TempDir::new().unwrap();
    write_sample_templates(&dir.path().join("templates")).unwrap();

    let reports = MockReportRepository::new();
    let clock = ManualClock::new(fixed_time());
    let generator = ReportGenerator::initialize(
        &reporting_config(dir.path()),
        Arc::new(source),
        Arc::new(reports.clone()),
        Arc::new(clock.clone()),
    )
    .await
    .unwrap();

    Harness {
        dir,
        generator,
        reports,
        clock,
    }
}

fn finrep_source(figures: regreport_core::ReportData) -> MockDataSource {
    MockDataSource::new()
        .with_profile("INST_001", institution_profile())
        .with_figures(ReportType::Finrep, "INST_001", "2024-Q1", figures)
}

mod generation_tests {
    use super::*;

    #[tokio::test]
    async fn test_finrep_xbrl_generation() {
        let h = harness(finrep_source(balanced_finrep_figures())).await;
        let request = ReportRequestBuilder::new().with_report_id("r-1").build();

        let result = h.generator.generate_report(request).await;

        assert_eq!(result.status, ReportStatus::Completed, "{:?}", result.error_message);
        assert!(result.validation_results.is_valid());
        let path = PathBuf::from(result.file_path.clone().unwrap());
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "FINREP_2024-Q1_20240628_090000.xbrl"
        );

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(result.file_size, Some(bytes.len() as u64));
        assert_eq!(result.checksum.clone().unwrap(), hex::encode(Sha256::digest(&bytes)));

        let content = String::from_utf8(bytes).unwrap();
        assert!(content.contains("eba:Assets"));
        assert!(content.contains("finrep_cor.xsd"));

        assert_eq!(
            h.reports.status_history("r-1"),
            vec![
                ReportStatus::Generating,
                ReportStatus::Validating,
                ReportStatus::Completed
            ]
        );
        let stored = h.reports.get_report("r-1").await.unwrap().unwrap();
        assert_eq!(stored.checksum, result.checksum.unwrap());
        assert_eq!(stored.format, ReportFormat::Xbrl);
    }

    #[tokio::test]
    async fn test_dora_json_document() {
        let source = MockDataSource::new()
            .with_profile("INST_001", institution_profile())
            .with_figures(ReportType::DoraIct, "INST_001", "2023", dora_figures());
        let h = harness(source).await;
        let request = ReportRequestBuilder::new()
            .with_report_type(ReportType::DoraIct)
            .with_format(ReportFormat::Json)
            .with_period("2023")
            .build();

        let result = h.generator.generate_report(request).await;
        assert!(result.is_success(), "{:?}", result.error_message);

        let content = std::fs::read_to_string(result.file_path.unwrap()).unwrap();
        let document: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(document["metadata"]["version"], "2.1.0");
        assert_eq!(document["metadata"]["generated_at"], "2024-06-28T09:00:00Z");
        assert_eq!(document["data"]["ict_incidents_count"], 12);
        assert_eq!(document["data"]["institution_name"], "Test Bank AG");
        assert_eq!(document["data"]["reporting_period"], "2023");
    }

    #[tokio::test]
    async fn test_custom_csv_template() {
        let source = MockDataSource::new().with_figures(
            ReportType::Custom,
            "INST_001",
            "2024-03",
            json!({"name": "Test Bank", "amount": 1234.5})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let dir = TempDir::new().unwrap();
        let mut registry = TemplateRegistry::new();
        let config: CsvTemplateConfig =
            serde_json::from_value(json!({"headers": ["name", "amount"]})).unwrap();
        registry.insert(
            CsvTemplate::from_config("csv_custom", PathBuf::from("custom.json"), config)
                .unwrap()
                .into(),
        );
        let generator = ReportGenerator::new(
            registry,
            Arc::new(source),
            Arc::new(MockReportRepository::new()),
            Arc::new(ManualClock::new(fixed_time())),
            &reporting_config(dir.path()),
        );

        let request = ReportRequestBuilder::new()
            .with_report_type(ReportType::Custom)
            .with_format(ReportFormat::Csv)
            .with_period("2024-03")
            .build();
        let result = generator.generate_report(request).await;

        assert!(result.is_success(), "{:?}", result.error_message);
        let content = std::fs::read_to_string(result.file_path.unwrap()).unwrap();
        assert_eq!(content, "name,amount\nTest Bank,1234.50\n");
        // 缺少机构信息只产生警告
        assert!(result
            .validation_results
            .warnings
            .iter()
            .any(|w| w.contains("No institution data")));
    }

    #[tokio::test]
    async fn test_identical_data_yields_identical_checksums() {
        let h = harness(finrep_source(balanced_finrep_figures())).await;

        let first = h
            .generator
            .generate_report(ReportRequestBuilder::new().build())
            .await;
        let second = h
            .generator
            .generate_report(ReportRequestBuilder::new().build())
            .await;

        assert!(first.is_success() && second.is_success());
        assert_ne!(first.report_id, second.report_id);
        assert_eq!(first.checksum, second.checksum);
        assert_ne!(first.file_path, second.file_path);
        assert!(second.file_path.unwrap().ends_with("_090000_1.xbrl"));
        assert_eq!(h.output_files().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_filled_when_figures_missing() {
        let source = MockDataSource::new().with_profile("INST_001", institution_profile());
        let h = harness(source).await;

        let result = h
            .generator
            .generate_report(ReportRequestBuilder::new().build())
            .await;

        assert!(result.is_success(), "{:?}", result.error_message);
        assert!(result
            .validation_results
            .warnings
            .iter()
            .any(|w| w.contains("zero-filled")));
    }

    #[tokio::test]
    async fn test_status_update_failures_do_not_fail_generation() {
        let h = harness(finrep_source(balanced_finrep_figures())).await;
        h.reports.fail_status_updates(true);

        let result = h
            .generator
            .generate_report(ReportRequestBuilder::new().build())
            .await;

        assert!(result.is_success());
        assert_eq!(h.reports.report_count(), 1);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_balance_sheet_violation_rejected() {
        let mut figures = balanced_finrep_figures();
        figures.insert("total_equity".to_string(), json!(50_000_000.0));
        let h = harness(finrep_source(figures)).await;

        let result = h
            .generator
            .generate_report(ReportRequestBuilder::new().with_report_id("r-bad").build())
            .await;

        assert_eq!(result.status, ReportStatus::Failed);
        assert_eq!(result.failure, Some(FailureKind::Validation));
        assert!(!result.is_retryable());
        assert!(result.file_path.is_none());
        assert!(result
            .validation_results
            .errors
            .iter()
            .any(|e| e.starts_with("Balance sheet equation violated")));
        assert!(h.output_files().is_empty());
        assert_eq!(
            h.reports.status_history("r-bad").last(),
            Some(&ReportStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_balance_sheet_checked_for_csv_output() {
        let mut figures = balanced_finrep_figures();
        figures.insert("total_liabilities".to_string(), json!(100.0));
        let h = harness(finrep_source(figures)).await;

        let request = ReportRequestBuilder::new().with_format(ReportFormat::Csv).build();
        let result = h.generator.generate_report(request).await;

        assert_eq!(result.failure, Some(FailureKind::Validation));
        assert!(h.output_files().is_empty());
    }

    #[tokio::test]
    async fn test_balance_within_tolerance_accepted() {
        let mut figures = balanced_finrep_figures();
        // 1e9 的0.1%是1e6
        figures.insert("total_equity".to_string(), json!(100_999_999.0));
        let h = harness(finrep_source(figures)).await;

        let result = h
            .generator
            .generate_report(ReportRequestBuilder::new().build())
            .await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_missing_template() {
        let h = harness(MockDataSource::new()).await;
        let request = ReportRequestBuilder::new()
            .with_report_type(ReportType::DoraIct)
            .with_format(ReportFormat::Xbrl)
            .build();

        let result = h.generator.generate_report(request).await;

        assert_eq!(result.failure, Some(FailureKind::TemplateNotFound));
        assert!(!result.is_retryable());
        assert!(result.error_message.unwrap().contains("xbrl_dora_ict"));
    }

    #[tokio::test]
    async fn test_data_source_outage_is_retryable() {
        let source = finrep_source(balanced_finrep_figures());
        source.set_unavailable(true);
        let h = harness(source).await;

        let result = h
            .generator
            .generate_report(ReportRequestBuilder::new().build())
            .await;

        assert_eq!(result.failure, Some(FailureKind::TransientIo));
        assert!(result.is_retryable());
    }

    #[tokio::test]
    async fn test_unregistered_file_removed_when_metadata_write_fails() {
        let h = harness(finrep_source(balanced_finrep_figures())).await;
        h.reports.fail_report_upserts(true);

        let result = h
            .generator
            .generate_report(ReportRequestBuilder::new().build())
            .await;

        assert_eq!(result.status, ReportStatus::Failed);
        assert_eq!(result.failure, Some(FailureKind::TransientIo));
        assert!(result.file_path.is_none());
        assert!(h.output_files().is_empty());

        // 重试时写入不带序号后缀的同名文件
        h.reports.fail_report_upserts(false);
        let result = h
            .generator
            .generate_report(ReportRequestBuilder::new().build())
            .await;

        assert!(result.is_success());
        let files = h.output_files();
        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0].file_name().unwrap().to_str().unwrap(),
            "FINREP_2024-Q1_20240628_090000.xbrl"
        );
    }
}

mod maintenance_tests {
    use super::*;

    fn stored(report_id: &str, path: &Path, age_days: i64) -> StoredReport {
        StoredReport {
            report_id: report_id.to_string(),
            report_type: ReportType::Finrep,
            format: ReportFormat::Xbrl,
            reporting_period: "2023-Q4".to_string(),
            institution_id: "INST_001".to_string(),
            file_path: path.display().to_string(),
            file_size: 10,
            checksum: "00".to_string(),
            created_at: fixed_time() - Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn test_cleanup_old_reports() {
        let h = harness(MockDataSource::new()).await;
        let old_file = h.output_dir().join("old.xbrl");
        std::fs::write(&old_file, "old").unwrap();
        let recent_file = h.output_dir().join("recent.xbrl");
        std::fs::write(&recent_file, "recent").unwrap();

        h.reports.insert_report(stored("old", &old_file, 120));
        h.reports
            .insert_report(stored("vanished", &h.output_dir().join("gone.xbrl"), 100));
        h.reports.insert_report(stored("recent", &recent_file, 10));

        let purged = h.generator.cleanup_old_reports().await.unwrap();

        assert_eq!(purged, 2);
        assert!(!old_file.exists());
        assert!(recent_file.exists());
        assert!(h.reports.get_report("vanished").await.unwrap().is_none());
        assert!(h.reports.get_report("recent").await.unwrap().is_some());

        // 时间推进后最近的报告也会过期
        h.clock.advance(Duration::days(81));
        assert_eq!(h.generator.cleanup_old_reports().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_templates_and_metrics() {
        let h = harness(finrep_source(balanced_finrep_figures())).await;

        let templates = h.generator.list_available_templates();
        assert_eq!(templates.len(), SAMPLE_TEMPLATE_COUNT);
        assert!(templates.iter().any(|t| t.key == "xbrl_finrep" && t.version == "3.2.0"));
        assert!(templates.iter().any(|t| t.key == "json_dora_ict" && t.version == "2.1.0"));

        h.generator
            .generate_report(ReportRequestBuilder::new().build())
            .await;
        h.generator
            .generate_report(
                ReportRequestBuilder::new()
                    .with_report_type(ReportType::Custom)
                    .with_format(ReportFormat::Xbrl)
                    .build(),
            )
            .await;

        let metrics = h.generator.metrics();
        assert_eq!(metrics.reports_generated, 1);
        assert_eq!(metrics.reports_failed, 1);
        assert_eq!(metrics.templates_loaded, SAMPLE_TEMPLATE_COUNT);
        assert!(metrics.avg_generation_time >= 0.0);
    }

    #[tokio::test]
    async fn test_validate_report_data_and_status_lookup() {
        let h = harness(finrep_source(balanced_finrep_figures())).await;

        let mut data = institution_profile();
        data.extend(balanced_finrep_figures());
        data.insert("reporting_period".to_string(), json!("2024-Q1"));
        let outcome = h
            .generator
            .validate_report_data(ReportType::Finrep, ReportFormat::Xbrl, &data);
        assert!(outcome.is_valid(), "{:?}", outcome.errors);

        data.remove("total_assets");
        let outcome = h
            .generator
            .validate_report_data(ReportType::Finrep, ReportFormat::Xbrl, &data);
        assert!(outcome
            .errors
            .contains(&"Missing required field: total_assets".to_string()));

        let outcome = h
            .generator
            .validate_report_data(ReportType::DoraIct, ReportFormat::Csv, &data);
        assert!(!outcome.is_valid());

        h.generator
            .generate_report(ReportRequestBuilder::new().with_report_id("lookup").build())
            .await;
        let status = h.generator.get_report_status("lookup").await.unwrap().unwrap();
        assert_eq!(status.status, ReportStatus::Completed);
        assert!(h.generator.get_report_status("unknown").await.unwrap().is_none());
    }
}
