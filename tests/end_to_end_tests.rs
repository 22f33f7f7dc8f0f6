#[cfg(test)]
mod end_to_end_tests {
    use std::path::Path;
    use std::sync::Arc;

    use chrono::Duration;
    use regreport::{Application, GenerateArgs};
    use regreport_config::AppConfig;
    use regreport_core::{
        JobStatus, ReportFormat, ReportRepository, ReportStatus, ReportType, ScheduleRepository,
    };
    use regreport_infrastructure::{SqliteReportRepository, SqliteScheduleRepository};
    use regreport_testing_utils::{
        fixed_time, write_sample_templates, ManualClock, ScheduleBuilder, SAMPLE_TEMPLATE_COUNT,
    };
    use tempfile::TempDir;

    fn test_config(templates: &Path, output: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.reporting.template_dir = templates.display().to_string();
        config.reporting.output_dir = output.display().to_string();
        config.scheduler.seed_default_schedules = false;
        config
    }

    async fn setup(total_equity: f64) -> (Application, Arc<ManualClock>, TempDir) {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        write_sample_templates(&templates).unwrap();
        let output = dir.path().join("reports");

        let clock = Arc::new(ManualClock::new(fixed_time() - Duration::minutes(1)));
        let app = Application::with_clock(test_config(&templates, &output), clock.clone())
            .await
            .unwrap();

        let pool = app.database().pool();
        sqlx::query(
            "INSERT INTO institutions (institution_id, institution_name, institution_code) \
             VALUES ('INST_001', 'Example Bank AG', 'EXBKDEFF')",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO finrep_data (institution_id, reporting_period, total_assets, \
             total_liabilities, total_equity, net_profit) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind("INST_001")
        .bind("2024-Q1")
        .bind(1_000_000_000.0_f64)
        .bind(900_000_000.0_f64)
        .bind(total_equity)
        .bind(15_000_000.0_f64)
        .execute(pool)
        .await
        .unwrap();

        (app, clock, dir)
    }

    #[tokio::test]
    async fn test_generate_finrep_from_database() {
        let (app, _clock, _dir) = setup(100_000_000.0).await;
        assert_eq!(
            app.generator().list_available_templates().len(),
            SAMPLE_TEMPLATE_COUNT
        );

        let result = app
            .generate(GenerateArgs {
                report_type: ReportType::Finrep,
                format: None,
                reporting_period: "2024-Q1".to_string(),
                institution_id: None,
            })
            .await
            .unwrap();

        assert_eq!(result.status, ReportStatus::Completed, "{:?}", result.error_message);
        let path = result.file_path.clone().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Example Bank AG") || content.contains("EXBKDEFF"));
        assert_eq!(result.checksum.as_ref().map(String::len), Some(64));

        let reports = SqliteReportRepository::new(app.database().pool().clone());
        let stored = reports.get_report(&result.report_id).await.unwrap().unwrap();
        assert_eq!(stored.file_path, path);
        assert_eq!(stored.format, ReportFormat::Xbrl);
        let status = reports.get_status(&result.report_id).await.unwrap().unwrap();
        assert_eq!(status.status, ReportStatus::Completed);
    }

    #[tokio::test]
    async fn test_generate_rejects_unbalanced_sheet() {
        let (app, _clock, _dir) = setup(50_000_000.0).await;

        let result = app
            .generate(GenerateArgs {
                report_type: ReportType::Finrep,
                format: Some(ReportFormat::Xbrl),
                reporting_period: "2024-Q1".to_string(),
                institution_id: Some("INST_001".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(result.status, ReportStatus::Failed);
        assert!(result.file_path.is_none());
        assert!(!result.validation_results.errors.is_empty());
    }

    #[tokio::test]
    async fn test_generate_rejects_malformed_period() {
        let (app, _clock, _dir) = setup(100_000_000.0).await;
        let outcome = app
            .generate(GenerateArgs {
                report_type: ReportType::Finrep,
                format: None,
                reporting_period: "Q1-2024".to_string(),
                institution_id: None,
            })
            .await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_scheduled_pipeline_on_sqlite() {
        let (app, clock, _dir) = setup(100_000_000.0).await;
        let mut events = app.events().subscribe();
        let scheduler = app.scheduler();

        let schedule = scheduler
            .create_schedule(ScheduleBuilder::new().with_id("finrep_q").build())
            .await
            .unwrap();
        assert_eq!(schedule.next_run_time, Some(fixed_time()));

        clock.advance(Duration::minutes(1));
        let created = scheduler.check_schedules().await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].reporting_period, "2024-Q1");

        // 同一期间不会重复创建
        assert!(scheduler.check_schedules().await.unwrap().is_empty());

        let finished = scheduler.run_until_idle().await.unwrap();
        assert_eq!(finished.len(), 1);
        let job = scheduler.get_job(&created[0].job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let result = job.result_data.unwrap();
        assert!(Path::new(result.file_path.as_deref().unwrap()).exists());

        let stored = SqliteScheduleRepository::new(app.database().pool().clone())
            .get_by_id("finrep_q")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_run_time, Some(fixed_time()));
        assert_eq!(
            stored.next_run_time,
            Some(fixed_time() + Duration::days(92))
        );

        let mut seen = Vec::new();
        while let Ok(envelope) = events.try_recv() {
            seen.push(envelope.event_type);
        }
        assert_eq!(seen, vec!["schedule.created", "job.created", "job.completed"]);

        let metrics = scheduler.metrics().await.unwrap();
        assert_eq!(metrics.jobs_completed, 1);
        assert_eq!(metrics.schedules_active, 1);
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let (app, _clock, _dir) = setup(100_000_000.0).await;
        assert_eq!(app.seed().await.unwrap(), 3);
        assert_eq!(app.seed().await.unwrap(), 0);

        let count = SqliteScheduleRepository::new(app.database().pool().clone())
            .count()
            .await
            .unwrap();
        assert_eq!(count, 3);
    }
}
