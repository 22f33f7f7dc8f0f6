#[cfg(test)]
mod repository_tests {
    use chrono::{Duration, Utc};
    use regreport_config::DatabaseConfig;
    use regreport_core::{
        JobRepository, JobResultData, JobStatus, Priority, ReportDataSource, ReportFormat,
        ReportRepository, ReportStatus, ReportStatusRecord, ReportType, ScheduleRepository,
        ScheduleStatus, StoredReport, ValidationOutcome,
    };
    use regreport_infrastructure::{
        DatabaseManager, SqliteJobRepository, SqliteReportDataSource, SqliteReportRepository,
        SqliteScheduleRepository,
    };
    use regreport_testing_utils::{fixed_time, JobBuilder, ScheduleBuilder};

    async fn setup() -> DatabaseManager {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        };
        DatabaseManager::connect_and_migrate(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_schedule_round_trip_and_due_query() {
        let db = setup().await;
        let repo = SqliteScheduleRepository::new(db.pool().clone());

        let due = ScheduleBuilder::new()
            .with_id("finrep_q")
            .with_priority(Priority::Critical)
            .with_dependencies(&["corep_q"])
            .with_next_run_time(fixed_time() - Duration::minutes(1))
            .build();
        let later = ScheduleBuilder::new()
            .with_id("corep_q")
            .with_report_type(ReportType::Corep)
            .with_next_run_time(fixed_time() + Duration::hours(1))
            .build();
        let paused = ScheduleBuilder::new()
            .with_id("dora_y")
            .with_status(ScheduleStatus::Paused)
            .with_next_run_time(fixed_time() - Duration::hours(1))
            .build();
        for schedule in [&due, &later, &paused] {
            repo.create(schedule).await.unwrap();
        }

        let loaded = repo.get_by_id("finrep_q").await.unwrap().unwrap();
        assert_eq!(loaded, due);
        assert_eq!(repo.count().await.unwrap(), 3);

        let found = repo.find_due(fixed_time()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].schedule_id, "finrep_q");

        let mut updated = loaded.clone();
        updated.status = ScheduleStatus::Paused;
        updated.last_run_time = Some(fixed_time());
        repo.update(&updated).await.unwrap();
        assert!(repo.find_due(fixed_time()).await.unwrap().is_empty());
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_schedule_fails() {
        let db = setup().await;
        let repo = SqliteScheduleRepository::new(db.pool().clone());
        let schedule = ScheduleBuilder::new().with_id("ghost").build();
        assert!(repo.update(&schedule).await.is_err());
    }

    #[tokio::test]
    async fn test_job_persistence_preserves_structured_fields() {
        let db = setup().await;
        let repo = SqliteJobRepository::new(db.pool().clone());

        let mut job = JobBuilder::new()
            .with_id("job-1")
            .with_dependencies(&["corep_q"])
            .build();
        repo.create(&job).await.unwrap();

        job.status = JobStatus::Completed;
        job.completed_time = Some(fixed_time());
        job.result_data = Some(JobResultData {
            report_id: "job-1".to_string(),
            file_path: Some("/tmp/FINREP_INST_001_2024-Q1.xml".to_string()),
            file_size: Some(2048),
            checksum: Some("ab".repeat(32)),
            validation_results: ValidationOutcome::new(),
        });
        repo.update(&job).await.unwrap();

        let loaded = repo.get_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert!(!loaded.dependencies_met);
        assert_eq!(loaded.dependency_jobs, vec!["corep_q".to_string()]);
    }

    #[tokio::test]
    async fn test_dependency_status_by_job_or_schedule() {
        let db = setup().await;
        let repo = SqliteJobRepository::new(db.pool().clone());

        let old = JobBuilder::new()
            .with_id("corep-old")
            .with_schedule_id("corep_q")
            .with_status(JobStatus::Failed)
            .with_created_at(fixed_time() - Duration::hours(2))
            .build();
        let latest = JobBuilder::new()
            .with_id("corep-new")
            .with_schedule_id("corep_q")
            .completed_at(fixed_time())
            .with_created_at(fixed_time() - Duration::hours(1))
            .build();
        repo.create(&old).await.unwrap();
        repo.create(&latest).await.unwrap();

        assert_eq!(
            repo.latest_dependency_status("corep_q", "2024-Q1").await.unwrap(),
            Some(JobStatus::Completed)
        );
        assert_eq!(
            repo.latest_dependency_status("corep-old", "2024-Q1").await.unwrap(),
            Some(JobStatus::Failed)
        );
        assert_eq!(
            repo.latest_dependency_status("corep_q", "2024-Q2").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_status_and_dependency_queries() {
        let db = setup().await;
        let repo = SqliteJobRepository::new(db.pool().clone());

        let queued = JobBuilder::new().with_id("a").with_status(JobStatus::Queued).build();
        let waiting = JobBuilder::new()
            .with_id("b")
            .with_status(JobStatus::Queued)
            .with_dependencies(&["corep_q"])
            .build();
        let future_waiting = JobBuilder::new()
            .with_id("c")
            .with_status(JobStatus::Scheduled)
            .with_dependencies(&["corep_q"])
            .with_scheduled_time(fixed_time() + Duration::days(3))
            .build();
        let running = JobBuilder::new().with_id("d").with_status(JobStatus::Running).build();
        for job in [&queued, &waiting, &future_waiting, &running] {
            repo.create(job).await.unwrap();
        }

        let runnable = repo
            .find_by_status(&[JobStatus::Queued, JobStatus::Scheduled])
            .await
            .unwrap();
        assert_eq!(runnable.len(), 3);
        assert!(repo.find_by_status(&[]).await.unwrap().is_empty());

        let horizon = fixed_time() + Duration::hours(1);
        let ids: Vec<_> = repo
            .find_waiting_on_dependencies(horizon)
            .await
            .unwrap()
            .into_iter()
            .map(|job| job.job_id)
            .collect();
        assert_eq!(ids, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_finished_before_keeps_failed_and_recent() {
        let db = setup().await;
        let repo = SqliteJobRepository::new(db.pool().clone());
        let cutoff = fixed_time() - Duration::days(30);

        let old_done = JobBuilder::new()
            .with_id("old")
            .completed_at(cutoff - Duration::days(1))
            .build();
        let recent_done = JobBuilder::new().with_id("recent").completed_at(fixed_time()).build();
        let mut old_failed = JobBuilder::new()
            .with_id("failed")
            .with_status(JobStatus::Failed)
            .build();
        old_failed.completed_time = Some(cutoff - Duration::days(5));
        for job in [&old_done, &recent_done, &old_failed] {
            repo.create(job).await.unwrap();
        }

        assert_eq!(repo.delete_finished_before(cutoff).await.unwrap(), 1);
        assert!(repo.get_by_id("old").await.unwrap().is_none());
        assert!(repo.get_by_id("recent").await.unwrap().is_some());
        assert!(repo.get_by_id("failed").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_report_status_upsert_and_delete() {
        let db = setup().await;
        let repo = SqliteReportRepository::new(db.pool().clone());

        for status in [ReportStatus::Pending, ReportStatus::Generating, ReportStatus::Completed] {
            repo.upsert_status(&ReportStatusRecord {
                report_id: "rep-1".to_string(),
                status,
                error_message: None,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        let record = repo.get_status("rep-1").await.unwrap().unwrap();
        assert_eq!(record.status, ReportStatus::Completed);

        let report = StoredReport {
            report_id: "rep-1".to_string(),
            report_type: ReportType::Finrep,
            format: ReportFormat::Xbrl,
            reporting_period: "2024-Q1".to_string(),
            institution_id: "INST_001".to_string(),
            file_path: "/tmp/rep-1.xml".to_string(),
            file_size: 1024,
            checksum: "00".repeat(32),
            created_at: fixed_time() - Duration::days(400),
        };
        repo.upsert_report(&report).await.unwrap();
        assert_eq!(repo.get_report("rep-1").await.unwrap(), Some(report));

        let old = repo.find_reports_created_before(fixed_time()).await.unwrap();
        assert_eq!(old.len(), 1);

        repo.delete_report("rep-1").await.unwrap();
        assert!(repo.get_report("rep-1").await.unwrap().is_none());
        assert!(repo.get_status("rep-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_data_source_reads_typed_columns() {
        let db = setup().await;
        sqlx::query(
            "INSERT INTO institutions (institution_id, institution_name, institution_code) \
             VALUES ('INST_001', 'Example Bank AG', 'EXBKDEFF')",
        )
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO dora_data (institution_id, reporting_period, ict_incidents_count, \
             major_incidents_count, recovery_time_objective) VALUES ('INST_001', '2023', 12, 2, 4.5)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let source = SqliteReportDataSource::new(db.pool().clone());

        let profile = source.institution_profile("INST_001").await.unwrap().unwrap();
        assert_eq!(profile["institution_name"], "Example Bank AG");
        assert_eq!(profile["currency"], "EUR");
        assert!(source.institution_profile("INST_404").await.unwrap().is_none());

        let figures = source
            .report_figures(ReportType::DoraIct, "INST_001", "2023")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(figures["ict_incidents_count"], 12);
        assert_eq!(figures["recovery_time_objective"], 4.5);
        assert!(!figures.contains_key("institution_id"));

        assert!(source
            .report_figures(ReportType::Finrep, "INST_001", "2024-Q1")
            .await
            .unwrap()
            .is_none());
        assert!(source
            .report_figures(ReportType::Custom, "INST_001", "2024-Q1")
            .await
            .unwrap()
            .is_none());
    }
}
