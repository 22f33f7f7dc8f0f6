pub mod sqlite_data_source;
pub mod sqlite_job_repository;
pub mod sqlite_report_repository;
pub mod sqlite_schedule_repository;

pub use sqlite_data_source::SqliteReportDataSource;
pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_report_repository::SqliteReportRepository;
pub use sqlite_schedule_repository::SqliteScheduleRepository;

use regreport_core::{Priority, ReportingError, ReportingResult};

/// 优先级以整数保存
pub(crate) fn priority_from_column(value: i32) -> ReportingResult<Priority> {
    Priority::from_value(value)
        .ok_or_else(|| ReportingError::Serialization(format!("invalid priority value: {value}")))
}
