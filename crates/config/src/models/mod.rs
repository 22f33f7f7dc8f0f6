pub mod app_config;
pub mod database;
pub mod events;
pub mod logging;
pub mod reporting;
pub mod scheduler;

pub use app_config::AppConfig;
pub use database::DatabaseConfig;
pub use events::EventsConfig;
pub use logging::LoggingConfig;
pub use reporting::ReportingConfig;
pub use scheduler::{ResourcePoolsConfig, SchedulerConfig};
