use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::DatabaseConfig,
    events::EventsConfig,
    logging::LoggingConfig,
    reporting::ReportingConfig,
    scheduler::{ResourcePoolsConfig, SchedulerConfig},
};
use crate::validation::ConfigValidator;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub reporting: ReportingConfig,
    pub scheduler: SchedulerConfig,
    pub resource_pools: ResourcePoolsConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 加载配置：配置文件 + 环境变量覆盖（前缀 REGREPORT，层级分隔符 `__`）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/regreport.toml",
                "regreport.toml",
                "/etc/regreport/config.toml",
            ];

            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("REGREPORT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        self.database.validate()?;
        self.reporting.validate()?;
        self.scheduler.validate()?;
        self.resource_pools.validate()?;
        self.events.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.reporting.report_retention_days, 90);
        assert_eq!(config.resource_pools.dora, 2);
        assert_eq!(config.events.job_topic, "report.jobs");
        assert_eq!(config.scheduler.default_institution_id, "INST_001");
    }

    #[test]
    fn test_app_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = config;
        invalid.logging.format = "xml".to_string();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_app_config_toml_roundtrip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().expect("Failed to serialize");
        let parsed = AppConfig::from_toml(&toml_str).expect("Failed to parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_app_config_from_partial_toml() {
        let toml_str = r#"
[database]
url = "sqlite::memory:"

[reporting]
template_dir = "/srv/templates"
output_dir = "/srv/reports"
report_retention_days = 30

[scheduler]
schedule_check_interval_seconds = 15
max_retry_attempts = 5

[resource_pools]
finrep = 1
"#;

        let config = AppConfig::from_toml(toml_str).expect("Failed to parse");
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.reporting.template_dir, "/srv/templates");
        assert_eq!(config.scheduler.schedule_check_interval_seconds, 15);
        assert_eq!(config.scheduler.max_retry_attempts, 5);
        assert_eq!(config.scheduler.dependency_timeout_minutes, 1440);
        assert_eq!(config.resource_pools.finrep, 1);
        assert_eq!(config.resource_pools.general, 5);
    }

    #[test]
    fn test_app_config_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("Failed to create temp file");
        writeln!(
            file,
            "[reporting]\noutput_dir = \"out\"\n\n[events]\nscheduler_topic = \"custom.scheduler\""
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).expect("Failed to load");
        assert_eq!(config.reporting.output_dir, "out");
        assert_eq!(config.events.scheduler_topic, "custom.scheduler");
    }

    #[test]
    fn test_app_config_load_missing_file() {
        assert!(AppConfig::load(Some("/nonexistent/regreport.toml")).is_err());
    }
}
