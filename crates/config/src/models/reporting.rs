use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 报告生成配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportingConfig {
    /// 模板根目录，包含 xbrl/、csv/、json/ 子目录
    pub template_dir: String,
    pub output_dir: String,
    pub report_retention_days: i64,
    pub template_version: String,
    pub delivery_method: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            template_dir: "templates".to_string(),
            output_dir: "reports".to_string(),
            report_retention_days: 90,
            template_version: "3.2.0".to_string(),
            delivery_method: "SFTP".to_string(),
        }
    }
}

impl ConfigValidator for ReportingConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.template_dir, "reporting.template_dir")?;
        ValidationUtils::validate_not_empty(&self.output_dir, "reporting.output_dir")?;
        ValidationUtils::validate_positive(
            self.report_retention_days,
            "reporting.report_retention_days",
        )?;
        ValidationUtils::validate_not_empty(&self.template_version, "reporting.template_version")?;
        Ok(())
    }
}
