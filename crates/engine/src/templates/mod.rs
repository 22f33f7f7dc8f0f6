//! 报告模板
//!
//! 模板是按格式区分的封闭集合：[`XbrlTemplate`]、[`CsvTemplate`]、[`JsonTemplate`]。
//! 模板在启动时加载一次，之后只读；验证与生成都是纯函数。

pub mod csv;
pub mod json;
pub mod taxonomy;
pub mod xbrl;

use std::path::Path;

use chrono::{DateTime, Utc};
use regreport_core::{ReportData, ReportFormat, ReportingResult, ValidationOutcome};

pub use self::csv::{CsvTemplate, CsvTemplateConfig, FieldRule, FieldType};
pub use self::json::JsonTemplate;
pub use self::xbrl::XbrlTemplate;

/// 模板文件未声明版本时使用的版本号
pub const DEFAULT_TEMPLATE_VERSION: &str = "1.0";

/// 生成报告时由调用方提供的上下文
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum ReportTemplate {
    Xbrl(XbrlTemplate),
    Csv(CsvTemplate),
    Json(JsonTemplate),
}

impl ReportTemplate {
    /// 按格式加载模板文件
    pub fn load(format: ReportFormat, path: &Path) -> ReportingResult<Self> {
        match format {
            ReportFormat::Xbrl => Ok(ReportTemplate::Xbrl(XbrlTemplate::load(path)?)),
            ReportFormat::Csv => Ok(ReportTemplate::Csv(CsvTemplate::load(path)?)),
            ReportFormat::Json => Ok(ReportTemplate::Json(JsonTemplate::load(path)?)),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            ReportTemplate::Xbrl(t) => t.key(),
            ReportTemplate::Csv(t) => t.key(),
            ReportTemplate::Json(t) => t.key(),
        }
    }

    pub fn version(&self) -> &str {
        match self {
            ReportTemplate::Xbrl(t) => t.version(),
            ReportTemplate::Csv(t) => t.version(),
            ReportTemplate::Json(t) => t.version(),
        }
    }

    pub fn format(&self) -> ReportFormat {
        match self {
            ReportTemplate::Xbrl(_) => ReportFormat::Xbrl,
            ReportTemplate::Csv(_) => ReportFormat::Csv,
            ReportTemplate::Json(_) => ReportFormat::Json,
        }
    }

    pub fn source_path(&self) -> &Path {
        match self {
            ReportTemplate::Xbrl(t) => t.path(),
            ReportTemplate::Csv(t) => t.path(),
            ReportTemplate::Json(t) => t.path(),
        }
    }

    pub fn validate(&self, data: &ReportData) -> ValidationOutcome {
        match self {
            ReportTemplate::Xbrl(t) => t.validate(data),
            ReportTemplate::Csv(t) => t.validate(data),
            ReportTemplate::Json(t) => t.validate(data),
        }
    }

    pub fn generate(&self, data: &ReportData, context: &RenderContext) -> ReportingResult<String> {
        match self {
            ReportTemplate::Xbrl(t) => t.generate(data),
            ReportTemplate::Csv(t) => t.generate(data),
            ReportTemplate::Json(t) => t.generate(data, context.generated_at),
        }
    }
}

impl From<XbrlTemplate> for ReportTemplate {
    fn from(template: XbrlTemplate) -> Self {
        ReportTemplate::Xbrl(template)
    }
}

impl From<CsvTemplate> for ReportTemplate {
    fn from(template: CsvTemplate) -> Self {
        ReportTemplate::Csv(template)
    }
}

impl From<JsonTemplate> for ReportTemplate {
    fn from(template: JsonTemplate) -> Self {
        ReportTemplate::Json(template)
    }
}
