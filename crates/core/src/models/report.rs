use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::period::ReportingCadence;
use super::schedule::Priority;

/// 报告数据：上游数据以不透明的键值对形式进入模板
pub type ReportData = serde_json::Map<String, serde_json::Value>;

/// 监管报告类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReportType {
    #[serde(rename = "FINREP")]
    Finrep,
    #[serde(rename = "COREP")]
    Corep,
    #[serde(rename = "DORA_ICT")]
    DoraIct,
    #[serde(rename = "CUSTOM")]
    Custom,
}

impl ReportType {
    pub const ALL: [ReportType; 4] = [
        ReportType::Finrep,
        ReportType::Corep,
        ReportType::DoraIct,
        ReportType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Finrep => "FINREP",
            ReportType::Corep => "COREP",
            ReportType::DoraIct => "DORA_ICT",
            ReportType::Custom => "CUSTOM",
        }
    }

    /// 模板键与资源池使用的小写名称
    pub fn key(&self) -> &'static str {
        match self {
            ReportType::Finrep => "finrep",
            ReportType::Corep => "corep",
            ReportType::DoraIct => "dora_ict",
            ReportType::Custom => "custom",
        }
    }

    pub fn cadence(&self) -> ReportingCadence {
        match self {
            ReportType::Finrep | ReportType::Corep => ReportingCadence::Quarterly,
            ReportType::DoraIct => ReportingCadence::Annual,
            ReportType::Custom => ReportingCadence::Monthly,
        }
    }

    /// 该类型报告默认占用的资源池
    pub fn resource_pool(&self) -> &'static str {
        match self {
            ReportType::Finrep => "finrep",
            ReportType::Corep => "corep",
            ReportType::DoraIct => "dora",
            ReportType::Custom => "general",
        }
    }

    pub fn default_format(&self) -> ReportFormat {
        match self {
            ReportType::Finrep | ReportType::Corep => ReportFormat::Xbrl,
            ReportType::DoraIct | ReportType::Custom => ReportFormat::Json,
        }
    }

    /// 是否包含资产负债表
    pub fn has_balance_sheet(&self) -> bool {
        matches!(self, ReportType::Finrep)
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FINREP" => Ok(ReportType::Finrep),
            "COREP" => Ok(ReportType::Corep),
            "DORA_ICT" => Ok(ReportType::DoraIct),
            "CUSTOM" => Ok(ReportType::Custom),
            _ => Err(format!("Invalid report type: {s}")),
        }
    }
}

impl_sqlite_text_enum!(ReportType);

/// 报告输出格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReportFormat {
    #[serde(rename = "XBRL")]
    Xbrl,
    #[serde(rename = "CSV")]
    Csv,
    #[serde(rename = "JSON")]
    Json,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [ReportFormat::Xbrl, ReportFormat::Csv, ReportFormat::Json];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Xbrl => "XBRL",
            ReportFormat::Csv => "CSV",
            ReportFormat::Json => "JSON",
        }
    }

    /// 小写名称，同时也是模板子目录名和文件扩展名
    pub fn key(&self) -> &'static str {
        match self {
            ReportFormat::Xbrl => "xbrl",
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.key()
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "XBRL" => Ok(ReportFormat::Xbrl),
            "CSV" => Ok(ReportFormat::Csv),
            "JSON" => Ok(ReportFormat::Json),
            _ => Err(format!("Invalid report format: {s}")),
        }
    }
}

impl_sqlite_text_enum!(ReportFormat);

/// 报告生成状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReportStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "GENERATING")]
    Generating,
    #[serde(rename = "VALIDATING")]
    Validating,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "PENDING",
            ReportStatus::Generating => "GENERATING",
            ReportStatus::Validating => "VALIDATING",
            ReportStatus::Completed => "COMPLETED",
            ReportStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReportStatus::Pending),
            "GENERATING" => Ok(ReportStatus::Generating),
            "VALIDATING" => Ok(ReportStatus::Validating),
            "COMPLETED" => Ok(ReportStatus::Completed),
            "FAILED" => Ok(ReportStatus::Failed),
            _ => Err(format!("Invalid report status: {s}")),
        }
    }
}

impl_sqlite_text_enum!(ReportStatus);

/// 报告生成失败的类别，调用方据此决定是否重试
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureKind {
    #[serde(rename = "TEMPLATE_NOT_FOUND")]
    TemplateNotFound,
    #[serde(rename = "VALIDATION")]
    Validation,
    #[serde(rename = "TRANSIENT_IO")]
    TransientIo,
}

impl FailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::TransientIo)
    }
}

/// 验证结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        let mut outcome = Self::new();
        outcome.add_error(error);
        outcome
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.valid = false;
        self.errors.push(error.into());
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn merge(&mut self, other: ValidationOutcome) {
        self.valid = self.valid && other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_valid(&self) -> bool {
        self.valid && self.errors.is_empty()
    }
}

/// 报告生成请求，每次尝试创建一次，之后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportRequest {
    pub report_id: String,
    pub report_type: ReportType,
    pub format: ReportFormat,
    pub reporting_period: String,
    pub institution_id: String,
    pub jurisdiction: String,
    pub template_version: String,
    pub data_sources: Vec<String>,
    pub delivery_method: String,
    pub deadline: DateTime<Utc>,
    pub priority: Priority,
}

impl ReportRequest {
    pub fn template_key(&self) -> String {
        format!("{}_{}", self.format.key(), self.report_type.key())
    }
}

/// 报告生成结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportResult {
    pub report_id: String,
    pub status: ReportStatus,
    pub file_path: Option<String>,
    pub file_size: Option<u64>,
    pub checksum: Option<String>,
    pub validation_results: ValidationOutcome,
    /// 生成耗时（秒）
    pub generation_time: f64,
    pub error_message: Option<String>,
    pub failure: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
}

impl ReportResult {
    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Completed
    }

    pub fn is_retryable(&self) -> bool {
        self.failure.map(|kind| kind.is_retryable()).unwrap_or(false)
    }
}

/// 已持久化的报告文件元数据
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredReport {
    pub report_id: String,
    pub report_type: ReportType,
    pub format: ReportFormat,
    pub reporting_period: String,
    pub institution_id: String,
    pub file_path: String,
    pub file_size: i64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// 报告状态记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportStatusRecord {
    pub report_id: String,
    pub status: ReportStatus,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}
