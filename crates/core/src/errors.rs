use thiserror::Error;

/// 报告系统错误类型定义
#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("模板未找到: {key}")]
    TemplateNotFound { key: String },

    #[error("模板加载失败: {path} - {message}")]
    TemplateLoad { path: String, message: String },

    #[error("数据验证失败: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("报告计划未找到: {id}")]
    ScheduleNotFound { id: String },

    #[error("作业未找到: {id}")]
    JobNotFound { id: String },

    #[error("无效的报告期间: {0}")]
    InvalidReportingPeriod(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("事件发布失败: {0}")]
    EventPublish(String),

    #[error("数据源错误: {0}")]
    DataSource(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ReportingError {
    /// 是否属于可重试的瞬时错误（数据库、文件系统、外部数据源）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReportingError::Database(_)
                | ReportingError::Io(_)
                | ReportingError::DataSource(_)
                | ReportingError::EventPublish(_)
        )
    }
}

impl From<serde_json::Error> for ReportingError {
    fn from(err: serde_json::Error) -> Self {
        ReportingError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type ReportingResult<T> = std::result::Result<T, ReportingError>;
