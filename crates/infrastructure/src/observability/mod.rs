//! Observability helpers
//!
//! 结构化生命周期日志；指标直接通过 `metrics` 门面记录，不安装导出器。

pub mod structured_logger;

pub use structured_logger::StructuredLogger;
