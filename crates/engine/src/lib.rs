//! 监管报告生成引擎
//!
//! 按格式（XBRL、CSV、JSON）加载报告模板，收集机构数据，验证并序列化为报告文件。

pub mod data;
pub mod generator;
pub mod registry;
pub mod templates;

pub use data::ReportDataGatherer;
pub use generator::{GeneratorMetrics, ReportGenerator};
pub use registry::{TemplateInfo, TemplateRegistry};
pub use templates::{RenderContext, ReportTemplate};
