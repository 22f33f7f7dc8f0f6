//! 监管合规报告生成与调度服务
//!
//! 装配数据库、报告生成引擎、事件总线与调度器。

pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application, GenerateArgs};
pub use shutdown::ShutdownManager;
