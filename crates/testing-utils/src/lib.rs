//! # Regreport Testing Utils
//!
//! 工作区共享的测试工具：
//!
//! - **Mock Repositories**: 所有仓库接口的内存实现
//! - **Mock Services**: 事件发布、报告生成、时钟的测试替身
//! - **Builders**: 报告计划、作业、生成请求和样例数据的构建器
//! - **Fixtures**: 在临时目录中写入示例模板
//!
//! ```rust,ignore
//! use regreport_testing_utils::{MockJobRepository, ScheduleBuilder};
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
