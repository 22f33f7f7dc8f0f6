//! 监管报告系统的核心类型：领域模型、错误、事件以及仓库与服务接口。

pub mod clock;
pub mod errors;
pub mod events;
pub mod models;
pub mod traits;

pub use clock::{Clock, SystemClock};
pub use errors::{ReportingError, ReportingResult};
pub use events::{EventTopic, SchedulerEvent};
pub use models::*;
pub use traits::*;
