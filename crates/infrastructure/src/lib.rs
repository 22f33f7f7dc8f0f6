//! 基础设施层：SQLite持久化、事件总线与结构化日志

pub mod database;
pub mod events;
pub mod observability;

pub use database::*;
pub use events::{BroadcastEventPublisher, EventEnvelope};
pub use observability::*;
