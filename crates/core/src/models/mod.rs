//! # 数据模型
//!
//! 监管报告系统的核心数据结构：报告请求与结果、报告计划、调度作业、报告期间和资源池快照。
//!
//! 状态类枚举在数据库中以大写字符串存储，结构化字段（结果数据、资源分配、依赖列表）
//! 在应用层是强类型结构体，只在持久化边界编码为JSON。

/// 为以字符串存储的枚举实现 SQLite 编解码
///
/// 要求类型实现 `as_str()` 与 `FromStr`。
macro_rules! impl_sqlite_text_enum {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Sqlite> for $ty {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <str as sqlx::Type<sqlx::Sqlite>>::type_info()
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $ty {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                s.parse::<$ty>().map_err(Into::into)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Sqlite>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

pub mod job;
pub mod period;
pub mod report;
pub mod resource;
pub mod schedule;

pub use job::{JobResultData, JobStatus, ResourceAllocation, ScheduledJob};
pub use period::{ReportingCadence, ReportingPeriod};
pub use report::{
    FailureKind, ReportData, ReportFormat, ReportRequest, ReportResult, ReportStatus,
    ReportStatusRecord, ReportType, StoredReport, ValidationOutcome,
};
pub use resource::ResourcePoolSnapshot;
pub use schedule::{Priority, ResourceRequirements, ScheduleDefinition, ScheduleStatus};
