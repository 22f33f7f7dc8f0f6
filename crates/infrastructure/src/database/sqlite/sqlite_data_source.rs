//! 从本地SQLite表读取机构与报告数据

use async_trait::async_trait;
use regreport_core::{ReportData, ReportDataSource, ReportType, ReportingResult};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, instrument};

const KEY_COLUMNS: [&str; 2] = ["institution_id", "reporting_period"];

pub struct SqliteReportDataSource {
    pool: SqlitePool,
}

impl SqliteReportDataSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn figures_table(report_type: ReportType) -> Option<&'static str> {
        match report_type {
            ReportType::Finrep => Some("finrep_data"),
            ReportType::Corep => Some("corep_data"),
            ReportType::DoraIct => Some("dora_data"),
            ReportType::Custom => None,
        }
    }

    /// 按列的存储类型转换为JSON值，跳过主键列
    fn row_to_data(row: &SqliteRow) -> ReportingResult<ReportData> {
        let mut data = ReportData::new();
        for column in row.columns() {
            let name = column.name();
            if KEY_COLUMNS.contains(&name) {
                continue;
            }

            let raw = row.try_get_raw(column.ordinal())?;
            let value = if raw.is_null() {
                Value::Null
            } else {
                match raw.type_info().name() {
                    "INTEGER" => Value::from(row.try_get::<i64, _>(column.ordinal())?),
                    "REAL" => Value::from(row.try_get::<f64, _>(column.ordinal())?),
                    "BOOLEAN" => Value::from(row.try_get::<bool, _>(column.ordinal())?),
                    _ => Value::from(row.try_get::<String, _>(column.ordinal())?),
                }
            };
            data.insert(name.to_string(), value);
        }
        Ok(data)
    }
}

#[async_trait]
impl ReportDataSource for SqliteReportDataSource {
    #[instrument(skip(self))]
    async fn institution_profile(&self, institution_id: &str) -> ReportingResult<Option<ReportData>> {
        let row = sqlx::query(
            "SELECT institution_name, institution_code, jurisdiction, currency \
             FROM institutions WHERE institution_id = ? AND is_active = 1",
        )
        .bind(institution_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_data).transpose()
    }

    #[instrument(skip(self))]
    async fn report_figures(
        &self,
        report_type: ReportType,
        institution_id: &str,
        reporting_period: &str,
    ) -> ReportingResult<Option<ReportData>> {
        let Some(table) = Self::figures_table(report_type) else {
            debug!("报告类型 {} 没有数据表", report_type);
            return Ok(None);
        };

        let row = sqlx::query(&format!(
            "SELECT * FROM {table} WHERE institution_id = ? AND reporting_period = ?"
        ))
        .bind(institution_id)
        .bind(reporting_period)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_data).transpose()
    }
}
