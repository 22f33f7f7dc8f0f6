use std::sync::Arc;

use regreport_core::{ReportData, ReportDataSource, ReportRequest, ReportType, ReportingResult};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// 内置数据源名称
pub const DATABASE_SOURCE: &str = "database";

const FINREP_FIELDS: [&str; 43] = [
    "cash_balances",
    "financial_assets_hft",
    "financial_assets_mandatorily_fvtpl",
    "financial_assets_designated_fvtpl",
    "financial_assets_fvoci",
    "financial_assets_amortised_cost",
    "derivatives_hedge_accounting",
    "investments_subsidiaries",
    "tangible_assets",
    "intangible_assets",
    "tax_assets",
    "other_assets",
    "total_assets",
    "financial_liabilities_hft",
    "financial_liabilities_designated_fvtpl",
    "financial_liabilities_amortised_cost",
    "derivatives_hedge_accounting_liab",
    "provisions",
    "tax_liabilities",
    "other_liabilities",
    "total_liabilities",
    "capital",
    "retained_earnings",
    "accumulated_oci",
    "other_reserves",
    "total_equity",
    "interest_income",
    "interest_expenses",
    "net_interest_income",
    "fee_income",
    "fee_expenses",
    "net_fee_income",
    "trading_income",
    "other_operating_income",
    "total_operating_income",
    "staff_expenses",
    "other_administrative_expenses",
    "depreciation",
    "total_operating_expenses",
    "impairment_losses",
    "profit_before_tax",
    "tax_expense",
    "net_profit",
];

const COREP_FIELDS: [&str; 7] = [
    "tier1_capital",
    "tier2_capital",
    "total_capital",
    "risk_weighted_assets",
    "capital_ratio",
    "leverage_ratio",
    "liquidity_coverage_ratio",
];

const DORA_COUNT_FIELDS: [&str; 5] = [
    "ict_incidents_count",
    "major_incidents_count",
    "third_party_providers_count",
    "critical_services_count",
    "business_continuity_tests",
];

const DORA_HOUR_FIELDS: [&str; 2] = ["recovery_time_objective", "recovery_point_objective"];

/// 数据缺失时使用的全零结构
///
/// 只用零值填充，避免在监管报告中出现虚构数字。
pub fn zero_filled(report_type: ReportType) -> ReportData {
    let mut data = ReportData::new();
    match report_type {
        ReportType::Finrep => {
            for field in FINREP_FIELDS {
                data.insert(field.to_string(), json!(0.0));
            }
        }
        ReportType::Corep => {
            for field in COREP_FIELDS {
                data.insert(field.to_string(), json!(0.0));
            }
        }
        ReportType::DoraIct => {
            for field in DORA_COUNT_FIELDS {
                data.insert(field.to_string(), json!(0));
            }
            for field in DORA_HOUR_FIELDS {
                data.insert(field.to_string(), json!(0.0));
            }
        }
        ReportType::Custom => {}
    }
    data
}

/// 收集结果
#[derive(Debug, Clone)]
pub struct GatheredData {
    pub data: ReportData,
    pub warnings: Vec<String>,
}

/// 从上游数据源收集报告数据
pub struct ReportDataGatherer {
    source: Arc<dyn ReportDataSource>,
}

impl ReportDataGatherer {
    pub fn new(source: Arc<dyn ReportDataSource>) -> Self {
        Self { source }
    }

    pub async fn gather(&self, request: &ReportRequest) -> ReportingResult<GatheredData> {
        let mut data = ReportData::new();
        let mut warnings = Vec::new();

        for source in &request.data_sources {
            if source != DATABASE_SOURCE {
                warn!(report_id = %request.report_id, "不支持的数据源，已跳过: {source}");
                warnings.push(format!("Unsupported data source skipped: {source}"));
            }
        }

        match self.source.institution_profile(&request.institution_id).await? {
            Some(profile) => data.extend(profile),
            None => {
                warn!("未找到机构信息: {}", request.institution_id);
                warnings.push(format!(
                    "No institution data found for {}",
                    request.institution_id
                ));
            }
        }

        let figures = self
            .source
            .report_figures(
                request.report_type,
                &request.institution_id,
                &request.reporting_period,
            )
            .await?;
        match figures {
            Some(figures) => data.extend(figures),
            None if request.report_type == ReportType::Custom => {
                debug!("自定义报告没有附加数据: {}", request.report_id);
            }
            None => {
                warn!(
                    "未找到 {} 数据: {} {}，使用零值填充",
                    request.report_type, request.institution_id, request.reporting_period
                );
                warnings.push(format!(
                    "No {} data found for {} {}; zero-filled",
                    request.report_type, request.institution_id, request.reporting_period
                ));
                data.extend(zero_filled(request.report_type));
            }
        }

        data.insert(
            "reporting_period".to_string(),
            Value::String(request.reporting_period.clone()),
        );

        Ok(GatheredData { data, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_filled_structures() {
        let finrep = zero_filled(ReportType::Finrep);
        assert_eq!(finrep.len(), 43);
        assert!(finrep.values().all(|v| v.as_f64() == Some(0.0)));
        assert!(finrep.contains_key("total_equity"));

        let dora = zero_filled(ReportType::DoraIct);
        assert_eq!(dora["ict_incidents_count"], json!(0));
        assert_eq!(dora["recovery_time_objective"], json!(0.0));

        assert!(zero_filled(ReportType::Custom).is_empty());
        assert_eq!(zero_filled(ReportType::Corep).len(), 7);
    }
}
