//! 各报告类型的字段规则与XBRL概念映射

use regreport_core::{ReportData, ReportType};

/// 报告类型的字段规则
#[derive(Debug)]
pub struct ReportTaxonomy {
    pub required_fields: &'static [&'static str],
    /// 必须为非负数的字段
    pub non_negative_fields: &'static [&'static str],
    /// 以货币单位报告的字段，其余数值字段使用 pure 单位
    pub monetary_fields: &'static [&'static str],
    /// 字段到XBRL概念的映射，顺序即事实输出顺序
    pub concepts: &'static [(&'static str, &'static str)],
    pub has_balance_sheet: bool,
}

/// 必须为非空字符串的身份字段
pub const IDENTITY_FIELDS: [&str; 2] = ["institution_name", "institution_code"];

static FINREP: ReportTaxonomy = ReportTaxonomy {
    required_fields: &[
        "institution_name",
        "institution_code",
        "reporting_period",
        "currency",
        "total_assets",
        "total_liabilities",
        "total_equity",
    ],
    non_negative_fields: &["total_assets", "total_liabilities", "total_equity"],
    monetary_fields: &[
        "total_assets",
        "total_liabilities",
        "total_equity",
        "total_operating_income",
        "total_operating_expenses",
        "profit_before_tax",
        "net_profit",
    ],
    concepts: &[
        ("institution_name", "eba:NameOfReportingAgent"),
        ("total_assets", "eba:Assets"),
        ("total_liabilities", "eba:Liabilities"),
        ("total_equity", "eba:Equity"),
        ("total_operating_income", "eba:TotalOperatingIncomeNet"),
        ("total_operating_expenses", "eba:OperatingExpenses"),
        ("profit_before_tax", "eba:ProfitOrLossBeforeTax"),
        ("net_profit", "eba:ProfitOrLoss"),
    ],
    has_balance_sheet: true,
};

static COREP: ReportTaxonomy = ReportTaxonomy {
    required_fields: &[
        "institution_name",
        "institution_code",
        "reporting_period",
        "currency",
        "tier1_capital",
        "total_capital",
        "risk_weighted_assets",
    ],
    non_negative_fields: &[
        "tier1_capital",
        "tier2_capital",
        "total_capital",
        "risk_weighted_assets",
    ],
    monetary_fields: &[
        "tier1_capital",
        "tier2_capital",
        "total_capital",
        "risk_weighted_assets",
    ],
    concepts: &[
        ("institution_name", "eba:NameOfReportingAgent"),
        ("tier1_capital", "eba:Tier1Capital"),
        ("tier2_capital", "eba:Tier2Capital"),
        ("total_capital", "eba:OwnFunds"),
        ("risk_weighted_assets", "eba:TotalRiskExposureAmount"),
        ("capital_ratio", "eba:TotalCapitalRatio"),
        ("leverage_ratio", "eba:LeverageRatio"),
        ("liquidity_coverage_ratio", "eba:LiquidityCoverageRatio"),
    ],
    has_balance_sheet: false,
};

static DORA_ICT: ReportTaxonomy = ReportTaxonomy {
    required_fields: &[
        "institution_name",
        "institution_code",
        "reporting_period",
        "ict_incidents_count",
    ],
    non_negative_fields: &[
        "ict_incidents_count",
        "major_incidents_count",
        "third_party_providers_count",
        "critical_services_count",
    ],
    monetary_fields: &[],
    concepts: &[
        ("institution_name", "eba:NameOfReportingAgent"),
        ("ict_incidents_count", "eba:NumberOfICTIncidents"),
        ("major_incidents_count", "eba:NumberOfMajorICTIncidents"),
        ("third_party_providers_count", "eba:NumberOfICTThirdPartyProviders"),
        ("critical_services_count", "eba:NumberOfCriticalServices"),
    ],
    has_balance_sheet: false,
};

static CUSTOM: ReportTaxonomy = ReportTaxonomy {
    required_fields: &["institution_name", "institution_code", "reporting_period"],
    non_negative_fields: &[],
    monetary_fields: &[],
    concepts: &[("institution_name", "eba:NameOfReportingAgent")],
    has_balance_sheet: false,
};

pub fn taxonomy_for(report_type: ReportType) -> &'static ReportTaxonomy {
    match report_type {
        ReportType::Finrep => &FINREP,
        ReportType::Corep => &COREP,
        ReportType::DoraIct => &DORA_ICT,
        ReportType::Custom => &CUSTOM,
    }
}

impl ReportTaxonomy {
    pub fn is_monetary(&self, field: &str) -> bool {
        self.monetary_fields.contains(&field)
    }
}

/// 资产负债表恒等式：资产 = 负债 + 所有者权益，容差为 max(资产的0.1%, 1000)
///
/// 三个字段不全或不是数值时不做检查。
pub fn check_balance_sheet(data: &ReportData) -> Option<String> {
    let assets = data.get("total_assets")?.as_f64()?;
    let liabilities = data.get("total_liabilities")?.as_f64()?;
    let equity = data.get("total_equity")?.as_f64()?;

    let difference = (assets - (liabilities + equity)).abs();
    let tolerance = (assets * 0.001).max(1000.0);

    if difference > tolerance {
        Some(format!(
            "Balance sheet equation violated: Assets ({assets}) != Liabilities ({liabilities}) + Equity ({equity})"
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn balance(assets: f64, liabilities: f64, equity: f64) -> ReportData {
        json!({
            "total_assets": assets,
            "total_liabilities": liabilities,
            "total_equity": equity,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_balance_sheet_tolerance_floor() {
        // 小额资产使用1000的绝对容差
        assert!(check_balance_sheet(&balance(10_000.0, 8_000.0, 1_000.0)).is_none());
        assert!(check_balance_sheet(&balance(10_000.0, 8_000.0, 999.0)).is_some());
    }

    #[test]
    fn test_balance_sheet_relative_tolerance() {
        // 0.1% of 10m = 10k
        assert!(check_balance_sheet(&balance(10_000_000.0, 9_000_000.0, 990_000.0)).is_none());
        assert!(check_balance_sheet(&balance(10_000_000.0, 9_000_000.0, 989_999.0)).is_some());
    }

    #[test]
    fn test_balance_sheet_skipped_when_incomplete() {
        let mut data = balance(1.0, 1_000_000.0, 0.0);
        data.remove("total_equity");
        assert!(check_balance_sheet(&data).is_none());
    }

    #[test]
    fn test_every_type_requires_identity() {
        for report_type in ReportType::ALL {
            let taxonomy = taxonomy_for(report_type);
            for field in IDENTITY_FIELDS {
                assert!(taxonomy.required_fields.contains(&field));
            }
        }
        assert!(taxonomy_for(ReportType::Finrep).has_balance_sheet);
        assert!(!taxonomy_for(ReportType::Corep).has_balance_sheet);
    }
}
