//! Test helper utilities and template fixtures

use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// 在超时前轮询等待条件成立
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }
}

pub const FINREP_XBRL_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
            xmlns:link="http://www.xbrl.org/2003/linkbase"
            xmlns:xlink="http://www.w3.org/1999/xlink"
            version="3.2.0">
  <link:schemaRef xlink:type="simple"
                  xlink:href="http://www.eba.europa.eu/eu/fr/xbrl/crr/fws/finrep/its-005-2020/2021-06-30/mod/finrep_cor.xsd"/>
</xbrli:xbrl>
"#;

pub const COREP_XBRL_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
            xmlns:link="http://www.xbrl.org/2003/linkbase"
            xmlns:xlink="http://www.w3.org/1999/xlink"
            version="3.2.0">
  <link:schemaRef xlink:type="simple"
                  xlink:href="http://www.eba.europa.eu/eu/fr/xbrl/crr/fws/corep/its-2021/2021-06-30/mod/corep_of.xsd"/>
</xbrli:xbrl>
"#;

pub const FINREP_CSV_TEMPLATE: &str = r#"{
  "version": "1.2",
  "headers": ["Institution", "Code", "Period", "Currency", "Total Assets", "Total Liabilities", "Total Equity", "Net Profit"],
  "field_mappings": {
    "Institution": "institution_name",
    "Code": "institution_code",
    "Period": "reporting_period",
    "Currency": "currency",
    "Total Assets": "total_assets",
    "Total Liabilities": "total_liabilities",
    "Total Equity": "total_equity",
    "Net Profit": "net_profit"
  },
  "validation_rules": {
    "institution_name": {"type": "string", "max_length": 200},
    "total_assets": {"type": "number", "min": 0},
    "total_liabilities": {"type": "number", "min": 0},
    "total_equity": {"type": "number", "min": 0}
  }
}
"#;

pub const COREP_CSV_TEMPLATE: &str = r#"{
  "version": "1.0",
  "headers": ["Institution", "Period", "Tier 1", "Total Capital", "RWA", "Capital Ratio"],
  "field_mappings": {
    "Institution": "institution_name",
    "Period": "reporting_period",
    "Tier 1": "tier1_capital",
    "Total Capital": "total_capital",
    "RWA": "risk_weighted_assets",
    "Capital Ratio": "capital_ratio"
  },
  "validation_rules": {
    "tier1_capital": {"type": "number", "min": 0},
    "capital_ratio": {"type": "number", "min": 0, "max": 100}
  }
}
"#;

pub const DORA_JSON_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "version": "2.1.0",
  "type": "object",
  "required": ["institution_name", "reporting_period", "ict_incidents_count"],
  "properties": {
    "institution_name": {"type": "string", "minLength": 1},
    "reporting_period": {"type": "string"},
    "ict_incidents_count": {"type": "integer", "minimum": 0},
    "major_incidents_count": {"type": "integer", "minimum": 0},
    "third_party_providers_count": {"type": "integer", "minimum": 0},
    "critical_services_count": {"type": "integer", "minimum": 0},
    "recovery_time_objective": {"type": "number", "minimum": 0},
    "recovery_point_objective": {"type": "number", "minimum": 0}
  }
}
"#;

pub const FINREP_JSON_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "version": "3.2.0",
  "type": "object",
  "required": ["institution_name", "reporting_period", "total_assets", "total_liabilities", "total_equity"],
  "properties": {
    "institution_name": {"type": "string", "minLength": 1},
    "total_assets": {"type": "number", "minimum": 0},
    "total_liabilities": {"type": "number", "minimum": 0},
    "total_equity": {"type": "number"}
  }
}
"#;

pub const CUSTOM_JSON_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "version": "1.0",
  "type": "object",
  "required": ["institution_name", "reporting_period"]
}
"#;

/// 在 `dir` 下写入一套完整的示例模板（xbrl/、csv/、json/ 子目录）
pub fn write_sample_templates(dir: &Path) -> anyhow::Result<()> {
    let files = [
        ("xbrl/finrep.xml", FINREP_XBRL_TEMPLATE),
        ("xbrl/corep.xml", COREP_XBRL_TEMPLATE),
        ("csv/finrep.json", FINREP_CSV_TEMPLATE),
        ("csv/corep.json", COREP_CSV_TEMPLATE),
        ("json/dora_ict.json", DORA_JSON_SCHEMA),
        ("json/finrep.json", FINREP_JSON_SCHEMA),
        ("json/custom.json", CUSTOM_JSON_SCHEMA),
    ];

    for (relative, content) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
    }
    Ok(())
}

/// 示例模板的数量
pub const SAMPLE_TEMPLATE_COUNT: usize = 7;
