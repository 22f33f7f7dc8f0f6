use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate};
use regreport_core::{ReportData, ReportingError, ReportingResult, ValidationOutcome};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::DEFAULT_TEMPLATE_VERSION;

/// 字段类型规则
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    Integer,
    String,
    Date,
}

/// 单个字段的验证规则
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub max_length: Option<usize>,
}

/// CSV模板配置文件
#[derive(Debug, Clone, Deserialize)]
pub struct CsvTemplateConfig {
    pub headers: Vec<String>,
    /// 表头到数据字段的映射，未映射的表头直接使用表头名
    #[serde(default)]
    pub field_mappings: HashMap<String, String>,
    /// 以数据字段为键的验证规则
    #[serde(default)]
    pub validation_rules: HashMap<String, FieldRule>,
    pub version: Option<String>,
    pub delimiter: Option<char>,
}

/// CSV报告模板
#[derive(Debug, Clone)]
pub struct CsvTemplate {
    key: String,
    version: String,
    path: PathBuf,
    config: CsvTemplateConfig,
    delimiter: u8,
}

impl CsvTemplate {
    pub fn load(path: &Path) -> ReportingResult<Self> {
        let load_error = |message: String| ReportingError::TemplateLoad {
            path: path.display().to_string(),
            message,
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| load_error("invalid template file name".to_string()))?
            .to_lowercase();
        let content = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let config: CsvTemplateConfig =
            serde_json::from_str(&content).map_err(|e| load_error(e.to_string()))?;

        let template = Self::from_config(format!("csv_{stem}"), path.to_path_buf(), config)?;
        info!("CSV模板加载完成: {}", path.display());
        Ok(template)
    }

    pub fn from_config(
        key: impl Into<String>,
        path: PathBuf,
        config: CsvTemplateConfig,
    ) -> ReportingResult<Self> {
        let load_error = |message: &str| ReportingError::TemplateLoad {
            path: path.display().to_string(),
            message: message.to_string(),
        };

        if config.headers.is_empty() {
            return Err(load_error("headers cannot be empty"));
        }
        let delimiter = match config.delimiter {
            None => b',',
            Some(c) if c.is_ascii() && c != '"' && c != '\n' => c as u8,
            Some(_) => return Err(load_error("delimiter must be a single ASCII character")),
        };

        Ok(Self {
            key: key.into(),
            version: config
                .version
                .clone()
                .unwrap_or_else(|| DEFAULT_TEMPLATE_VERSION.to_string()),
            path,
            config,
            delimiter,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.config.headers
    }

    fn mapped_field<'a>(&'a self, header: &'a str) -> &'a str {
        self.config
            .field_mappings
            .get(header)
            .map(String::as_str)
            .unwrap_or(header)
    }

    pub fn validate(&self, data: &ReportData) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::new();

        for header in &self.config.headers {
            if !data.contains_key(self.mapped_field(header)) {
                outcome.add_error(format!("Missing data for header: {header}"));
            }
        }

        let mut rules: Vec<(&String, &FieldRule)> = self.config.validation_rules.iter().collect();
        rules.sort_by(|a, b| a.0.cmp(b.0));
        for (field, rule) in rules {
            if let Some(value) = data.get(field) {
                validate_field(field, value, rule, &mut outcome);
            }
        }

        outcome
    }

    /// 生成表头行和一行数据，以 `\n` 结尾
    pub fn generate(&self, data: &ReportData) -> ReportingResult<String> {
        let mut writer = ::csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(::csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer
            .write_record(&self.config.headers)
            .map_err(|e| ReportingError::Serialization(e.to_string()))?;

        let row: Vec<String> = self
            .config
            .headers
            .iter()
            .map(|header| {
                let field = self.mapped_field(header);
                let rule = self.config.validation_rules.get(field);
                data.get(field)
                    .map(|value| format_value(value, rule))
                    .unwrap_or_default()
            })
            .collect();
        writer
            .write_record(&row)
            .map_err(|e| ReportingError::Serialization(e.to_string()))?;

        let bytes = writer
            .into_inner()
            .map_err(|e| ReportingError::Serialization(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ReportingError::Serialization(e.to_string()))
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn validate_field(field: &str, value: &Value, rule: &FieldRule, outcome: &mut ValidationOutcome) {
    match rule.field_type {
        Some(FieldType::Number) if !value.is_number() => {
            outcome.add_error(format!("{field} must be a number"));
        }
        Some(FieldType::Integer) if !(value.is_i64() || value.is_u64()) => {
            outcome.add_error(format!("{field} must be an integer"));
        }
        Some(FieldType::String) if !value.is_string() => {
            outcome.add_error(format!("{field} must be a string"));
        }
        Some(FieldType::Date) if value.as_str().and_then(parse_date).is_none() => {
            outcome.add_error(format!("{field} must be a date (YYYY-MM-DD)"));
        }
        _ => {}
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = rule.min {
            if number < min {
                outcome.add_error(format!("{field} must be >= {min}"));
            }
        }
        if let Some(max) = rule.max {
            if number > max {
                outcome.add_error(format!("{field} must be <= {max}"));
            }
        }
    }

    if let (Some(max_length), Some(s)) = (rule.max_length, value.as_str()) {
        if s.chars().count() > max_length {
            outcome.add_error(format!("{field} exceeds maximum length of {max_length}"));
        }
    }
}

fn format_value(value: &Value, rule: Option<&FieldRule>) -> String {
    match value {
        Value::Null => String::new(),
        Value::Number(number) if number.is_f64() => {
            format!("{:.2}", number.as_f64().unwrap_or_default())
        }
        Value::Number(number) => number.to_string(),
        Value::String(s) => {
            let is_date = rule.and_then(|r| r.field_type) == Some(FieldType::Date);
            match (is_date, parse_date(s)) {
                (true, Some(date)) => date.format("%Y-%m-%d").to_string(),
                _ => s.clone(),
            }
        }
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(config: Value) -> CsvTemplate {
        let config: CsvTemplateConfig = serde_json::from_value(config).unwrap();
        CsvTemplate::from_config("csv_custom", PathBuf::from("custom.json"), config).unwrap()
    }

    fn data(value: Value) -> ReportData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_header_and_row() {
        let template = template(json!({"headers": ["name", "amount"]}));
        let data = data(json!({"name": "Test Bank", "amount": 1234.5}));

        assert!(template.validate(&data).is_valid());
        let csv = template.generate(&data).unwrap();
        assert_eq!(csv, "name,amount\nTest Bank,1234.50\n");
    }

    #[test]
    fn test_field_mappings_and_missing_header() {
        let template = template(json!({
            "headers": ["Institution", "Assets"],
            "field_mappings": {"Institution": "institution_name", "Assets": "total_assets"}
        }));

        let outcome = template.validate(&data(json!({"institution_name": "Bank"})));
        assert!(!outcome.is_valid());
        assert_eq!(outcome.errors, vec!["Missing data for header: Assets".to_string()]);

        let csv = template
            .generate(&data(json!({"institution_name": "Bank, Ltd", "total_assets": 10})))
            .unwrap();
        assert_eq!(csv, "Institution,Assets\n\"Bank, Ltd\",10\n");
    }

    #[test]
    fn test_validation_rules() {
        let template = template(json!({
            "headers": ["name", "amount", "count", "as_of"],
            "validation_rules": {
                "name": {"type": "string", "max_length": 5},
                "amount": {"type": "number", "min": 0, "max": 100},
                "count": {"type": "integer"},
                "as_of": {"type": "date"}
            }
        }));

        let outcome = template.validate(&data(json!({
            "name": "Too long name",
            "amount": -1,
            "count": 1.5,
            "as_of": "yesterday"
        })));
        assert!(!outcome.is_valid());
        assert!(outcome.errors.contains(&"name exceeds maximum length of 5".to_string()));
        assert!(outcome.errors.contains(&"amount must be >= 0".to_string()));
        assert!(outcome.errors.contains(&"count must be an integer".to_string()));
        assert!(outcome.errors.contains(&"as_of must be a date (YYYY-MM-DD)".to_string()));

        let outcome = template.validate(&data(json!({"name": 42, "amount": "x", "count": 2, "as_of": "2024-03-31"})));
        assert!(outcome.errors.contains(&"name must be a string".to_string()));
        assert!(outcome.errors.contains(&"amount must be a number".to_string()));
        assert_eq!(outcome.errors.len(), 2);
    }

    #[test]
    fn test_date_and_null_formatting() {
        let template = template(json!({
            "headers": ["as_of", "note", "flag"],
            "validation_rules": {"as_of": {"type": "date"}},
            "delimiter": ";"
        }));
        let csv = template
            .generate(&data(json!({"as_of": "2024-03-31T12:00:00Z", "note": null, "flag": true})))
            .unwrap();
        assert_eq!(csv, "as_of;note;flag\n2024-03-31;;true\n");
    }

    #[test]
    fn test_empty_headers_rejected() {
        let config: CsvTemplateConfig = serde_json::from_value(json!({"headers": []})).unwrap();
        assert!(CsvTemplate::from_config("csv_x", PathBuf::from("x.json"), config).is_err());
    }
}
