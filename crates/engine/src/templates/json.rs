use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use regreport_core::{ReportData, ReportingError, ReportingResult, ValidationOutcome};
use serde_json::{json, Value};
use tracing::info;

use super::DEFAULT_TEMPLATE_VERSION;

/// 基于JSON Schema的报告模板
pub struct JsonTemplate {
    key: String,
    version: String,
    path: PathBuf,
    schema: Value,
    validator: jsonschema::Validator,
}

impl fmt::Debug for JsonTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonTemplate")
            .field("key", &self.key)
            .field("version", &self.version)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl JsonTemplate {
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
        let schema: Value = serde_json::from_str(&content).map_err(|e| load_error(e.to_string()))?;

        let template = Self::from_schema(format!("json_{stem}"), path.to_path_buf(), schema)?;
        info!("JSON模板加载完成: {}", path.display());
        Ok(template)
    }

    pub fn from_schema(
        key: impl Into<String>,
        path: PathBuf,
        schema: Value,
    ) -> ReportingResult<Self> {
        let validator =
            jsonschema::validator_for(&schema).map_err(|e| ReportingError::TemplateLoad {
                path: path.display().to_string(),
                message: format!("invalid JSON schema: {e}"),
            })?;
        let version = schema
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TEMPLATE_VERSION)
            .to_string();

        Ok(Self {
            key: key.into(),
            version,
            path,
            schema,
            validator,
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

    pub fn schema_version(&self) -> &str {
        self.schema
            .get("$schema")
            .and_then(Value::as_str)
            .unwrap_or("1.0")
    }

    pub fn validate(&self, data: &ReportData) -> ValidationOutcome {
        let instance = Value::Object(data.clone());
        let mut outcome = ValidationOutcome::new();

        for error in self.validator.iter_errors(&instance) {
            let location = error.instance_path.to_string();
            let location = if location.is_empty() {
                "/".to_string()
            } else {
                location
            };
            outcome.add_error(format!("JSON schema validation error at {location}: {error}"));
        }

        outcome
    }

    /// 生成 `{metadata, data}` 结构的JSON报告
    pub fn generate(
        &self,
        data: &ReportData,
        generated_at: DateTime<Utc>,
    ) -> ReportingResult<String> {
        let document = json!({
            "metadata": {
                "generated_at": generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                "version": self.version,
                "schema_version": self.schema_version(),
            },
            "data": data,
        });
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dora_schema() -> Value {
        json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "version": "2.1.0",
            "type": "object",
            "required": ["institution_name", "reporting_period", "ict_incidents_count"],
            "properties": {
                "institution_name": {"type": "string", "minLength": 1},
                "reporting_period": {"type": "string"},
                "ict_incidents_count": {"type": "integer", "minimum": 0}
            }
        })
    }

    fn template() -> JsonTemplate {
        JsonTemplate::from_schema("json_dora_ict", PathBuf::from("dora_ict.json"), dora_schema())
            .unwrap()
    }

    #[test]
    fn test_schema_violations_reported() {
        let data = json!({"institution_name": "", "ict_incidents_count": -1})
            .as_object()
            .cloned()
            .unwrap();
        let outcome = template().validate(&data);
        assert!(!outcome.is_valid());
        assert_eq!(outcome.errors.len(), 3);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("/ict_incidents_count")));
    }

    #[test]
    fn test_generate_wraps_metadata() {
        let data = json!({
            "institution_name": "Test Bank",
            "reporting_period": "2023",
            "ict_incidents_count": 3
        })
        .as_object()
        .cloned()
        .unwrap();
        let template = template();
        assert!(template.validate(&data).is_valid());

        let at = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        let output = template.generate(&data, at).unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["metadata"]["generated_at"], "2024-01-15T08:00:00Z");
        assert_eq!(parsed["metadata"]["version"], "2.1.0");
        assert_eq!(
            parsed["metadata"]["schema_version"],
            "http://json-schema.org/draft-07/schema#"
        );
        assert_eq!(parsed["data"], Value::Object(data));
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let schema = json!({"type": "no-such-type"});
        assert!(matches!(
            JsonTemplate::from_schema("json_x", PathBuf::from("x.json"), schema),
            Err(ReportingError::TemplateLoad { .. })
        ));
    }

    #[test]
    fn test_schema_version_default() {
        let template =
            JsonTemplate::from_schema("json_x", PathBuf::from("x.json"), json!({"type": "object"}))
                .unwrap();
        assert_eq!(template.schema_version(), "1.0");
        assert_eq!(template.version(), DEFAULT_TEMPLATE_VERSION);
    }
}
