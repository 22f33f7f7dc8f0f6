use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regreport_core::{
    ReportData, ReportType, ReportingError, ReportingPeriod, ReportingResult, ValidationOutcome,
};
use serde_json::Value;
use tracing::{debug, info};

use super::taxonomy::{check_balance_sheet, taxonomy_for, ReportTaxonomy, IDENTITY_FIELDS};
use super::DEFAULT_TEMPLATE_VERSION;

const XBRLI_NS: &str = "http://www.xbrl.org/2003/instance";
const LINK_NS: &str = "http://www.xbrl.org/2003/linkbase";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const EBA_NS: &str = "http://www.eba.europa.eu/xbrl/crr";
const ISO4217_NS: &str = "http://www.xbrl.org/2003/iso4217";
const ENTITY_SCHEME: &str = "http://www.eba.europa.eu";
const DEFAULT_SCHEMA_REF: &str =
    "http://www.eba.europa.eu/eu/fr/xbrl/crr/fws/finrep/its-005-2020/2021-06-30/mod/finrep_cor.xsd";
const CONTEXT_ID: &str = "c1";
const PURE_UNIT: &str = "pure";

/// XBRL实例文档模板
#[derive(Debug, Clone)]
pub struct XbrlTemplate {
    key: String,
    report_type: ReportType,
    version: String,
    path: PathBuf,
    taxonomy_path: Option<PathBuf>,
    schema_ref: String,
}

/// 模板文件中读取到的信息
#[derive(Debug, Default)]
struct TemplateHeader {
    version: Option<String>,
    schema_ref: Option<String>,
}

fn xml_error(path: &Path, err: impl std::fmt::Display) -> ReportingError {
    ReportingError::TemplateLoad {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

fn write_error(err: impl std::fmt::Display) -> ReportingError {
    ReportingError::Serialization(format!("XBRL写入失败: {err}"))
}

/// 解析XML文档并检查结构完整性，返回根元素上的版本号和schemaRef
fn parse_document(path: &Path, content: &str) -> ReportingResult<TemplateHeader> {
    let mut reader = Reader::from_str(content);
    let mut header = TemplateHeader::default();
    let mut depth: usize = 0;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                if depth == 0 {
                    if saw_root {
                        return Err(xml_error(path, "multiple root elements"));
                    }
                    saw_root = true;
                    header.version = attribute_value(path, &element, "version")?;
                }
                inspect_schema_ref(path, &element, &mut header)?;
                depth += 1;
            }
            Ok(Event::Empty(element)) => {
                if depth == 0 {
                    if saw_root {
                        return Err(xml_error(path, "multiple root elements"));
                    }
                    saw_root = true;
                    header.version = attribute_value(path, &element, "version")?;
                }
                inspect_schema_ref(path, &element, &mut header)?;
            }
            Ok(Event::End(_)) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| xml_error(path, "unexpected closing tag"))?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(xml_error(
                    path,
                    format!("error at position {}: {e}", reader.buffer_position()),
                ))
            }
        }
    }

    if !saw_root {
        return Err(xml_error(path, "document has no root element"));
    }
    if depth != 0 {
        return Err(xml_error(path, "unclosed element at end of document"));
    }
    Ok(header)
}

fn attribute_value(
    path: &Path,
    element: &BytesStart<'_>,
    name: &str,
) -> ReportingResult<Option<String>> {
    match element.try_get_attribute(name).map_err(|e| xml_error(path, e))? {
        Some(attribute) => {
            let value = attribute.unescape_value().map_err(|e| xml_error(path, e))?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

fn inspect_schema_ref(
    path: &Path,
    element: &BytesStart<'_>,
    header: &mut TemplateHeader,
) -> ReportingResult<()> {
    if element.name().as_ref() == b"link:schemaRef" && header.schema_ref.is_none() {
        header.schema_ref = attribute_value(path, element, "xlink:href")?;
    }
    Ok(())
}

impl XbrlTemplate {
    /// 加载XBRL模板；同目录下存在 `{name}_taxonomy.xml` 时一并校验
    pub fn load(path: &Path) -> ReportingResult<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| xml_error(path, "invalid template file name"))?
            .to_lowercase();

        let content = fs::read_to_string(path).map_err(|e| xml_error(path, e))?;
        let header = parse_document(path, &content)?;

        let taxonomy_candidate = path.with_file_name(format!("{stem}_taxonomy.xml"));
        let taxonomy_path = if taxonomy_candidate.exists() {
            let taxonomy = fs::read_to_string(&taxonomy_candidate)
                .map_err(|e| xml_error(&taxonomy_candidate, e))?;
            parse_document(&taxonomy_candidate, &taxonomy)?;
            debug!("已加载XBRL分类标准: {}", taxonomy_candidate.display());
            Some(taxonomy_candidate)
        } else {
            None
        };

        let report_type = stem.parse::<ReportType>().unwrap_or(ReportType::Custom);

        info!("XBRL模板加载完成: {}", path.display());
        Ok(Self {
            key: format!("xbrl_{stem}"),
            report_type,
            version: header
                .version
                .unwrap_or_else(|| DEFAULT_TEMPLATE_VERSION.to_string()),
            path: path.to_path_buf(),
            taxonomy_path,
            schema_ref: header
                .schema_ref
                .unwrap_or_else(|| DEFAULT_SCHEMA_REF.to_string()),
        })
    }

    /// 直接构造模板，不读取文件
    pub fn for_report_type(report_type: ReportType) -> Self {
        Self {
            key: format!("xbrl_{}", report_type.key()),
            report_type,
            version: DEFAULT_TEMPLATE_VERSION.to_string(),
            path: PathBuf::new(),
            taxonomy_path: None,
            schema_ref: DEFAULT_SCHEMA_REF.to_string(),
        }
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

    pub fn taxonomy_path(&self) -> Option<&Path> {
        self.taxonomy_path.as_deref()
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    fn taxonomy(&self) -> &'static ReportTaxonomy {
        taxonomy_for(self.report_type)
    }

    pub fn validate(&self, data: &ReportData) -> ValidationOutcome {
        let taxonomy = self.taxonomy();
        let mut outcome = ValidationOutcome::new();

        for field in taxonomy.required_fields {
            if !data.contains_key(*field) {
                outcome.add_error(format!("Missing required field: {field}"));
            }
        }

        for field in taxonomy.non_negative_fields {
            if let Some(value) = data.get(*field) {
                match value.as_f64() {
                    Some(number) if number >= 0.0 => {}
                    _ => outcome.add_error(format!("{field} must be a non-negative number")),
                }
            }
        }

        for field in IDENTITY_FIELDS {
            if let Some(value) = data.get(field) {
                match value.as_str() {
                    Some(s) if !s.trim().is_empty() => {}
                    _ => outcome.add_error(format!("{field} must be a non-empty string")),
                }
            }
        }

        if let Some(value) = data.get("reporting_period") {
            let valid_period = value
                .as_str()
                .and_then(|s| s.parse::<ReportingPeriod>().ok())
                .map(|period| !matches!(period, ReportingPeriod::Year { .. }))
                .unwrap_or(false);
            if !valid_period {
                outcome.add_error("reporting_period must be in YYYY-MM or YYYY-QN format");
            }
        }

        if let Some(currency) = data.get("currency").and_then(Value::as_str) {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
                outcome.add_warning(format!(
                    "currency '{currency}' is not an ISO 4217 code, facts will use it verbatim"
                ));
            }
        }

        if taxonomy.has_balance_sheet {
            if let Some(error) = check_balance_sheet(data) {
                outcome.add_error(error);
            }
        }

        outcome
    }

    /// 生成XBRL实例文档，要求数据已通过验证
    pub fn generate(&self, data: &ReportData) -> ReportingResult<String> {
        let taxonomy = self.taxonomy();
        let currency = data
            .get("currency")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .unwrap_or("EUR");

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(write_error)?;

        let mut root = BytesStart::new("xbrli:xbrl");
        root.push_attribute(("xmlns:xbrli", XBRLI_NS));
        root.push_attribute(("xmlns:link", LINK_NS));
        root.push_attribute(("xmlns:xlink", XLINK_NS));
        root.push_attribute(("xmlns:eba", EBA_NS));
        root.push_attribute(("xmlns:iso4217", ISO4217_NS));
        writer.write_event(Event::Start(root)).map_err(write_error)?;

        let mut schema_ref = BytesStart::new("link:schemaRef");
        schema_ref.push_attribute(("xlink:type", "simple"));
        schema_ref.push_attribute(("xlink:href", self.schema_ref.as_str()));
        writer.write_event(Event::Empty(schema_ref)).map_err(write_error)?;

        self.write_context(&mut writer, data)?;

        let facts: Vec<(&str, &str, &Value)> = taxonomy
            .concepts
            .iter()
            .filter_map(|(field, concept)| data.get(*field).map(|value| (*field, *concept, value)))
            .filter(|(_, _, value)| !value.is_null())
            .collect();

        write_unit(&mut writer, currency, &format!("iso4217:{currency}"))?;
        let needs_pure = facts
            .iter()
            .any(|(field, _, value)| value.is_number() && !taxonomy.is_monetary(field));
        if needs_pure {
            write_unit(&mut writer, PURE_UNIT, "xbrli:pure")?;
        }

        for (field, concept, value) in facts {
            let mut fact = BytesStart::new(concept);
            fact.push_attribute(("contextRef", CONTEXT_ID));
            let text = match value {
                Value::Number(number) => {
                    let monetary = taxonomy.is_monetary(field);
                    let (unit, decimals) = if monetary {
                        (currency, "0")
                    } else if number.is_f64() {
                        (PURE_UNIT, "2")
                    } else {
                        (PURE_UNIT, "0")
                    };
                    fact.push_attribute(("unitRef", unit));
                    fact.push_attribute(("decimals", decimals));
                    format_number(number, monetary)
                }
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            write_text_element(&mut writer, fact, concept, &text)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("xbrli:xbrl")))
            .map_err(write_error)?;

        String::from_utf8(writer.into_inner()).map_err(write_error)
    }

    fn write_context(
        &self,
        writer: &mut Writer<Vec<u8>>,
        data: &ReportData,
    ) -> ReportingResult<()> {
        let code = data
            .get("institution_code")
            .and_then(Value::as_str)
            .unwrap_or("UNKNOWN");

        let mut context = BytesStart::new("xbrli:context");
        context.push_attribute(("id", CONTEXT_ID));
        writer.write_event(Event::Start(context)).map_err(write_error)?;

        writer
            .write_event(Event::Start(BytesStart::new("xbrli:entity")))
            .map_err(write_error)?;
        let mut identifier = BytesStart::new("xbrli:identifier");
        identifier.push_attribute(("scheme", ENTITY_SCHEME));
        write_text_element(writer, identifier, "xbrli:identifier", code)?;
        writer
            .write_event(Event::End(BytesEnd::new("xbrli:entity")))
            .map_err(write_error)?;

        let period = data
            .get("reporting_period")
            .and_then(Value::as_str)
            .ok_or_else(|| ReportingError::InvalidReportingPeriod("missing".to_string()))?;
        let parsed: ReportingPeriod = period
            .parse()
            .map_err(ReportingError::InvalidReportingPeriod)?;
        let start = parsed
            .start_date()
            .ok_or_else(|| ReportingError::InvalidReportingPeriod(period.to_string()))?;
        let end = parsed
            .end_date()
            .ok_or_else(|| ReportingError::InvalidReportingPeriod(period.to_string()))?;

        writer
            .write_event(Event::Start(BytesStart::new("xbrli:period")))
            .map_err(write_error)?;
        match parsed {
            ReportingPeriod::Month { .. } => {
                write_text_element(
                    writer,
                    BytesStart::new("xbrli:instant"),
                    "xbrli:instant",
                    &end.format("%Y-%m-%d").to_string(),
                )?;
            }
            ReportingPeriod::Quarter { .. } | ReportingPeriod::Year { .. } => {
                write_text_element(
                    writer,
                    BytesStart::new("xbrli:startDate"),
                    "xbrli:startDate",
                    &start.format("%Y-%m-%d").to_string(),
                )?;
                write_text_element(
                    writer,
                    BytesStart::new("xbrli:endDate"),
                    "xbrli:endDate",
                    &end.format("%Y-%m-%d").to_string(),
                )?;
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new("xbrli:period")))
            .map_err(write_error)?;

        writer
            .write_event(Event::End(BytesEnd::new("xbrli:context")))
            .map_err(write_error)?;
        Ok(())
    }
}

fn write_unit(writer: &mut Writer<Vec<u8>>, id: &str, measure: &str) -> ReportingResult<()> {
    let mut unit = BytesStart::new("xbrli:unit");
    unit.push_attribute(("id", id));
    writer.write_event(Event::Start(unit)).map_err(write_error)?;
    write_text_element(writer, BytesStart::new("xbrli:measure"), "xbrli:measure", measure)?;
    writer
        .write_event(Event::End(BytesEnd::new("xbrli:unit")))
        .map_err(write_error)
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    name: &str,
    text: &str,
) -> ReportingResult<()> {
    writer.write_event(Event::Start(start)).map_err(write_error)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_error)
}

fn format_number(number: &serde_json::Number, monetary: bool) -> String {
    if number.is_f64() {
        let value = number.as_f64().unwrap_or_default();
        if monetary {
            format!("{value:.0}")
        } else {
            format!("{value:.2}")
        }
    } else {
        number.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finrep_data() -> ReportData {
        json!({
            "institution_name": "Test Bank AG",
            "institution_code": "TESTBANK01",
            "reporting_period": "2024-Q1",
            "currency": "EUR",
            "total_assets": 1_000_000.0,
            "total_liabilities": 800_000.0,
            "total_equity": 200_000.0,
            "net_profit": -12_500.4,
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_valid_finrep_data() {
        let template = XbrlTemplate::for_report_type(ReportType::Finrep);
        let outcome = template.validate(&finrep_data());
        assert!(outcome.is_valid(), "{:?}", outcome.errors);
    }

    #[test]
    fn test_missing_and_negative_fields() {
        let template = XbrlTemplate::for_report_type(ReportType::Finrep);
        let mut data = finrep_data();
        data.remove("currency");
        data.insert("total_equity".to_string(), json!(-5.0));
        data.insert("institution_code".to_string(), json!("  "));

        let outcome = template.validate(&data);
        assert!(!outcome.is_valid());
        assert!(outcome.errors.contains(&"Missing required field: currency".to_string()));
        assert!(outcome
            .errors
            .contains(&"total_equity must be a non-negative number".to_string()));
        assert!(outcome
            .errors
            .contains(&"institution_code must be a non-empty string".to_string()));
    }

    #[test]
    fn test_period_format_rejected() {
        let template = XbrlTemplate::for_report_type(ReportType::Finrep);
        for period in ["2024", "2024-13", "2024-Q5", "Q1-2024"] {
            let mut data = finrep_data();
            data.insert("reporting_period".to_string(), json!(period));
            let outcome = template.validate(&data);
            assert!(!outcome.is_valid(), "{period} should be rejected");
        }
    }

    #[test]
    fn test_unbalanced_sheet_rejected() {
        let template = XbrlTemplate::for_report_type(ReportType::Finrep);
        let mut data = finrep_data();
        data.insert("total_equity".to_string(), json!(150_000.0));
        let outcome = template.validate(&data);
        assert!(!outcome.is_valid());
        assert!(outcome.errors[0].starts_with("Balance sheet equation violated"));
    }

    #[test]
    fn test_generate_quarterly_instance() {
        let template = XbrlTemplate::for_report_type(ReportType::Finrep);
        let xml = template.generate(&finrep_data()).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("xmlns:eba=\"http://www.eba.europa.eu/xbrl/crr\""));
        assert!(xml.contains("xlink:href=\"http://www.eba.europa.eu/eu/fr/xbrl/crr/fws/finrep/its-005-2020/2021-06-30/mod/finrep_cor.xsd\""));
        assert!(xml.contains(
            "<xbrli:identifier scheme=\"http://www.eba.europa.eu\">TESTBANK01</xbrli:identifier>"
        ));
        assert!(xml.contains("<xbrli:startDate>2024-01-01</xbrli:startDate>"));
        assert!(xml.contains("<xbrli:endDate>2024-03-31</xbrli:endDate>"));
        assert!(xml.contains("<xbrli:measure>iso4217:EUR</xbrli:measure>"));
        assert!(xml.contains(
            "<eba:Assets contextRef=\"c1\" unitRef=\"EUR\" decimals=\"0\">1000000</eba:Assets>"
        ));
        assert!(xml.contains(
            "<eba:NameOfReportingAgent contextRef=\"c1\">Test Bank AG</eba:NameOfReportingAgent>"
        ));
        assert!(xml.contains(">-12500</eba:ProfitOrLoss>"));
        assert!(!xml.contains("xbrli:pure"));
    }

    #[test]
    fn test_generate_monthly_instant() {
        let template = XbrlTemplate::for_report_type(ReportType::Finrep);
        let mut data = finrep_data();
        data.insert("reporting_period".to_string(), json!("2024-02"));
        let xml = template.generate(&data).unwrap();
        assert!(xml.contains("<xbrli:instant>2024-02-29</xbrli:instant>"));
        assert!(!xml.contains("xbrli:startDate"));
    }

    #[test]
    fn test_ratios_use_pure_unit() {
        let template = XbrlTemplate::for_report_type(ReportType::Corep);
        let data = json!({
            "institution_name": "Test Bank AG",
            "institution_code": "TESTBANK01",
            "reporting_period": "2024-Q2",
            "currency": "EUR",
            "tier1_capital": 150,
            "total_capital": 200,
            "risk_weighted_assets": 1200,
            "capital_ratio": 16.67,
        })
        .as_object()
        .cloned()
        .unwrap();

        assert!(template.validate(&data).is_valid());
        let xml = template.generate(&data).unwrap();
        assert!(xml.contains("<xbrli:measure>xbrli:pure</xbrli:measure>"));
        assert!(xml.contains(
            "<eba:TotalCapitalRatio contextRef=\"c1\" unitRef=\"pure\" decimals=\"2\">16.67</eba:TotalCapitalRatio>"
        ));
        assert!(xml.contains(
            "<eba:Tier1Capital contextRef=\"c1\" unitRef=\"EUR\" decimals=\"0\">150</eba:Tier1Capital>"
        ));
    }

    #[test]
    fn test_load_rejects_malformed_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finrep.xml");
        fs::write(&path, "<xbrli:xbrl><unclosed></xbrli:xbrl>").unwrap();
        assert!(matches!(
            XbrlTemplate::load(&path),
            Err(ReportingError::TemplateLoad { .. })
        ));

        fs::write(&path, "<xbrli:xbrl>").unwrap();
        assert!(XbrlTemplate::load(&path).is_err());
    }

    #[test]
    fn test_load_reads_header_and_taxonomy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finrep.xml");
        fs::write(
            &path,
            r#"<?xml version="1.0"?>
<xbrli:xbrl version="3.2.0" xmlns:xbrli="http://www.xbrl.org/2003/instance" xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:schemaRef xlink:type="simple" xlink:href="http://example.org/finrep.xsd"/>
</xbrli:xbrl>"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("finrep_taxonomy.xml"),
            "<taxonomy><concept name=\"eba:Assets\"/></taxonomy>",
        )
        .unwrap();

        let template = XbrlTemplate::load(&path).unwrap();
        assert_eq!(template.key(), "xbrl_finrep");
        assert_eq!(template.version(), "3.2.0");
        assert_eq!(template.report_type(), ReportType::Finrep);
        assert!(template.taxonomy_path().is_some());

        let xml = template.generate(&finrep_data()).unwrap();
        assert!(xml.contains("xlink:href=\"http://example.org/finrep.xsd\""));
    }
}
