use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use regreport_core::{ReportFormat, ReportType, ReportingError, ReportingResult};
use serde::Serialize;
use tracing::{info, warn};

use crate::templates::ReportTemplate;

/// 模板信息，用于列出可用模板
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TemplateInfo {
    pub key: String,
    pub format: ReportFormat,
    pub version: String,
    pub template_path: PathBuf,
}

/// 模板注册表，键为 `{format}_{type}`
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, ReportTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从模板根目录加载全部模板
    ///
    /// 目录结构为 `xbrl/*.xml`（`*_taxonomy.xml` 是分类标准，不作为模板）、`csv/*.json`、`json/*.json`。
    /// 根目录不存在时返回空注册表；任一模板文件损坏时整体失败。
    pub fn load_from_dir(dir: impl AsRef<Path>) -> ReportingResult<Self> {
        let dir = dir.as_ref();
        let mut registry = Self::new();

        if !dir.exists() {
            warn!("模板目录不存在: {}", dir.display());
            return Ok(registry);
        }

        for format in ReportFormat::ALL {
            let format_dir = dir.join(format.key());
            if !format_dir.is_dir() {
                continue;
            }

            let extension = match format {
                ReportFormat::Xbrl => "xml",
                ReportFormat::Csv | ReportFormat::Json => "json",
            };

            let mut paths: Vec<PathBuf> = fs::read_dir(&format_dir)
                .map_err(|e| ReportingError::TemplateLoad {
                    path: format_dir.display().to_string(),
                    message: e.to_string(),
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file())
                .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(extension))
                .filter(|path| {
                    !path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .map(|s| s.ends_with("_taxonomy"))
                        .unwrap_or(false)
                })
                .collect();
            paths.sort();

            for path in paths {
                let template = ReportTemplate::load(format, &path)?;
                registry.insert(template);
            }
        }

        info!("共加载 {} 个报告模板", registry.len());
        Ok(registry)
    }

    pub fn insert(&mut self, template: ReportTemplate) {
        self.templates.insert(template.key().to_string(), template);
    }

    pub fn template_key(format: ReportFormat, report_type: ReportType) -> String {
        format!("{}_{}", format.key(), report_type.key())
    }

    pub fn get(&self, format: ReportFormat, report_type: ReportType) -> Option<&ReportTemplate> {
        self.templates.get(&Self::template_key(format, report_type))
    }

    pub fn get_by_key(&self, key: &str) -> Option<&ReportTemplate> {
        self.templates.get(key)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// 按键排序的模板信息
    pub fn list(&self) -> Vec<TemplateInfo> {
        let mut infos: Vec<TemplateInfo> = self
            .templates
            .values()
            .map(|template| TemplateInfo {
                key: template.key().to_string(),
                format: template.format(),
                version: template.version().to_string(),
                template_path: template.source_path().to_path_buf(),
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }
}
