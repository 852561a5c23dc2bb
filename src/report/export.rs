//! CSV exports bundled next to the Markdown report.

use crate::domain::model::BiologyPanel;
use crate::rules::engine::{Finding, RuleType};
use crate::utils::error::{AlgoLifeError, Result};
use csv::Writer;

pub const BIOMARKER_COLUMNS: &[&str] = &[
    "name",
    "key",
    "value",
    "unit",
    "ref_low",
    "ref_high",
    "status",
    "canonical_key",
    "source",
];

pub const FINDING_COLUMNS: &[&str] = &[
    "priority",
    "type",
    "category",
    "biomarker",
    "value",
    "direction",
    "norm",
    "interpretation",
    "nutrition",
    "supplementation",
    "lifestyle",
    "monitoring",
];

fn finish(writer: Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| AlgoLifeError::IoError(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| AlgoLifeError::ProcessingError {
        message: format!("CSV export is not valid UTF-8: {}", e),
    })
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn biomarkers_csv(panel: &BiologyPanel) -> Result<String> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(BIOMARKER_COLUMNS)?;

    for b in panel.iter() {
        writer.write_record([
            b.name.clone(),
            b.key.clone(),
            b.value.to_string(),
            b.unit.clone(),
            opt(b.reference.and_then(|r| r.low)),
            opt(b.reference.and_then(|r| r.high)),
            b.status().as_str().to_string(),
            b.canonical_key.clone().unwrap_or_default(),
            b.source.as_str().to_string(),
        ])?;
    }

    finish(writer)
}

pub fn findings_csv(findings: &[Finding]) -> Result<String> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(FINDING_COLUMNS)?;

    for f in findings {
        let rule_type = match f.rule_type {
            RuleType::Bio => "bio",
            RuleType::Microbiome => "microbiome",
        };
        writer.write_record([
            f.priority.as_str(),
            rule_type,
            f.category.as_str(),
            f.biomarker.as_str(),
            f.value.to_string().as_str(),
            f.direction.as_str(),
            f.norm.as_str(),
            f.advice.interpretation.as_str(),
            f.advice.nutrition.as_str(),
            f.advice.supplementation.as_str(),
            f.advice.lifestyle.as_str(),
            f.advice.monitoring.as_str(),
        ])?;
    }

    finish(writer)
}
