use crate::core::{ConfigProvider, Pipeline, Storage};
use crate::domain::model::{AnalysisReport, BiologyPanel, MicrobiomeReport, PatientRecord};
use crate::extract::{extract_microbiome, import_csv, LabReportExtractor};
use crate::report::{biomarkers_csv, findings_csv, render_markdown};
use crate::rules::{FlexibleRulesEngine, RulesEngine};
use crate::scoring::{build_predictive_model, calculate_all, collect_features, MetricEngine};
use crate::utils::error::{AlgoLifeError, Result};
use std::io::Write;
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};

pub const REPORT_ARCHIVE: &str = "algolife_report.zip";

pub struct AnalysisPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
}

impl<S: Storage, C: ConfigProvider> AnalysisPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Self {
        Self { storage, config }
    }

    async fn read_biology(&self, path: &str, extractor: &LabReportExtractor) -> Result<BiologyPanel> {
        let bytes = self.storage.read_file(path).await?;
        if is_csv(path) {
            let (panel, warnings) = import_csv(&bytes)?;
            for warning in &warnings {
                tracing::warn!("{}: {}", path, warning);
            }
            tracing::debug!("{}: {} rows imported", path, panel.len());
            Ok(panel)
        } else {
            let text = String::from_utf8_lossy(&bytes);
            let (known, panel) = extractor.extract_complete(&text);
            tracing::debug!(
                "{}: {} biomarkers ({} known)",
                path,
                panel.len(),
                known.len()
            );
            Ok(panel)
        }
    }

    async fn read_microbiome(&self, path: &str) -> Result<Option<MicrobiomeReport>> {
        let bytes = self.storage.read_file(path).await?;
        let text = String::from_utf8_lossy(&bytes);
        let filename = Path::new(path).file_name().and_then(|n| n.to_str());
        let report = extract_microbiome(&text, filename);
        if report.is_none() {
            tracing::warn!("{}: no microbiome data recognised", path);
        }
        Ok(report)
    }
}

fn is_csv(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

/// Canonical key when known, display name otherwise.
fn flexible_inputs(panel: &BiologyPanel) -> Vec<(String, f64)> {
    panel
        .iter()
        .map(|b| {
            let key = b.canonical_key.clone().unwrap_or_else(|| b.name.clone());
            (key, b.value)
        })
        .collect()
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for AnalysisPipeline<S, C> {
    async fn extract(&self) -> Result<PatientRecord> {
        let biology_inputs = self.config.biology_inputs();
        let microbiome_inputs = self.config.microbiome_inputs();
        if biology_inputs.is_empty() && microbiome_inputs.is_empty() {
            return Err(AlgoLifeError::ValidationError {
                message: "Aucun fichier d'entrée : fournir au moins un bilan biologique ou un rapport microbiote".to_string(),
            });
        }

        let catalog = self.config.catalog();
        let extractor = LabReportExtractor::new(catalog.clone());

        let mut biology = BiologyPanel::new();
        for path in biology_inputs {
            tracing::debug!("Reading biology input: {}", path);
            let panel = self.read_biology(path, &extractor).await?;
            let added = biology.merge(panel);
            tracing::info!("{}: {} new biomarkers", path, added);
        }
        catalog.annotate(&mut biology);

        let mut microbiome = None;
        for path in microbiome_inputs {
            tracing::debug!("Reading microbiome input: {}", path);
            if let Some(report) = self.read_microbiome(path).await? {
                if microbiome.is_some() {
                    tracing::warn!("{}: only the first microbiome report is kept", path);
                } else {
                    microbiome = Some(report);
                }
            }
        }

        Ok(PatientRecord {
            patient: self.config.patient(),
            biology,
            microbiome,
            lifestyle: self.config.lifestyle_scores(),
        })
    }

    async fn transform(&self, record: PatientRecord) -> Result<AnalysisReport> {
        let PatientRecord {
            patient,
            biology,
            microbiome,
            lifestyle,
        } = record;

        let markers = self.config.catalog().marker_set(&biology);
        tracing::debug!("{} canonical markers available", markers.len());

        let recommendations = match self.config.rules_dir() {
            Some(dir) => {
                let engine = RulesEngine::load(Path::new(dir))?;
                tracing::debug!("Rule sheets: {:?}", engine.summary());
                let consolidated = engine.generate_consolidated(
                    &biology.named_values(),
                    microbiome.as_ref(),
                    &patient,
                );
                tracing::info!(
                    "Rules: {} findings, health score {}",
                    consolidated.base.total,
                    consolidated.health_score
                );
                Some(consolidated)
            }
            None => None,
        };

        let flexible_rules = match self.config.flexible_rules() {
            Some(file) => {
                let engine = FlexibleRulesEngine::load(Path::new(file))?;
                let outcome = engine.apply(
                    &flexible_inputs(&biology),
                    &patient,
                    self.config.only_outliers(),
                    &self.config.outlier_statuses(),
                );
                tracing::debug!(
                    "Flexible rules: {} matched rules, {} priorities",
                    outcome.debug.matched_rules,
                    outcome.priorities.len()
                );
                Some(outcome)
            }
            None => None,
        };

        let metrics = MetricEngine::default().analyze(&markers, &patient);
        let indices = calculate_all(&markers);
        let features = collect_features(&indices, &markers, &lifestyle);
        let model = build_predictive_model(&features, &self.config.model_settings());
        let index_recommendations = indices.recommendations();

        Ok(AnalysisReport {
            patient,
            analysis_date: chrono::Local::now().format("%d/%m/%Y %H:%M").to_string(),
            biology,
            markers,
            microbiome,
            recommendations,
            flexible_rules,
            metrics,
            indices,
            model,
            index_recommendations,
        })
    }

    async fn load(&self, report: AnalysisReport) -> Result<String> {
        let output_dir = self.config.output_path().trim_end_matches('/');
        let output_path = format!("{}/{}", output_dir, REPORT_ARCHIVE);

        let findings = report
            .recommendations
            .as_ref()
            .map(|r| r.base.all.as_slice())
            .unwrap_or_default();

        tracing::debug!(
            "Creating ZIP file with {} files",
            3 + usize::from(!findings.is_empty())
        );

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            zip.start_file::<_, ()>("report.md", FileOptions::default())?;
            zip.write_all(render_markdown(&report).as_bytes())?;

            zip.start_file::<_, ()>("biomarkers.csv", FileOptions::default())?;
            zip.write_all(biomarkers_csv(&report.biology)?.as_bytes())?;

            zip.start_file::<_, ()>("analysis.json", FileOptions::default())?;
            let json_data = serde_json::to_string_pretty(&report)?;
            zip.write_all(json_data.as_bytes())?;

            if !findings.is_empty() {
                zip.start_file::<_, ()>("findings.csv", FileOptions::default())?;
                zip.write_all(findings_csv(findings)?.as_bytes())?;
            }

            let cursor = zip.finish()?;
            cursor.into_inner()
        };

        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.storage.write_file(&output_path, &zip_data).await?;

        tracing::debug!("ZIP file saved successfully");
        Ok(output_path)
    }
}
