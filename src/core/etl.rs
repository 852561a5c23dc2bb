use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

/// Runs the three pipeline phases in order and reports progress.
pub struct AnalysisEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> AnalysisEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::default(),
        }
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("Starting analysis...");
        self.monitor.log_phase("Start");

        tracing::info!("Extracting biomarkers...");
        let record = self.pipeline.extract().await?;
        tracing::info!(
            "Extracted {} biomarkers for {}{}",
            record.biology.len(),
            record.patient.display_name(),
            if record.microbiome.is_some() {
                " (with microbiome report)"
            } else {
                ""
            }
        );
        self.monitor.log_phase("Extract");

        tracing::info!("Analysing...");
        let report = self.pipeline.transform(record).await?;
        let findings = report
            .recommendations
            .as_ref()
            .map(|r| r.base.total)
            .unwrap_or(0);
        tracing::info!(
            "Analysis done: {} markers, {} findings, {} composite indices, model {}",
            report.markers.len(),
            findings,
            report.indices.scores().len(),
            if report.model.success {
                "fitted"
            } else {
                "skipped"
            }
        );
        self.monitor.log_phase("Transform");

        tracing::info!("Writing report...");
        let output_path = self.pipeline.load(report).await?;
        tracing::info!("Report saved to: {}", output_path);
        self.monitor.log_phase("Load");
        self.monitor.log_summary();

        Ok(output_path)
    }
}
