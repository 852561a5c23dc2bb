use crate::domain::model::{AnalysisReport, PatientInfo, PatientRecord};
use crate::extract::catalog::BiomarkerCatalog;
use crate::scoring::model::ModelSettings;
use crate::utils::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn biology_inputs(&self) -> &[String];
    fn microbiome_inputs(&self) -> &[String];
    fn rules_dir(&self) -> Option<&str>;
    fn flexible_rules(&self) -> Option<&str>;
    fn output_path(&self) -> &str;
    fn patient(&self) -> PatientInfo;
    fn model_settings(&self) -> ModelSettings;

    fn catalog(&self) -> BiomarkerCatalog {
        BiomarkerCatalog::default()
    }

    fn lifestyle_scores(&self) -> IndexMap<String, f64> {
        IndexMap::new()
    }

    fn only_outliers(&self) -> bool {
        true
    }

    fn outlier_statuses(&self) -> Vec<String> {
        crate::rules::flexible::DEFAULT_OUTLIER_STATUSES
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<PatientRecord>;
    async fn transform(&self, record: PatientRecord) -> Result<AnalysisReport>;
    async fn load(&self, report: AnalysisReport) -> Result<String>;
}
