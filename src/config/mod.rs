pub mod cli;
pub mod toml_config;

use crate::core::ConfigProvider;
use crate::domain::model::{PatientInfo, Sex};
use crate::scoring::ModelSettings;
use crate::utils::error::{AlgoLifeError, Result};
use crate::utils::validation::{
    validate_file_extensions, validate_path, validate_positive_number, validate_range, Validate,
};
#[cfg(feature = "cli")]
use clap::Parser;
use serde::{Deserialize, Serialize};

pub const BIOLOGY_EXTENSIONS: &[&str] = &["txt", "text", "md", "csv"];
pub const MICROBIOME_EXTENSIONS: &[&str] = &["txt", "text", "md"];
pub const MIN_POPULATION: usize = 3;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "algolife")]
#[command(about = "Functional biology analysis: biomarkers, rules, indices and report")]
pub struct CliConfig {
    /// Lab reports (text) or biology tables (CSV), comma separated
    #[arg(long, value_delimiter = ',')]
    pub biology: Vec<String>,

    /// GutMAP-style microbiome reports converted to text
    #[arg(long, value_delimiter = ',')]
    pub microbiome: Vec<String>,

    /// Directory holding the rule sheets as CSV files
    #[arg(long)]
    pub rules_dir: Option<String>,

    /// Single rule table with free-form column names
    #[arg(long)]
    pub flexible_rules: Option<String>,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long)]
    pub patient_name: Option<String>,

    #[arg(long)]
    pub age: Option<u32>,

    #[arg(long, default_value = "H")]
    pub sex: Sex,

    #[arg(long)]
    pub biological_age: Option<f64>,

    #[arg(long, default_value = "42")]
    pub seed: u64,

    #[arg(long, default_value = "80")]
    pub population_size: usize,

    /// Apply flexible rules to in-range biomarkers as well
    #[arg(long)]
    pub all_statuses: bool,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn biology_inputs(&self) -> &[String] {
        &self.biology
    }

    fn microbiome_inputs(&self) -> &[String] {
        &self.microbiome
    }

    fn rules_dir(&self) -> Option<&str> {
        self.rules_dir.as_deref()
    }

    fn flexible_rules(&self) -> Option<&str> {
        self.flexible_rules.as_deref()
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn patient(&self) -> PatientInfo {
        PatientInfo {
            name: self.patient_name.clone(),
            age: self.age,
            sex: self.sex,
            biological_age: self.biological_age,
        }
    }

    fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            seed: self.seed,
            population_size: self.population_size,
            ..Default::default()
        }
    }

    fn only_outliers(&self) -> bool {
        !self.all_statuses
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_inputs(
            &self.biology,
            &self.microbiome,
            self.flexible_rules.as_deref(),
        )?;
        validate_path("output_path", &self.output_path)?;
        if let Some(dir) = &self.rules_dir {
            validate_path("rules_dir", dir)?;
        }
        validate_patient(&self.patient())?;
        validate_positive_number("population_size", self.population_size, MIN_POPULATION)?;
        Ok(())
    }
}

/// Shared by the CLI and TOML front ends.
pub(crate) fn validate_inputs(
    biology: &[String],
    microbiome: &[String],
    flexible_rules: Option<&str>,
) -> Result<()> {
    if biology.is_empty() && microbiome.is_empty() {
        return Err(AlgoLifeError::MissingConfigError {
            field: "biology".to_string(),
        });
    }
    validate_file_extensions("biology", biology, BIOLOGY_EXTENSIONS)?;
    validate_file_extensions("microbiome", microbiome, MICROBIOME_EXTENSIONS)?;
    if let Some(file) = flexible_rules {
        validate_file_extensions("flexible_rules", &[file.to_string()], &["csv"])?;
    }
    Ok(())
}

pub(crate) fn validate_patient(patient: &PatientInfo) -> Result<()> {
    if let Some(age) = patient.age {
        validate_range("patient.age", age, 1, 120)?;
    }
    if let Some(bio_age) = patient.biological_age {
        validate_range("patient.biological_age", bio_age, 1.0, 150.0)?;
    }
    Ok(())
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliConfig {
        let mut argv = vec!["algolife"];
        argv.extend_from_slice(args);
        CliConfig::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--biology", "bilan.txt,complement.csv"]);
        assert_eq!(config.biology, vec!["bilan.txt", "complement.csv"]);
        assert_eq!(config.output_path, "./output");
        assert_eq!(config.sex, Sex::Male);
        assert_eq!(config.model_settings(), ModelSettings::default());
        assert!(config.only_outliers());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_patient_flags() {
        let config = parse(&[
            "--biology",
            "bilan.txt",
            "--patient-name",
            "Jeanne",
            "--age",
            "52",
            "--sex",
            "F",
            "--biological-age",
            "55.5",
        ]);
        let patient = config.patient();
        assert_eq!(patient.display_name(), "Jeanne");
        assert_eq!(patient.sex, Sex::Female);
        assert_eq!(patient.biological_age, Some(55.5));
    }

    #[test]
    fn test_validation_failures() {
        assert!(matches!(
            parse(&[]).validate(),
            Err(AlgoLifeError::MissingConfigError { .. })
        ));
        assert!(parse(&["--biology", "bilan.pdf"]).validate().is_err());
        assert!(parse(&["--biology", "bilan.txt", "--population-size", "2"])
            .validate()
            .is_err());
        assert!(parse(&["--biology", "bilan.txt", "--age", "0"]).validate().is_err());
        assert!(parse(&["--biology", "bilan.txt", "--flexible-rules", "rules.xlsx"])
            .validate()
            .is_err());
    }
}
