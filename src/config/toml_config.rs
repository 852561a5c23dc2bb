use crate::core::ConfigProvider;
use crate::domain::model::{PatientInfo, Sex};
use crate::extract::{BiomarkerCatalog, KnownBiomarker};
use crate::scoring::ModelSettings;
use crate::utils::error::{AlgoLifeError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range, Validate,
};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub patient: PatientConfig,
    pub inputs: InputsConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub lifestyle: IndexMap<String, f64>,
    pub output: OutputConfig,
    pub monitoring: Option<MonitoringConfig>,
    /// Catalogue extensions, keyed by canonical biomarker key.
    #[serde(default)]
    pub biomarkers: IndexMap<String, KnownBiomarker>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientConfig {
    pub name: Option<String>,
    pub age: Option<u32>,
    /// "H" or "F"; parsed during validation.
    pub sex: Option<String>,
    pub biological_age: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputsConfig {
    #[serde(default)]
    pub biology: Vec<String>,
    #[serde(default)]
    pub microbiome: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    pub dir: Option<String>,
    pub flexible_file: Option<String>,
    #[serde(default = "default_only_outliers")]
    pub only_outliers: bool,
    #[serde(default)]
    pub outlier_statuses: Vec<String>,
}

fn default_only_outliers() -> bool {
    true
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            dir: None,
            flexible_file: None,
            only_outliers: true,
            outlier_statuses: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_level: Option<String>,
    pub system_stats: Option<bool>,
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("Invalid env var regex"))
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AlgoLifeError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed_content)?)
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are left as is.
    fn substitute_env_vars(content: &str) -> String {
        env_var_regex()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    fn parse_sex(&self) -> Result<Sex> {
        match &self.patient.sex {
            None => Ok(Sex::default()),
            Some(raw) => raw
                .parse()
                .map_err(|reason| AlgoLifeError::InvalidConfigValueError {
                    field: "patient.sex".to_string(),
                    value: raw.clone(),
                    reason,
                }),
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("analysis.name", &self.analysis.name)?;
        super::validate_inputs(
            &self.inputs.biology,
            &self.inputs.microbiome,
            self.rules.flexible_file.as_deref(),
        )?;
        validate_path("output.output_path", &self.output.output_path)?;
        if let Some(dir) = &self.rules.dir {
            validate_path("rules.dir", dir)?;
        }

        self.parse_sex()?;
        super::validate_patient(&self.patient())?;

        validate_positive_number(
            "model.population_size",
            self.model.population_size,
            super::MIN_POPULATION,
        )?;
        validate_range("model.noise_sd", self.model.noise_sd, 0.0, 100.0)?;

        for (name, value) in &self.lifestyle {
            if !value.is_finite() {
                return Err(AlgoLifeError::InvalidConfigValueError {
                    field: format!("lifestyle.{}", name),
                    value: value.to_string(),
                    reason: "Lifestyle scores must be finite numbers".to_string(),
                });
            }
        }

        for (key, entry) in &self.biomarkers {
            if entry.lab_names.iter().all(|n| n.trim().is_empty()) {
                return Err(AlgoLifeError::ConfigValidationError {
                    field: format!("biomarkers.{}.lab_names", key),
                    message: "At least one lab name is required".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn system_stats_enabled(&self) -> bool {
        self.monitoring
            .as_ref()
            .map(|m| m.enabled && m.system_stats.unwrap_or(true))
            .unwrap_or(false)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.monitoring.as_ref().and_then(|m| m.log_level.as_deref())
    }
}

impl ConfigProvider for TomlConfig {
    fn biology_inputs(&self) -> &[String] {
        &self.inputs.biology
    }

    fn microbiome_inputs(&self) -> &[String] {
        &self.inputs.microbiome
    }

    fn rules_dir(&self) -> Option<&str> {
        self.rules.dir.as_deref()
    }

    fn flexible_rules(&self) -> Option<&str> {
        self.rules.flexible_file.as_deref()
    }

    fn output_path(&self) -> &str {
        &self.output.output_path
    }

    fn patient(&self) -> PatientInfo {
        PatientInfo {
            name: self.patient.name.clone(),
            age: self.patient.age,
            sex: self.parse_sex().unwrap_or_default(),
            biological_age: self.patient.biological_age,
        }
    }

    fn model_settings(&self) -> ModelSettings {
        self.model.clone()
    }

    fn catalog(&self) -> BiomarkerCatalog {
        let mut catalog = BiomarkerCatalog::default();
        for (key, entry) in &self.biomarkers {
            catalog.insert(key.clone(), entry.clone());
        }
        catalog
    }

    fn lifestyle_scores(&self) -> IndexMap<String, f64> {
        self.lifestyle.clone()
    }

    fn only_outliers(&self) -> bool {
        self.rules.only_outliers
    }

    fn outlier_statuses(&self) -> Vec<String> {
        if self.rules.outlier_statuses.is_empty() {
            crate::rules::flexible::DEFAULT_OUTLIER_STATUSES
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            self.rules.outlier_statuses.clone()
        }
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_CONFIG: &str = r#"
[analysis]
name = "bilan-fonctionnel"
description = "Bilan complet"
version = "1.0"

[patient]
name = "Jeanne Martin"
age = 52
sex = "F"
biological_age = 55.5

[inputs]
biology = ["bilan.txt", "complement.csv"]
microbiome = ["gutmap_DI-3_EN.txt"]

[rules]
dir = "rules"
flexible_file = "rules/flexible.csv"
only_outliers = false

[model]
seed = 7
population_size = 120

[lifestyle]
sommeil = 6.5
activite = 3.0

[output]
output_path = "./output"

[monitoring]
enabled = true
log_level = "debug"

[biomarkers.vit_b12]
lab_names = ["vitamine b12", "cobalamine"]
unit = "pg/mL"
"#;

    const MINIMAL_CONFIG: &str = r#"
[analysis]
name = "minimal"

[inputs]
biology = ["bilan.txt"]

[output]
output_path = "./output"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = TomlConfig::from_toml_str(FULL_CONFIG).unwrap();

        assert_eq!(config.analysis.name, "bilan-fonctionnel");
        let patient = config.patient();
        assert_eq!(patient.sex, Sex::Female);
        assert_eq!(patient.age, Some(52));
        assert_eq!(config.rules_dir(), Some("rules"));
        assert!(!config.only_outliers());

        let settings = config.model_settings();
        assert_eq!(settings.seed, 7);
        assert_eq!(settings.population_size, 120);
        assert_eq!(settings.noise_sd, 0.5);

        let lifestyle = config.lifestyle_scores();
        assert_eq!(lifestyle.keys().collect::<Vec<_>>(), vec!["sommeil", "activite"]);

        let catalog = config.catalog();
        assert_eq!(catalog.canonical_key_for("Vitamine B12 sérique"), Some("vit_b12"));
        assert!(catalog.contains_key("crp"));

        assert!(config.monitoring_enabled());
        assert_eq!(config.log_level(), Some("debug"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = TomlConfig::from_toml_str(MINIMAL_CONFIG).unwrap();
        assert_eq!(config.model_settings(), ModelSettings::default());
        assert!(config.only_outliers());
        assert!(!config.outlier_statuses().is_empty());
        assert_eq!(config.patient(), PatientInfo::default());
        assert!(!config.monitoring_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("ALGOLIFE_TEST_OUTPUT", "/tmp/algolife-out");

        let toml_content = MINIMAL_CONFIG.replace("./output", "${ALGOLIFE_TEST_OUTPUT}");
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert_eq!(config.output_path(), "/tmp/algolife-out");

        std::env::remove_var("ALGOLIFE_TEST_OUTPUT");
    }

    #[test]
    fn test_unknown_env_var_is_kept() {
        let toml_content = MINIMAL_CONFIG.replace("./output", "${ALGOLIFE_SURELY_UNSET_VAR}");
        let config = TomlConfig::from_toml_str(&toml_content).unwrap();
        assert_eq!(config.output_path(), "${ALGOLIFE_SURELY_UNSET_VAR}");
    }

    #[test]
    fn test_config_validation() {
        let bad_sex = MINIMAL_CONFIG.replace("[inputs]", "[patient]\nsex = \"X\"\n\n[inputs]");
        let config = TomlConfig::from_toml_str(&bad_sex).unwrap();
        assert!(matches!(
            config.validate(),
            Err(AlgoLifeError::InvalidConfigValueError { ref field, .. }) if field == "patient.sex"
        ));

        let no_inputs = MINIMAL_CONFIG.replace("biology = [\"bilan.txt\"]", "");
        let config = TomlConfig::from_toml_str(&no_inputs).unwrap();
        assert!(config.validate().is_err());

        let tiny_population = format!("{}\n[model]\npopulation_size = 2\n", MINIMAL_CONFIG);
        let config = TomlConfig::from_toml_str(&tiny_population).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let err = TomlConfig::from_toml_str("[analysis\nname = 1").unwrap_err();
        assert!(matches!(err, AlgoLifeError::TomlParseError(_)));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL_CONFIG.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.analysis.name, "minimal");
    }
}
