pub mod config;
pub mod core;
pub mod domain;
pub mod extract;
pub mod report;
pub mod rules;
pub mod scoring;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::{cli::LocalStorage, toml_config::TomlConfig};

pub use core::{etl::AnalysisEngine, pipeline::AnalysisPipeline};
pub use domain::model::{AnalysisReport, PatientInfo, PatientRecord, Sex};
pub use utils::error::{AlgoLifeError, Result};
