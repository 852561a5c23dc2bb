// Extraction layer: turns lab documents into biomarker panels.

pub mod catalog;
pub mod lab_report;
pub mod microbiome;
pub mod reference;
pub mod tabular;
pub mod text;

pub use catalog::{BiomarkerCatalog, KnownBiomarker};
pub use lab_report::LabReportExtractor;
pub use microbiome::extract_microbiome;
pub use tabular::import_csv;
