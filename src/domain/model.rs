use crate::extract::text::fold_accents;
use crate::rules::engine::ConsolidatedRecommendations;
use crate::rules::flexible::FlexibleRulesOutcome;
use crate::scoring::indices::{CompositeIndices, IndexRecommendation};
use crate::scoring::metrics::MetricsReport;
use crate::scoring::model::ModelResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[default]
    Male,
    Female,
}

impl Sex {
    /// Short code used by the rule sheets ("Normes H" / "Normes F").
    pub fn code(&self) -> &'static str {
        match self {
            Sex::Male => "H",
            Sex::Female => "F",
        }
    }
}

impl FromStr for Sex {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = fold_accents(raw.trim()).to_lowercase();
        match s.as_str() {
            "h" | "m" | "homme" | "masculin" | "male" | "man" => Ok(Sex::Male),
            "f" | "femme" | "feminin" | "female" | "woman" => Ok(Sex::Female),
            _ => Err(format!("unknown sex '{}', expected H or F", raw)),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub name: Option<String>,
    /// Chronological age in years.
    pub age: Option<u32>,
    pub sex: Sex,
    /// Epigenetic (biological) age, when an epigenetic test was provided.
    pub biological_age: Option<f64>,
}

impl PatientInfo {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Patient")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    Range,
    LowerBound,
    UpperBound,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRange {
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub kind: ReferenceKind,
}

impl ReferenceRange {
    pub fn range(low: f64, high: f64) -> Self {
        Self {
            low: Some(low),
            high: Some(high),
            kind: ReferenceKind::Range,
        }
    }

    pub fn lower_bound(low: f64) -> Self {
        Self {
            low: Some(low),
            high: None,
            kind: ReferenceKind::LowerBound,
        }
    }

    pub fn upper_bound(high: f64) -> Self {
        Self {
            low: None,
            high: Some(high),
            kind: ReferenceKind::UpperBound,
        }
    }

    pub fn from_bounds(low: Option<f64>, high: Option<f64>) -> Option<Self> {
        match (low, high) {
            (Some(l), Some(h)) => Some(Self::range(l, h)),
            (Some(l), None) => Some(Self::lower_bound(l)),
            (None, Some(h)) => Some(Self::upper_bound(h)),
            (None, None) => None,
        }
    }

    pub fn status(&self, value: f64) -> BiomarkerStatus {
        if let Some(low) = self.low {
            if value < low {
                return BiomarkerStatus::Low;
            }
        }
        if let Some(high) = self.high {
            if value > high {
                return BiomarkerStatus::High;
            }
        }
        BiomarkerStatus::Normal
    }
}

impl fmt::Display for ReferenceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.low, self.high) {
            (Some(l), Some(h)) => write!(f, "{}-{}", l, h),
            (Some(l), None) => write!(f, ">{}", l),
            (None, Some(h)) => write!(f, "<{}", h),
            (None, None) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BiomarkerStatus {
    Low,
    Normal,
    High,
    Optimal,
    Unknown,
}

impl BiomarkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BiomarkerStatus::Low => "low",
            BiomarkerStatus::Normal => "normal",
            BiomarkerStatus::High => "high",
            BiomarkerStatus::Optimal => "optimal",
            BiomarkerStatus::Unknown => "unknown",
        }
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, BiomarkerStatus::Low | BiomarkerStatus::High)
    }
}

impl fmt::Display for BiomarkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    Targeted,
    SynlabLine,
    GenericLine,
    Tabular,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionSource::Targeted => "targeted",
            ExtractionSource::SynlabLine => "synlab_line",
            ExtractionSource::GenericLine => "generic_line",
            ExtractionSource::Tabular => "tabular",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Biomarker {
    pub name: String,
    pub key: String,
    pub value: f64,
    pub unit: String,
    pub reference: Option<ReferenceRange>,
    pub canonical_key: Option<String>,
    pub source: ExtractionSource,
    pub line_number: Option<usize>,
    pub raw_text: String,
    pub sample_date: Option<String>,
}

impl Biomarker {
    pub fn status(&self) -> BiomarkerStatus {
        self.reference
            .map(|r| r.status(self.value))
            .unwrap_or(BiomarkerStatus::Unknown)
    }
}

/// Biomarkers keyed by normalized name, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BiologyPanel {
    entries: IndexMap<String, Biomarker>,
}

impl BiologyPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the key was already present; the first entry is kept.
    pub fn insert(&mut self, biomarker: Biomarker) -> bool {
        if self.entries.contains_key(&biomarker.key) {
            return false;
        }
        self.entries.insert(biomarker.key.clone(), biomarker);
        true
    }

    pub fn merge(&mut self, other: BiologyPanel) -> usize {
        let mut added = 0;
        for biomarker in other.entries.into_values() {
            if self.insert(biomarker) {
                added += 1;
            }
        }
        added
    }

    pub fn get(&self, key: &str) -> Option<&Biomarker> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Biomarker> {
        self.entries.get_mut(key)
    }

    pub fn find_by_canonical_mut(&mut self, canonical_key: &str) -> Option<&mut Biomarker> {
        self.entries
            .values_mut()
            .find(|b| b.canonical_key.as_deref() == Some(canonical_key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Biomarker> {
        self.entries.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Biomarker> {
        self.entries.values_mut()
    }

    /// `(display name, value)` pairs, the shape the rule engines match on.
    pub fn named_values(&self) -> Vec<(String, f64)> {
        self.entries
            .values()
            .map(|b| (b.name.clone(), b.value))
            .collect()
    }
}

/// Flat canonical-key → value view used by scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkerSet {
    values: IndexMap<String, f64>,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the first value seen for a key.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.values.entry(key.into()).or_insert(value);
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn first_of(&self, keys: &[&str]) -> Option<f64> {
        keys.iter().find_map(|k| self.get(k))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.values.iter()
    }
}

impl FromIterator<(String, f64)> for MarkerSet {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut set = MarkerSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacteriaGroup {
    pub name: String,
    pub result: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicrobiomeReport {
    pub dysbiosis_index: Option<u8>,
    pub dysbiosis_status: Option<String>,
    pub diversity: Option<String>,
    /// Ordinal 1 (reduced) to 3 (as expected); not a Shannon index.
    pub diversity_score: Option<u8>,
    pub presence: IndexMap<String, bool>,
    pub groups: Vec<BacteriaGroup>,
}

impl MicrobiomeReport {
    pub fn is_useful(&self) -> bool {
        self.dysbiosis_index.is_some()
            || self.diversity.is_some()
            || self.presence.values().any(|present| *present)
            || !self.groups.is_empty()
    }
}

/// Output of the extract phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientRecord {
    pub patient: PatientInfo,
    pub biology: BiologyPanel,
    pub microbiome: Option<MicrobiomeReport>,
    pub lifestyle: IndexMap<String, f64>,
}

/// Output of the transform phase; everything the report needs.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub patient: PatientInfo,
    pub analysis_date: String,
    pub biology: BiologyPanel,
    pub markers: MarkerSet,
    pub microbiome: Option<MicrobiomeReport>,
    pub recommendations: Option<ConsolidatedRecommendations>,
    pub flexible_rules: Option<FlexibleRulesOutcome>,
    pub metrics: MetricsReport,
    pub indices: CompositeIndices,
    pub model: ModelResult,
    pub index_recommendations: Vec<IndexRecommendation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(key: &str, value: f64) -> Biomarker {
        Biomarker {
            name: key.to_string(),
            key: key.to_string(),
            value,
            unit: String::new(),
            reference: None,
            canonical_key: None,
            source: ExtractionSource::Tabular,
            line_number: None,
            raw_text: String::new(),
            sample_date: None,
        }
    }

    #[test]
    fn test_sex_parsing() {
        assert_eq!("H".parse::<Sex>().unwrap(), Sex::Male);
        assert_eq!("Féminin".parse::<Sex>().unwrap(), Sex::Female);
        assert_eq!(" f ".parse::<Sex>().unwrap(), Sex::Female);
        assert!("x".parse::<Sex>().is_err());
    }

    #[test]
    fn test_reference_status() {
        let r = ReferenceRange::range(12.5, 32.2);
        assert_eq!(r.status(10.0), BiomarkerStatus::Low);
        assert_eq!(r.status(18.0), BiomarkerStatus::Normal);
        assert_eq!(r.status(40.0), BiomarkerStatus::High);
        assert_eq!(ReferenceRange::lower_bound(30.0).status(20.0), BiomarkerStatus::Low);
        assert_eq!(ReferenceRange::upper_bound(5.4).status(5.4), BiomarkerStatus::Normal);
        assert_eq!(r.to_string(), "12.5-32.2");
        assert_eq!(ReferenceRange::lower_bound(30.0).to_string(), ">30");
    }

    #[test]
    fn test_panel_keeps_first_entry() {
        let mut panel = BiologyPanel::new();
        assert!(panel.insert(marker("crp", 1.0)));
        assert!(!panel.insert(marker("crp", 9.0)));
        assert_eq!(panel.get("crp").unwrap().value, 1.0);

        let mut other = BiologyPanel::new();
        other.insert(marker("crp", 5.0));
        other.insert(marker("hdl", 60.0));
        assert_eq!(panel.merge(other), 1);
        assert_eq!(panel.len(), 2);
    }

    #[test]
    fn test_marker_set_first_value_wins() {
        let mut set = MarkerSet::new();
        set.insert("crp", 1.0);
        set.insert("crp", 2.0);
        assert_eq!(set.get("crp"), Some(1.0));
        set.set("crp", 3.0);
        assert_eq!(set.get("crp"), Some(3.0));
        assert_eq!(set.first_of(&["missing", "crp"]), Some(3.0));
    }
}
