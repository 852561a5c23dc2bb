//! Sheet rules engine.
//!
//! Bio sheets carry one row per biomarker with sex-specific norms and advice
//! for the low and high side. The microbiome sheet carries trigger rules
//! scored against the bacteria groups of a microbiome report.

use crate::domain::model::{MicrobiomeReport, PatientInfo, Sex};
use crate::extract::reference::parse_norm;
use crate::extract::text::normalize_label;
use crate::rules::table::{resolve_sheet, RuleRow, RuleTable, SheetKind};
use crate::utils::error::{AlgoLifeError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::High => "Priorité haute",
            Priority::Medium => "Priorité moyenne",
            Priority::Low => "Priorité basse",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "BASSE")]
    Low,
    #[serde(rename = "HAUTE")]
    High,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Low => "BASSE",
            Direction::High => "HAUTE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Bio,
    Microbiome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub interpretation: String,
    pub nutrition: String,
    pub supplementation: String,
    pub lifestyle: String,
    pub monitoring: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FindingValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingValue::Number(v) => write!(f, "{}", v),
            FindingValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_type: RuleType,
    pub priority: Priority,
    pub category: String,
    pub title: String,
    pub biomarker: String,
    pub value: FindingValue,
    pub direction: Direction,
    pub norm: String,
    pub advice: Advice,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ByPriority {
    pub high: Vec<Finding>,
    pub medium: Vec<Finding>,
    pub low: Vec<Finding>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub total: usize,
    pub all: Vec<Finding>,
    pub by_priority: ByPriority,
    pub by_category: IndexMap<String, Vec<Finding>>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedRecommendations {
    #[serde(flatten)]
    pub base: RecommendationSet,
    pub health_score: u32,
    pub axes: IndexMap<String, Vec<Finding>>,
    pub patient: PatientInfo,
    pub alerts: Vec<Finding>,
    pub nutrition: Vec<String>,
    pub supplementation: Vec<String>,
    pub lifestyle: Vec<String>,
    pub monitoring: Vec<String>,
}

const AXIS_KEYWORDS: &[(&str, &[&str])] = &[
    ("metabolisme", &["metabol", "glyc", "insuline", "glucose", "lipide", "trigly"]),
    ("inflammation", &["inflamm", "crp", "cytokine", "oxydatif", "ferritine"]),
    ("hormones", &["hormone", "thyroid", "cortisol", "testosteron", "oestrog", "dhea", "tsh"]),
    ("micronutrition", &["vitamine", "mineral", "magnesium", "zinc", "fer", "omega", "selenium", "b12", "folate"]),
    ("microbiome", &["microbiome", "bacterie", "firmicute", "bacteroidote", "lactobacil", "bifidobacter"]),
    ("cardiovasculaire", &["cardio", "cholesterol", "hdl", "ldl", "triglycer", "homocysteine"]),
];

const OTHER_AXIS: &str = "autre";

#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    base: Option<RuleTable>,
    extended: Option<RuleTable>,
    functional: Option<RuleTable>,
    microbiome: Option<RuleTable>,
}

impl RulesEngine {
    pub fn from_tables(
        base: Option<RuleTable>,
        extended: Option<RuleTable>,
        functional: Option<RuleTable>,
        microbiome: Option<RuleTable>,
    ) -> Self {
        Self {
            base,
            extended,
            functional,
            microbiome,
        }
    }

    /// Loads every sheet found in `dir`. Missing sheets are simply absent.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(AlgoLifeError::RulesError {
                message: format!("Dossier de règles introuvable : {}", dir.display()),
            });
        }

        let mut engine = Self::default();
        for kind in SheetKind::ALL {
            let Some(path) = resolve_sheet(dir, kind) else {
                tracing::debug!("No {:?} sheet in {}", kind, dir.display());
                continue;
            };
            let table = RuleTable::from_path(&path)?;
            tracing::info!("{} -> {} rules ({})", path.display(), table.len(), kind.summary_key());
            match kind {
                SheetKind::Base => engine.base = Some(table),
                SheetKind::Extended => engine.extended = Some(table),
                SheetKind::Functional => engine.functional = Some(table),
                SheetKind::Microbiome => engine.microbiome = Some(table),
            }
        }
        Ok(engine)
    }

    /// Rule count per sheet.
    pub fn summary(&self) -> IndexMap<&'static str, usize> {
        let count = |t: &Option<RuleTable>| t.as_ref().map(RuleTable::len).unwrap_or(0);
        IndexMap::from([
            (SheetKind::Base.summary_key(), count(&self.base)),
            (SheetKind::Extended.summary_key(), count(&self.extended)),
            (SheetKind::Functional.summary_key(), count(&self.functional)),
            (SheetKind::Microbiome.summary_key(), count(&self.microbiome)),
        ])
    }

    pub fn generate_recommendations(
        &self,
        values: &[(String, f64)],
        microbiome: Option<&MicrobiomeReport>,
        sex: Sex,
    ) -> RecommendationSet {
        let mut findings = Vec::new();
        findings.extend(apply_bio_sheet(self.base.as_ref(), values, sex, Priority::High));
        findings.extend(apply_bio_sheet(self.extended.as_ref(), values, sex, Priority::High));
        findings.extend(apply_bio_sheet(self.functional.as_ref(), values, sex, Priority::Medium));
        if let Some(report) = microbiome {
            findings.extend(apply_micro_sheet(self.microbiome.as_ref(), report));
        }

        let mut seen = HashSet::new();
        let mut all: Vec<Finding> = findings
            .into_iter()
            .filter(|f| seen.insert((f.biomarker.clone(), f.direction)))
            .collect();
        all.sort_by_key(|f| f.priority);

        let by_priority = ByPriority {
            high: with_priority(&all, Priority::High),
            medium: with_priority(&all, Priority::Medium),
            low: with_priority(&all, Priority::Low),
        };

        let mut by_category: IndexMap<String, Vec<Finding>> = IndexMap::new();
        for finding in &all {
            by_category
                .entry(finding.category.clone())
                .or_default()
                .push(finding.clone());
        }

        let mut parts = Vec::new();
        if !by_priority.high.is_empty() {
            parts.push(format!("{} priorité haute", by_priority.high.len()));
        }
        if !by_priority.medium.is_empty() {
            parts.push(format!("{} priorité moyenne", by_priority.medium.len()));
        }
        let summary = if parts.is_empty() {
            "Aucune anomalie détectée".to_string()
        } else {
            format!("Analyse : {}", parts.join(", "))
        };

        RecommendationSet {
            total: all.len(),
            all,
            by_priority,
            by_category,
            summary,
        }
    }

    pub fn generate_consolidated(
        &self,
        values: &[(String, f64)],
        microbiome: Option<&MicrobiomeReport>,
        patient: &PatientInfo,
    ) -> ConsolidatedRecommendations {
        let base = self.generate_recommendations(values, microbiome, patient.sex);

        let penalty = 8 * base.by_priority.high.len() + 4 * base.by_priority.medium.len();
        let health_score = 100usize.saturating_sub(penalty) as u32;

        ConsolidatedRecommendations {
            health_score,
            axes: therapeutic_axes(&base.all),
            patient: patient.clone(),
            alerts: base.by_priority.high.clone(),
            nutrition: domain_advice(&base.all, |a| a.nutrition.as_str()),
            supplementation: domain_advice(&base.all, |a| a.supplementation.as_str()),
            lifestyle: domain_advice(&base.all, |a| a.lifestyle.as_str()),
            monitoring: domain_advice(&base.all, |a| a.monitoring.as_str()),
            base,
        }
    }
}

fn domain_advice(findings: &[Finding], pick: fn(&Advice) -> &str) -> Vec<String> {
    findings
        .iter()
        .map(|f| pick(&f.advice).trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn with_priority(findings: &[Finding], priority: Priority) -> Vec<Finding> {
    findings
        .iter()
        .filter(|f| f.priority == priority)
        .cloned()
        .collect()
}

fn first_non_empty<'a>(row: &'a RuleRow, columns: &[&str], fallback: &'a str) -> &'a str {
    columns
        .iter()
        .map(|c| RuleTable::get(row, c))
        .find(|v| !v.is_empty())
        .unwrap_or(fallback)
}

fn apply_bio_sheet(
    table: Option<&RuleTable>,
    values: &[(String, f64)],
    sex: Sex,
    priority: Priority,
) -> Vec<Finding> {
    let Some(table) = table else {
        return Vec::new();
    };
    let patient_values: Vec<(String, f64)> = values
        .iter()
        .map(|(name, v)| (normalize_label(name), *v))
        .filter(|(label, _)| !label.is_empty())
        .collect();

    let norm_columns: &[&str] = match sex {
        Sex::Male => &["Normes H"],
        Sex::Female => &["Normes F", "Normes H"],
    };

    let mut findings = Vec::new();
    for row in table.rows() {
        let biomarker = RuleTable::get(row, "Biomarqueur");
        if biomarker.is_empty() {
            continue;
        }
        let label = normalize_label(biomarker);
        if label.is_empty() {
            continue;
        }

        let Some(value) = patient_values
            .iter()
            .find(|(k, _)| *k == label || k.contains(&label) || label.contains(k.as_str()))
            .map(|(_, v)| *v)
        else {
            continue;
        };

        let norm = first_non_empty(row, norm_columns, "");
        let (low, high) = parse_norm(norm);
        if low.is_none() && high.is_none() {
            continue;
        }

        let is_low = low.is_some_and(|l| value < l);
        let is_high = high.is_some_and(|h| value > h);
        let direction = match (is_low, is_high) {
            (true, _) => Direction::Low,
            (false, true) => Direction::High,
            (false, false) => continue,
        };
        let side = direction.as_str();
        let arrow = match direction {
            Direction::Low => "↓ Bas",
            Direction::High => "↑ Élevé",
        };

        findings.push(Finding {
            rule_type: RuleType::Bio,
            priority,
            category: first_non_empty(row, &["Catégorie", "Categorie"], "Biologie").to_string(),
            title: format!("{} {}", biomarker, arrow),
            biomarker: biomarker.to_string(),
            value: FindingValue::Number(value),
            direction,
            norm: norm.to_string(),
            advice: Advice {
                interpretation: RuleTable::get(row, &format!("{} - Interprétation", side)).to_string(),
                nutrition: RuleTable::get(row, &format!("{} - Nutrition", side)).to_string(),
                supplementation: RuleTable::get(row, &format!("{} - Micronutrition", side)).to_string(),
                lifestyle: RuleTable::get(row, &format!("{} - Lifestyle", side)).to_string(),
                monitoring: String::new(),
            },
        });
    }
    findings
}

struct GroupResult {
    elevated: bool,
    reduced: bool,
    slight: bool,
}

impl GroupResult {
    fn classify(result: &str) -> Self {
        let r = result.to_lowercase();
        Self {
            elevated: ["elevat", "high", "élevé", "eleve"].iter().any(|w| r.contains(w)),
            reduced: ["reduc", "low", "réduit", "reduit"].iter().any(|w| r.contains(w)),
            slight: r.contains("slight") || r.contains("leger") || r.contains("léger"),
        }
    }
}

/// Score of a micro rule for a group, `None` when the rule does not apply.
fn micro_rule_score(row: &RuleRow, group_label: &str, result: &GroupResult) -> Option<u32> {
    let rule_label = normalize_label(RuleTable::get(row, "Marqueur_bacterien"));
    if rule_label.is_empty() {
        return None;
    }
    let mut score = if rule_label == group_label {
        10
    } else if rule_label.contains(group_label) || group_label.contains(rule_label.as_str()) {
        5
    } else {
        return None;
    };

    let condition = RuleTable::get(row, "Condition_declenchement").to_lowercase();
    if result.elevated && ["elev", "élevé", "+"].iter().any(|w| condition.contains(w)) {
        score += 3;
    } else if result.reduced && ["redu", "réduit", "-"].iter().any(|w| condition.contains(w)) {
        score += 3;
    } else {
        return None;
    }

    let severity = RuleTable::get(row, "Niveau_gravite");
    if result.slight && severity.contains("+1") {
        score += 2;
    } else if !result.slight && ["+2", "+3", "-2", "-3"].iter().any(|g| severity.contains(g)) {
        score += 2;
    }
    Some(score)
}

fn micro_priority(severity: &str) -> Priority {
    let upper = severity.to_uppercase();
    if ["+3", "-3", "SÉVÈRE", "SEVERE"].iter().any(|g| upper.contains(g)) {
        Priority::High
    } else if ["+2", "-2", "MODÉRÉ", "MODERE"].iter().any(|g| upper.contains(g)) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn apply_micro_sheet(table: Option<&RuleTable>, report: &MicrobiomeReport) -> Vec<Finding> {
    let Some(table) = table else {
        return Vec::new();
    };

    let mut findings = Vec::new();
    for group in &report.groups {
        let result_text = group.result.trim().to_lowercase();
        if result_text.is_empty() || result_text.contains("expected") {
            continue;
        }
        let result = GroupResult::classify(&result_text);
        let group_label = normalize_label(&group.name);
        if group_label.is_empty() {
            continue;
        }

        let mut best: Option<(u32, &RuleRow)> = None;
        for row in table.rows() {
            if let Some(score) = micro_rule_score(row, &group_label, &result) {
                if best.map_or(true, |(b, _)| score > b) {
                    best = Some((score, row));
                }
            }
        }
        let Some((_, rule)) = best else {
            continue;
        };

        findings.push(Finding {
            rule_type: RuleType::Microbiome,
            priority: micro_priority(RuleTable::get(rule, "Niveau_gravite")),
            category: first_non_empty(rule, &["Categorie", "Catégorie"], "Microbiote").to_string(),
            title: format!("{} : {}", group.name, capitalize(&result_text)),
            biomarker: group.name.clone(),
            value: FindingValue::Text(result_text.clone()),
            direction: if result.elevated {
                Direction::High
            } else {
                Direction::Low
            },
            norm: "Expected".to_string(),
            advice: Advice {
                interpretation: RuleTable::get(rule, "Interpretation_clinique").to_string(),
                nutrition: RuleTable::get(rule, "Recommandations_nutritionnelles").to_string(),
                supplementation: RuleTable::get(rule, "Recommandations_supplementation").to_string(),
                lifestyle: RuleTable::get(rule, "Recommandations_lifestyle").to_string(),
                monitoring: RuleTable::get(rule, "Notes_additionnelles").to_string(),
            },
        });
    }
    findings
}

/// Groups findings into therapeutic axes by keyword; the first matching axis wins.
pub fn therapeutic_axes(findings: &[Finding]) -> IndexMap<String, Vec<Finding>> {
    let mut axes: IndexMap<String, Vec<Finding>> = AXIS_KEYWORDS
        .iter()
        .map(|(axis, _)| axis.to_string())
        .chain(std::iter::once(OTHER_AXIS.to_string()))
        .map(|axis| (axis, Vec::new()))
        .collect();

    for finding in findings {
        let text = format!(
            "{} {}",
            normalize_label(&finding.category),
            normalize_label(&finding.title)
        );
        let axis = AXIS_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(axis, _)| *axis)
            .unwrap_or(OTHER_AXIS);
        if let Some(bucket) = axes.get_mut(axis) {
            bucket.push(finding.clone());
        }
    }

    axes.retain(|_, findings| !findings.is_empty());
    axes
}
