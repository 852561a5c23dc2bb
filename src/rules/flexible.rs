//! Single-table rules engine with tolerant column naming.
//!
//! Headers are recognised through synonym lists (case and accent
//! insensitive), so rule tables exported from different tools work as long
//! as a biomarker column can be identified.

use crate::domain::model::{PatientInfo, Sex};
use crate::extract::reference::infer_status;
use crate::extract::text::{fold_accents, parse_decimal, split_advice_lines};
use crate::rules::table::{RuleRow, RuleTable};
use crate::utils::error::{AlgoLifeError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_OUTLIER_STATUSES: &[&str] =
    &["low", "high", "insufficient", "elevated", "deficient", "abnormal"];

pub const DEFAULT_PRIORITY: &str = "Moyen";

const WILDCARDS: &[&str] = &["all", "tout", "tous", "any", "na", "-"];

const COLUMN_SYNONYMS: &[(&str, &[&str])] = &[
    (
        "biomarker_key",
        &["biomarker_key", "biomarker", "marker", "code", "id", "key", "biomarqueur", "biomarqueur_key", "nom_court", "analyte_key"],
    ),
    (
        "biomarker_label",
        &["label", "name", "nom", "intitule", "analyte", "biomarqueur_nom", "display"],
    ),
    ("category", &["category", "categorie", "famille", "module", "domaine"]),
    ("ref_low", &["ref_low", "ref_min", "min_ref", "borne_basse_ref", "low_ref", "normal_min", "norme_min"]),
    ("ref_high", &["ref_high", "ref_max", "max_ref", "borne_haute_ref", "high_ref", "normal_max", "norme_max"]),
    ("opt_low", &["opt_low", "opt_min", "min_opt", "optimal_min", "borne_basse_opt"]),
    ("opt_high", &["opt_high", "opt_max", "max_opt", "optimal_max", "borne_haute_opt"]),
    ("status", &["status", "etat", "statut", "flag", "classification", "range_status", "niveau"]),
    ("sex", &["sex", "sexe", "genre"]),
    ("age_min", &["age_min", "min_age", "age_debut"]),
    ("age_max", &["age_max", "max_age", "age_fin"]),
    ("priority", &["priority", "priorite", "niveau_priorite", "urgence"]),
    ("supplements", &["supplements", "supplement", "complements", "micronutrition", "supp", "supplementation"]),
    ("micronutrition", &["micronutrition"]),
    ("nutrition", &["nutrition", "alimentation", "diet", "food", "conseils_alimentaires"]),
    ("lifestyle", &["lifestyle", "hygiene_vie", "mode_de_vie", "habitudes", "style_de_vie"]),
    ("rationale", &["rationale", "justification", "commentaire", "note", "explication"]),
];

const KEY_COLUMN_HINTS: &[&str] = &["biomarqueur", "biomarker", "marker", "analyte", "code", "id"];

/// Lowercase, accent-free, single-spaced. Underscores are kept so header
/// synonyms like `ref_low` match literally.
fn flex_norm(s: &str) -> String {
    fold_accents(&s.trim().to_lowercase())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn map_columns(headers: &[String]) -> IndexMap<String, String> {
    let normalized: Vec<(String, &String)> = headers.iter().map(|h| (flex_norm(h), h)).collect();
    let mut mapping = IndexMap::new();

    for (logical, synonyms) in COLUMN_SYNONYMS {
        let hit = synonyms.iter().find_map(|syn| {
            let ns = flex_norm(syn);
            normalized
                .iter()
                .find(|(nh, _)| *nh == ns)
                .map(|(_, original)| (*original).clone())
        });
        if let Some(column) = hit {
            mapping.insert(logical.to_string(), column);
        }
    }

    // a dedicated micronutrition column only counts when supplements live elsewhere
    if mapping.get("micronutrition") == mapping.get("supplements") {
        mapping.shift_remove("micronutrition");
    }

    if !mapping.contains_key("biomarker_key") {
        if let Some((_, original)) = normalized
            .iter()
            .find(|(nh, _)| KEY_COLUMN_HINTS.iter().any(|k| nh.contains(k)))
        {
            mapping.insert("biomarker_key".to_string(), (*original).clone());
        }
    }

    mapping
}

pub fn priority_rank(priority: &str) -> u8 {
    let p = flex_norm(priority);
    if p.contains("tres") || p.contains("urgent") {
        0
    } else if p.contains("eleve") || p.contains("haut") || p.contains("high") {
        1
    } else if p.contains("moyen") || p.contains("medium") {
        2
    } else if p.contains("faible") || p.contains("low") {
        3
    } else {
        9
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlexibleRecommendations {
    pub supplements: Vec<String>,
    pub alimentation: Vec<String>,
    pub lifestyle: Vec<String>,
    pub micronutrition: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityItem {
    pub biomarker: String,
    pub status: String,
    pub priority: String,
    pub category: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlexibleDebug {
    pub rules_file: Option<String>,
    pub column_map: IndexMap<String, String>,
    pub matched_rules: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlexibleRulesOutcome {
    pub recommendations: FlexibleRecommendations,
    pub priorities: Vec<PriorityItem>,
    pub debug: FlexibleDebug,
}

struct RuleMatch {
    item: PriorityItem,
    supplements: Vec<String>,
    micronutrition: Vec<String>,
    nutrition: Vec<String>,
    lifestyle: Vec<String>,
}

pub struct FlexibleRulesEngine {
    table: RuleTable,
    columns: IndexMap<String, String>,
    source: Option<String>,
}

impl FlexibleRulesEngine {
    pub fn from_table(table: RuleTable, source: Option<String>) -> Result<Self> {
        let columns = map_columns(table.headers());
        if !columns.contains_key("biomarker_key") {
            return Err(AlgoLifeError::RulesError {
                message: "Impossible d'identifier la colonne biomarqueur. Ajoute une colonne type 'biomarker_key' / 'biomarqueur' / 'code'.".to_string(),
            });
        }
        tracing::debug!("Flexible rules column map: {:?}", columns);
        Ok(Self {
            table,
            columns,
            source,
        })
    }

    pub fn from_csv(bytes: &[u8], source: Option<String>) -> Result<Self> {
        Self::from_table(RuleTable::from_csv(bytes)?, source)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(AlgoLifeError::RulesError {
                message: format!("Fichier règles introuvable : {}", path.display()),
            });
        }
        Self::from_table(
            RuleTable::from_path(path)?,
            Some(path.display().to_string()),
        )
    }

    pub fn column_map(&self) -> &IndexMap<String, String> {
        &self.columns
    }

    fn cell<'a>(&self, row: &'a RuleRow, logical: &str) -> Option<&'a str> {
        self.columns
            .get(logical)
            .map(|column| RuleTable::get(row, column))
    }

    fn number(&self, row: &RuleRow, logical: &str) -> Option<f64> {
        self.cell(row, logical).and_then(parse_decimal)
    }

    fn lines(&self, row: &RuleRow, logical: &str) -> Vec<String> {
        self.cell(row, logical)
            .map(split_advice_lines)
            .unwrap_or_default()
    }

    fn matches_patient(&self, row: &RuleRow, patient: &PatientInfo) -> bool {
        if let Some(rule_sex) = self.cell(row, "sex").map(flex_norm) {
            if !rule_sex.is_empty() && !WILDCARDS.contains(&rule_sex.as_str()) {
                let rule_male = rule_sex.starts_with('m') || rule_sex.starts_with('h');
                let rule_female = rule_sex.starts_with('f');
                match patient.sex {
                    Sex::Male if !rule_male => return false,
                    Sex::Female if !rule_female => return false,
                    _ => {}
                }
            }
        }

        if let Some(age) = patient.age.map(f64::from) {
            if self.number(row, "age_min").is_some_and(|min| age < min) {
                return false;
            }
            if self.number(row, "age_max").is_some_and(|max| age > max) {
                return false;
            }
        }
        true
    }

    fn matches_status(&self, row: &RuleRow, status: &str) -> bool {
        let Some(rule_status) = self.cell(row, "status").map(flex_norm) else {
            return true;
        };
        if rule_status.is_empty() || WILDCARDS.contains(&rule_status.as_str()) {
            return true;
        }
        let wanted = flex_norm(status);
        rule_status
            .split([',', '|', '/', ';'])
            .map(flex_norm)
            .filter(|t| !t.is_empty())
            .any(|t| t == wanted)
    }

    fn rows_for(&self, key: &str) -> Vec<&RuleRow> {
        let wanted = flex_norm(key);
        let by_column = |logical: &str| -> Vec<&RuleRow> {
            self.table
                .rows()
                .iter()
                .filter(|row| self.cell(row, logical).map(flex_norm).as_deref() == Some(wanted.as_str()))
                .collect()
        };
        let rows = by_column("biomarker_key");
        if rows.is_empty() && self.columns.contains_key("biomarker_label") {
            return by_column("biomarker_label");
        }
        rows
    }

    pub fn apply(
        &self,
        biomarkers: &[(String, f64)],
        patient: &PatientInfo,
        only_outliers: bool,
        outlier_statuses: &[String],
    ) -> FlexibleRulesOutcome {
        let outliers: HashSet<String> = if outlier_statuses.is_empty() {
            DEFAULT_OUTLIER_STATUSES.iter().map(|s| s.to_string()).collect()
        } else {
            outlier_statuses.iter().map(|s| flex_norm(s)).collect()
        };

        let mut matches = Vec::new();
        for (key, value) in biomarkers {
            for row in self.rows_for(key) {
                if !self.matches_patient(row, patient) {
                    continue;
                }

                let status = infer_status(
                    *value,
                    self.number(row, "ref_low"),
                    self.number(row, "ref_high"),
                    self.number(row, "opt_low"),
                    self.number(row, "opt_high"),
                );
                if only_outliers && !outliers.contains(status.as_str()) {
                    continue;
                }
                if !self.matches_status(row, status.as_str()) {
                    continue;
                }

                let priority = self
                    .cell(row, "priority")
                    .filter(|p| !p.is_empty())
                    .unwrap_or(DEFAULT_PRIORITY);
                matches.push(RuleMatch {
                    item: PriorityItem {
                        biomarker: key.clone(),
                        status: status.as_str().to_string(),
                        priority: priority.to_string(),
                        category: self.cell(row, "category").unwrap_or("").to_string(),
                        rationale: self.cell(row, "rationale").unwrap_or("").to_string(),
                    },
                    supplements: self.lines(row, "supplements"),
                    micronutrition: self.lines(row, "micronutrition"),
                    nutrition: self.lines(row, "nutrition"),
                    lifestyle: self.lines(row, "lifestyle"),
                });
            }
        }

        let matched_rules = matches.len();
        let mut recommendations = FlexibleRecommendations::default();
        let mut priorities = Vec::with_capacity(matched_rules);
        for m in matches {
            recommendations.supplements.extend(m.supplements);
            recommendations.micronutrition.extend(m.micronutrition);
            recommendations.alimentation.extend(m.nutrition);
            recommendations.lifestyle.extend(m.lifestyle);
            priorities.push(m.item);
        }
        dedup_lines(&mut recommendations.supplements);
        dedup_lines(&mut recommendations.micronutrition);
        dedup_lines(&mut recommendations.alimentation);
        dedup_lines(&mut recommendations.lifestyle);

        priorities.sort_by(|a, b| {
            priority_rank(&a.priority)
                .cmp(&priority_rank(&b.priority))
                .then_with(|| flex_norm(&a.biomarker).cmp(&flex_norm(&b.biomarker)))
        });

        tracing::info!("Flexible rules: {} rules matched", matched_rules);
        FlexibleRulesOutcome {
            recommendations,
            priorities,
            debug: FlexibleDebug {
                rules_file: self.source.clone(),
                column_map: self.columns.clone(),
                matched_rules,
            },
        }
    }
}

/// Drops blanks and duplicates (compared normalised), keeping first occurrences.
fn dedup_lines(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| {
        let trimmed = item.trim();
        !trimmed.is_empty() && seen.insert(flex_norm(trimmed))
    });
    for item in items.iter_mut() {
        *item = item.trim().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = "Biomarqueur,Libellé,Catégorie,Ref_Min,Ref_Max,Statut,Sexe,Age_Min,Age_Max,Priorité,Compléments,Alimentation,Mode_de_vie,Justification
crp,CRP ultrasensible,Inflammation,0,3,high,all,,,Élevé,Oméga-3; Curcumine,Régime méditerranéen,Sommeil 8h,Inflammation de bas grade
vit_d,Vitamine D,Vitamines,75,150,low,,,,Très élevé,Vitamine D3 4000 UI,Poissons gras,Exposition solaire,Carence
vit_d,Vitamine D,Vitamines,75,150,low,F,50,,Moyen,Vitamine K2,,,Ménopause
homa_index,HOMA,Métabolisme,0,2.4,high,M,,40,,Berbérine | oméga-3,Régime méditerranéen,Marche quotidienne,Insulinorésistance
ferritine,Ferritine,Fer,30,300,low|insufficient,,,,Faible,Bisglycinate de fer,,,";

    fn engine() -> FlexibleRulesEngine {
        FlexibleRulesEngine::from_csv(RULES.as_bytes(), None).unwrap()
    }

    fn patient(sex: Sex, age: u32) -> PatientInfo {
        PatientInfo {
            sex,
            age: Some(age),
            ..Default::default()
        }
    }

    fn defaults() -> Vec<String> {
        DEFAULT_OUTLIER_STATUSES.iter().map(|s| s.to_string()).collect()
    }

    fn values(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_synonym_mapping() {
        let map = engine().column_map().clone();
        assert_eq!(map["biomarker_key"], "Biomarqueur");
        assert_eq!(map["category"], "Catégorie");
        assert_eq!(map["ref_low"], "Ref_Min");
        assert_eq!(map["status"], "Statut");
        assert_eq!(map["sex"], "Sexe");
        assert_eq!(map["priority"], "Priorité");
        assert_eq!(map["supplements"], "Compléments");
        assert_eq!(map["nutrition"], "Alimentation");
        assert_eq!(map["lifestyle"], "Mode_de_vie");
        assert!(!map.contains_key("micronutrition"));
    }

    #[test]
    fn test_missing_key_column() {
        let err = FlexibleRulesEngine::from_csv(b"Foo,Bar\n1,2\n", None);
        assert!(matches!(err, Err(AlgoLifeError::RulesError { .. })));
    }

    #[test]
    fn test_fallback_key_column() {
        let engine = FlexibleRulesEngine::from_csv(b"Analyte code,ref_low\ncrp,1\n", None).unwrap();
        assert_eq!(engine.column_map()["biomarker_key"], "Analyte code");
    }

    #[test]
    fn test_patient_filter_and_priority_sort() {
        let vals = values(&[("crp", 4.2), ("vit_d", 40.0), ("homa_index", 3.1)]);

        let out = engine().apply(&vals, &patient(Sex::Male, 45), true, &defaults());
        // homa rule is for men up to 40 years
        let order: Vec<&str> = out.priorities.iter().map(|p| p.biomarker.as_str()).collect();
        assert_eq!(order, vec!["vit_d", "crp"]);
        assert_eq!(out.priorities[0].priority, "Très élevé");
        assert_eq!(out.debug.matched_rules, 2);

        let out = engine().apply(&vals, &patient(Sex::Female, 55), true, &defaults());
        assert_eq!(out.debug.matched_rules, 3);
        assert!(out.recommendations.supplements.contains(&"Vitamine K2".to_string()));
    }

    #[test]
    fn test_outlier_filter_and_dedup() {
        let vals = values(&[("crp", 1.0), ("homa_index", 3.1), ("ferritine", 20.0)]);
        let out = engine().apply(&vals, &patient(Sex::Male, 30), true, &defaults());

        // crp is normal and filtered out
        assert!(out.priorities.iter().all(|p| p.biomarker != "crp"));
        assert_eq!(
            out.recommendations.supplements,
            vec!["Berbérine", "oméga-3", "Bisglycinate de fer"]
        );
        assert_eq!(out.priorities[0].biomarker, "homa_index");
        assert_eq!(out.priorities[0].priority, DEFAULT_PRIORITY);
        assert_eq!(out.priorities[1].biomarker, "ferritine");

        let vals = values(&[("crp", 4.2), ("homa_index", 3.1)]);
        let out = engine().apply(&vals, &patient(Sex::Male, 30), true, &defaults());
        assert_eq!(out.recommendations.alimentation, vec!["Régime méditerranéen"]);
        assert_eq!(
            out.recommendations.supplements,
            vec!["Oméga-3", "Curcumine", "Berbérine"]
        );
    }

    #[test]
    fn test_case_insensitive_key_and_status_tokens() {
        let vals = values(&[("Ferritine", 20.0)]);
        let out = engine().apply(&vals, &patient(Sex::Male, 30), true, &defaults());
        assert_eq!(out.priorities.len(), 1);
        assert_eq!(out.priorities[0].status, "low");
    }

    #[test]
    fn test_label_fallback() {
        let rules = "code,label,ref_low,ref_high,nutrition\nMG_ERY,Magnésium érythrocytaire,2.2,2.8,Oléagineux\n";
        let engine = FlexibleRulesEngine::from_csv(rules.as_bytes(), Some("rules.csv".into())).unwrap();
        let vals = values(&[("Magnesium erythrocytaire", 1.9)]);

        let out = engine.apply(&vals, &patient(Sex::Female, 30), true, &[]);
        assert_eq!(out.recommendations.alimentation, vec!["Oléagineux"]);
        assert_eq!(out.debug.rules_file.as_deref(), Some("rules.csv"));

        let out = engine.apply(&values(&[("Magnesium erythrocytaire", 2.5)]), &patient(Sex::Female, 30), false, &[]);
        assert_eq!(out.priorities[0].status, "normal");
    }

    #[test]
    fn test_priority_rank() {
        assert_eq!(priority_rank("Très élevé"), 0);
        assert_eq!(priority_rank("URGENT"), 0);
        assert_eq!(priority_rank("Haute"), 1);
        assert_eq!(priority_rank("moyen"), 2);
        assert_eq!(priority_rank("Faible"), 3);
        assert_eq!(priority_rank("?"), 9);
    }
}
