//! Functional metric blocks: each marker is categorised against ordered
//! thresholds and projected onto a 0–100 score.

use crate::domain::model::{MarkerSet, PatientInfo};
use crate::scoring::stats::round_to;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const MISSING: &str = "–";
pub const INSUFFICIENT_DATA: &str = "Données insuffisantes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub upper: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConfig {
    pub norm_low: f64,
    pub norm_high: f64,
    pub reverse: bool,
    pub thresholds: Vec<Threshold>,
    pub missing_label: String,
}

impl MetricConfig {
    fn new(norm_low: f64, norm_high: f64, reverse: bool, thresholds: &[(f64, &str)]) -> Self {
        Self {
            norm_low,
            norm_high,
            reverse,
            thresholds: thresholds
                .iter()
                .map(|(upper, label)| Threshold {
                    upper: *upper,
                    label: label.to_string(),
                })
                .collect(),
            missing_label: MISSING.to_string(),
        }
    }

    fn with_missing_label(mut self, label: &str) -> Self {
        self.missing_label = label.to_string();
        self
    }
}

pub fn default_metric_configs() -> IndexMap<String, MetricConfig> {
    let inf = f64::INFINITY;
    let mut configs = IndexMap::new();
    configs.insert(
        "crp_us".to_string(),
        MetricConfig::new(
            0.0,
            5.0,
            true,
            &[
                (1.0, "Bas – optimal"),
                (3.0, "Inflammation modérée"),
                (inf, "Inflammation élevée"),
            ],
        ),
    );
    configs.insert(
        "aa_epa".to_string(),
        MetricConfig::new(
            1.0,
            20.0,
            true,
            &[
                (3.0, "Anti-inflammatoire optimal"),
                (10.0, "Correct"),
                (15.0, "Inflammatoire modéré"),
                (inf, "Profil inflammatoire"),
            ],
        ),
    );
    configs.insert(
        "homa".to_string(),
        MetricConfig::new(
            1.0,
            4.0,
            true,
            &[
                (2.0, "Sensibilité à l'insuline normale"),
                (2.4, "Insulinorésistance légère"),
                (inf, "Insulinorésistance"),
            ],
        ),
    );
    configs.insert(
        "zonuline".to_string(),
        MetricConfig::new(
            20.0,
            70.0,
            true,
            &[
                (25.0, "Bonne intégrité intestinale"),
                (40.0, "Perméabilité augmentée (leaky gut)"),
                (inf, "Perméabilité sévère"),
            ],
        ),
    );
    configs.insert(
        "aging_delta".to_string(),
        MetricConfig::new(
            -10.0,
            10.0,
            true,
            &[
                (-2.0, "Âge biologique plus jeune"),
                (2.0, "Âge biologique cohérent"),
                (inf, "Âge biologique accéléré"),
            ],
        ),
    );
    configs.insert(
        "car".to_string(),
        MetricConfig::new(
            -10.0,
            10.0,
            false,
            &[
                (-5.0, "CAR effondré – Burnout avancé"),
                (0.0, "CAR diminué – Hypo-réactivité HPA"),
                (5.0, "CAR faible – Fatigue chronique"),
                (inf, "CAR normal"),
            ],
        )
        .with_missing_label(INSUFFICIENT_DATA),
    );
    configs
}

/// Linear projection of `value` from `[low, high]` onto 0–100, clamped.
pub fn normalize(value: f64, low: f64, high: f64, reverse: bool) -> Option<f64> {
    if high == low || !value.is_finite() {
        return None;
    }
    let mut ratio = ((value - low) / (high - low)).clamp(0.0, 1.0);
    if reverse {
        ratio = 1.0 - ratio;
    }
    Some(round_to(ratio * 100.0, 1))
}

/// Share of `refs` strictly below `value`, in percent.
pub fn percentile_rank(value: f64, refs: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = refs.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || !value.is_finite() {
        return None;
    }
    let below = finite.iter().filter(|&&r| r < value).count();
    Some(round_to(below as f64 / finite.len() as f64 * 100.0, 1))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBlock {
    pub key: String,
    pub label: String,
    pub status: String,
    pub score: Option<f64>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub blocks: Vec<MetricBlock>,
    pub global_score: Option<f64>,
    pub action_plan: Vec<String>,
}

impl MetricsReport {
    pub fn block(&self, key: &str) -> Option<&MetricBlock> {
        self.blocks.iter().find(|b| b.key == key)
    }
}

struct ActionRule {
    block: &'static str,
    threshold: f64,
    message: &'static str,
}

const ACTION_RULES: &[ActionRule] = &[
    ActionRule {
        block: "stress",
        threshold: 60.0,
        message: "Optimiser l'axe HPA : adaptogènes (rhodiola/ashwagandha), respiration 4-6, charge allostatique ↓",
    },
    ActionRule {
        block: "inflammation",
        threshold: 60.0,
        message: "Réduire inflammation : EPA, alimentation anti-inflammatoire, réduction sucres rapides",
    },
    ActionRule {
        block: "omega",
        threshold: 50.0,
        message: "Augmenter EPA/DHA (2–3 g/j) et réduire excès oméga-6",
    },
    ActionRule {
        block: "glycemia",
        threshold: 60.0,
        message: "Insulino-sensibilité : magnésium, marche post-prandiale, fenêtre alimentaire ~10h",
    },
    ActionRule {
        block: "gut",
        threshold: 60.0,
        message: "Barrière intestinale : glutamine, zinc-carnosine, réduire alcool/ultra-transformés",
    },
    ActionRule {
        block: "aging",
        threshold: 60.0,
        message: "Longévité : exercice, sommeil profond, polyphénols, cohérence circadienne",
    },
];

pub struct MetricEngine {
    configs: IndexMap<String, MetricConfig>,
}

impl Default for MetricEngine {
    fn default() -> Self {
        Self::new(default_metric_configs())
    }
}

impl MetricEngine {
    pub fn new(configs: IndexMap<String, MetricConfig>) -> Self {
        Self { configs }
    }

    pub fn categorize(&self, value: Option<f64>, metric: &str) -> String {
        let Some(cfg) = self.configs.get(metric) else {
            return MISSING.to_string();
        };
        let Some(v) = value else {
            return cfg.missing_label.clone();
        };
        cfg.thresholds
            .iter()
            .find(|t| v < t.upper)
            .or(cfg.thresholds.last())
            .map(|t| t.label.clone())
            .unwrap_or_else(|| cfg.missing_label.clone())
    }

    pub fn score(&self, value: f64, metric: &str) -> Option<f64> {
        let cfg = self.configs.get(metric)?;
        normalize(value, cfg.norm_low, cfg.norm_high, cfg.reverse)
    }

    fn block(&self, key: &str, label: &str, metric: &str, value: Option<f64>) -> MetricBlock {
        match value {
            Some(v) => MetricBlock {
                key: key.to_string(),
                label: label.to_string(),
                status: self.categorize(Some(v), metric),
                score: self.score(v, metric),
                value: Some(v),
            },
            None => MetricBlock {
                key: key.to_string(),
                label: label.to_string(),
                status: self.categorize(None, metric),
                score: None,
                value: None,
            },
        }
    }

    pub fn evaluate_stress(&self, markers: &MarkerSet) -> MetricBlock {
        let car = match (markers.get("cortisol_reveil"), markers.get("cortisol_car_30")) {
            (Some(wake), Some(plus_30)) => Some(round_to(plus_30 - wake, 2)),
            _ => None,
        };
        self.block("stress", "Stress (CAR)", "car", car)
    }

    pub fn evaluate_inflammation(&self, markers: &MarkerSet) -> MetricBlock {
        self.block("inflammation", "Inflammation (CRP)", "crp_us", markers.get("crp"))
    }

    pub fn evaluate_omega(&self, markers: &MarkerSet) -> MetricBlock {
        self.block("omega", "Oméga (AA/EPA)", "aa_epa", markers.get("aa_epa"))
    }

    pub fn evaluate_glycemia(&self, markers: &MarkerSet) -> MetricBlock {
        self.block("glycemia", "Glycémie (HOMA)", "homa", markers.get("homa_index"))
    }

    pub fn evaluate_gut(&self, markers: &MarkerSet) -> MetricBlock {
        self.block("gut", "Intestin (zonuline)", "zonuline", markers.get("zonuline"))
    }

    pub fn evaluate_aging(&self, patient: &PatientInfo) -> MetricBlock {
        let delta = match (patient.biological_age, patient.age) {
            (Some(bio), Some(chrono)) => Some(round_to(bio - f64::from(chrono), 2)),
            _ => None,
        };
        self.block("aging", "Vieillissement (Δ âge)", "aging_delta", delta)
    }

    pub fn analyze(&self, markers: &MarkerSet, patient: &PatientInfo) -> MetricsReport {
        let blocks = vec![
            self.evaluate_stress(markers),
            self.evaluate_inflammation(markers),
            self.evaluate_omega(markers),
            self.evaluate_glycemia(markers),
            self.evaluate_gut(markers),
            self.evaluate_aging(patient),
        ];

        let global_score = global_score(blocks.iter().map(|b| b.score));
        let action_plan = action_plan(&blocks);

        tracing::debug!(
            "Metrics: global score {:?}, {} actions",
            global_score,
            action_plan.len()
        );

        MetricsReport {
            blocks,
            global_score,
            action_plan,
        }
    }
}

/// Mean of the available scores.
pub fn global_score(scores: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let valid: Vec<f64> = scores.into_iter().flatten().collect();
    if valid.is_empty() {
        return None;
    }
    Some(round_to(valid.iter().sum::<f64>() / valid.len() as f64, 1))
}

fn action_plan(blocks: &[MetricBlock]) -> Vec<String> {
    ACTION_RULES
        .iter()
        .filter(|rule| {
            blocks
                .iter()
                .find(|b| b.key == rule.block)
                .and_then(|b| b.score)
                .is_some_and(|score| score < rule.threshold)
        })
        .map(|rule| rule.message.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(pairs: &[(&str, f64)]) -> MarkerSet {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(2.5, 0.0, 5.0, false), Some(50.0));
        assert_eq!(normalize(2.5, 0.0, 5.0, true), Some(50.0));
        assert_eq!(normalize(1.0, 0.0, 5.0, true), Some(80.0));
        assert_eq!(normalize(-3.0, 0.0, 5.0, false), Some(0.0));
        assert_eq!(normalize(12.0, 0.0, 5.0, false), Some(100.0));
        assert_eq!(normalize(3.0, 2.0, 2.0, false), None);
    }

    #[test]
    fn test_categorize_thresholds() {
        let engine = MetricEngine::default();
        assert_eq!(engine.categorize(Some(0.5), "crp_us"), "Bas – optimal");
        assert_eq!(engine.categorize(Some(1.0), "crp_us"), "Inflammation modérée");
        assert_eq!(engine.categorize(Some(8.0), "crp_us"), "Inflammation élevée");
        assert_eq!(engine.categorize(None, "crp_us"), MISSING);
        assert_eq!(engine.categorize(None, "car"), INSUFFICIENT_DATA);
    }

    #[test]
    fn test_stress_block() {
        let engine = MetricEngine::default();

        let block = engine.evaluate_stress(&markers(&[("cortisol_reveil", 12.0)]));
        assert_eq!(block.status, INSUFFICIENT_DATA);
        assert_eq!(block.score, None);

        let block = engine.evaluate_stress(&markers(&[
            ("cortisol_reveil", 12.0),
            ("cortisol_car_30", 14.5),
        ]));
        assert_eq!(block.value, Some(2.5));
        assert_eq!(block.status, "CAR faible – Fatigue chronique");
        assert_eq!(block.score, Some(62.5));
    }

    #[test]
    fn test_analyze_global_score_and_plan() {
        let engine = MetricEngine::default();
        let patient = PatientInfo {
            age: Some(50),
            biological_age: Some(56.0),
            ..Default::default()
        };
        let report = engine.analyze(
            &markers(&[("crp", 4.0), ("homa_index", 1.5), ("aa_epa", 2.0)]),
            &patient,
        );

        // crp 20, homa 83.3, aa/epa 94.7, aging 20
        assert_eq!(report.block("inflammation").unwrap().score, Some(20.0));
        assert_eq!(report.block("glycemia").unwrap().score, Some(83.3));
        assert_eq!(report.block("omega").unwrap().score, Some(94.7));
        let aging = report.block("aging").unwrap();
        assert_eq!(aging.value, Some(6.0));
        assert_eq!(aging.status, "Âge biologique accéléré");
        assert_eq!(report.global_score, Some(54.5));

        assert_eq!(report.action_plan.len(), 2);
        assert!(report.action_plan[0].starts_with("Réduire inflammation"));
        assert!(report.action_plan[1].starts_with("Longévité"));
    }

    #[test]
    fn test_no_data() {
        let report = MetricEngine::default().analyze(&MarkerSet::new(), &PatientInfo::default());
        assert_eq!(report.global_score, None);
        assert!(report.action_plan.is_empty());
        assert_eq!(report.blocks.len(), 6);
    }

    #[test]
    fn test_percentile_rank() {
        let refs = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_rank(3.0, &refs), Some(50.0));
        assert_eq!(percentile_rank(10.0, &refs), Some(100.0));
        assert_eq!(percentile_rank(1.0, &[]), None);
    }
}
