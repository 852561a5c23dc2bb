//! Composite indices computed from the flat marker set.
//!
//! Each index degrades to a "Données insuffisantes" result when none of
//! its markers is present. Computed scores are recorded in
//! [`CompositeIndices::scores`] in calculation order; the predictive model
//! uses them as its first features.

use crate::domain::model::MarkerSet;
use crate::scoring::metrics::{normalize, MISSING, INSUFFICIENT_DATA};
use crate::scoring::stats::{mean, round_to};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressIndex {
    pub score: Option<f64>,
    pub interpretation: String,
    pub phase: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetabolicHealth {
    pub score: Option<f64>,
    pub interpretation: String,
    pub issues: Vec<String>,
    pub risk_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub value: f64,
    pub score: f64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeurotransmitterBalance {
    pub score: Option<f64>,
    pub interpretation: String,
    pub details: IndexMap<String, SubScore>,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflammationIndex {
    pub score: Option<f64>,
    pub interpretation: String,
    pub sources: Vec<String>,
    pub priority: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicrobiomeIndex {
    pub score: Option<f64>,
    pub interpretation: String,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetabolismIndex {
    pub score: Option<f64>,
    pub interpretation: String,
    pub details: IndexMap<String, SubScore>,
    pub risk_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecommendation {
    pub area: String,
    pub priority: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeIndices {
    pub stress: Option<StressIndex>,
    pub metabolic: Option<MetabolicHealth>,
    pub neurotransmitters: Option<NeurotransmitterBalance>,
    pub inflammation: Option<InflammationIndex>,
    pub microbiome: Option<MicrobiomeIndex>,
    pub metabolism: Option<MetabolismIndex>,
    scores: IndexMap<String, f64>,
}

impl CompositeIndices {
    pub fn scores(&self) -> &IndexMap<String, f64> {
        &self.scores
    }

    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores.get(name).copied()
    }

    pub fn record(&mut self, name: &str, score: f64) {
        self.scores.insert(name.to_string(), score);
    }

    /// Deterministic follow-up areas derived from the recorded scores.
    pub fn recommendations(&self) -> Vec<IndexRecommendation> {
        let mut recos = Vec::new();
        let high = |area: &str, text: &str| IndexRecommendation {
            area: area.to_string(),
            priority: "Élevé".to_string(),
            recommendation: text.to_string(),
        };

        if self.score("stress_index").is_some_and(|s| s > 60.0) {
            recos.push(high("Gestion du stress", "Protocole stress prioritaire"));
        }
        if self.score("inflammation_index").is_some_and(|s| s > 40.0) {
            recos.push(high("Inflammation", "Protocole anti-inflammatoire recommandé"));
        }
        if self.score("metabolic_score").is_some_and(|s| s < 60.0) {
            recos.push(high("Métabolisme", "Optimisation métabolique nécessaire"));
        }

        if recos.is_empty() {
            recos.push(IndexRecommendation {
                area: "Général".to_string(),
                priority: "Moyen".to_string(),
                recommendation: "Maintenir les bonnes pratiques".to_string(),
            });
        }
        recos
    }
}

/// `good_high`: a high score is a good score.
pub fn risk_band(score: f64, good_high: bool) -> &'static str {
    if good_high {
        match score {
            s if s >= 70.0 => "Faible",
            s if s >= 50.0 => "Modéré",
            s if s >= 30.0 => "Élevé",
            _ => "Très élevé",
        }
    } else {
        match score {
            s if s < 30.0 => "Faible",
            s if s < 50.0 => "Modéré",
            s if s < 70.0 => "Élevé",
            _ => "Très élevé",
        }
    }
}

pub fn priority_band(score: f64) -> &'static str {
    if score < 30.0 {
        "Surveillance"
    } else if score < 60.0 {
        "Intervention recommandée"
    } else {
        "Intervention urgente"
    }
}

fn mean_score(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        None
    } else {
        Some(round_to(mean(scores), 1))
    }
}

fn clamp_score(score: f64) -> f64 {
    round_to(score.clamp(0.0, 100.0), 1)
}

pub fn stress_index(markers: &MarkerSet) -> StressIndex {
    let car = markers.first_of(&["cortisol_car_30", "cortisol_car+30"]);
    let cortisol_22h = markers.get("cortisol_22h");
    let dhea = markers.get("dhea");
    let cortisol_reveil = markers.get("cortisol_reveil");

    if car.is_none() && cortisol_22h.is_none() && dhea.is_none() && cortisol_reveil.is_none() {
        return StressIndex {
            score: None,
            interpretation: INSUFFICIENT_DATA.to_string(),
            phase: "Indéterminé".to_string(),
        };
    }

    let mut score = 0.0;
    if car.is_some_and(|v| v < 7.5) {
        score += 40.0;
    }
    if cortisol_22h.is_some_and(|v| v < 0.3) {
        score += 30.0;
    }
    if dhea.is_some_and(|v| v > 1.5) {
        score -= 10.0;
    }
    if cortisol_reveil.is_some_and(|v| v > 17.0) {
        score += 20.0;
    }
    let score = clamp_score(score);

    let interpretation = match score {
        s if s < 20.0 => "Adaptation normale au stress",
        s if s < 40.0 => "Stress modéré gérable",
        s if s < 60.0 => "Épuisement surrénalien débutant",
        s if s < 80.0 => "Épuisement surrénalien modéré",
        _ => "Épuisement surrénalien sévère",
    };

    StressIndex {
        score: Some(score),
        interpretation: interpretation.to_string(),
        phase: stress_phase(car, dhea).to_string(),
    }
}

fn stress_phase(car: Option<f64>, dhea: Option<f64>) -> &'static str {
    let (Some(car), Some(dhea)) = (car, dhea) else {
        return "Phase indéterminée";
    };
    if car > 7.5 && dhea > 1.5 {
        "Phase 1: Alarme (hyperactivation)"
    } else if car < 7.5 && dhea > 1.5 {
        "Phase 2: Résistance (épuisement débutant)"
    } else if car < 7.5 && dhea < 1.0 {
        "Phase 3: Épuisement (burnout)"
    } else {
        "Phase intermédiaire"
    }
}

pub fn metabolic_health_score(markers: &MarkerSet) -> MetabolicHealth {
    let homa = markers.get("homa_index");
    let quicki = markers.get("quicki_index");
    let crp = markers.get("crp");
    let vit_d = markers.get("vit_d");
    let glycemia = markers.get("glycemie");

    if [homa, quicki, crp, vit_d, glycemia].iter().all(Option::is_none) {
        return MetabolicHealth {
            score: None,
            interpretation: INSUFFICIENT_DATA.to_string(),
            issues: Vec::new(),
            risk_level: MISSING.to_string(),
        };
    }

    let mut score = 100.0;
    let mut issues = Vec::new();

    if let Some(h) = homa.filter(|&h| h > 2.4) {
        score -= ((h - 2.4) * 10.0).min(30.0);
        issues.push(format!("Résistance insulinique (HOMA: {:.2})", h));
    }
    if let Some(q) = quicki.filter(|&q| q < 0.34) {
        score -= 20.0;
        issues.push(format!("Sensibilité insulinique diminuée (QUICKI: {:.2})", q));
    }
    if let Some(c) = crp.filter(|&c| c > 1.0) {
        score -= ((c - 1.0) * 8.0).min(25.0);
        issues.push(format!("Inflammation systémique (CRP: {:.2} mg/L)", c));
    }
    if let Some(d) = vit_d.filter(|&d| d < 75.0) {
        score -= ((75.0 - d) / 5.0).min(15.0);
        if d < 30.0 {
            issues.push(format!("Carence vitamine D sévère ({:.1} nmol/L)", d));
        } else if d < 50.0 {
            issues.push(format!("Insuffisance vitamine D ({:.1} nmol/L)", d));
        }
    }
    if let Some(g) = glycemia.filter(|&g| g > 100.0) {
        score -= 10.0;
        if g > 110.0 {
            issues.push(format!("Hyperglycémie modérée ({:.1} mg/dL)", g));
        }
    }

    let score = clamp_score(score);
    let interpretation = match score {
        s if s >= 80.0 => "Santé métabolique optimale",
        s if s >= 60.0 => "Santé métabolique correcte",
        s if s >= 40.0 => "Dysrégulation métabolique modérée",
        s if s >= 20.0 => "Dysrégulation métabolique importante",
        _ => "Syndrome métabolique établi",
    };

    MetabolicHealth {
        score: Some(score),
        interpretation: interpretation.to_string(),
        issues,
        risk_level: risk_band(score, true).to_string(),
    }
}

const NEURO_RANGES: &[(&str, f64, f64)] = &[
    ("dopamine", 108.0, 244.0),
    ("serotonine", 38.0, 89.0),
    ("noradrenaline", 11.1, 28.0),
];

pub fn neurotransmitter_balance(markers: &MarkerSet) -> NeurotransmitterBalance {
    let insufficient = |details: IndexMap<String, SubScore>| NeurotransmitterBalance {
        score: None,
        interpretation: INSUFFICIENT_DATA.to_string(),
        details,
        recommendation: String::new(),
    };

    if ["dopamine", "serotonine", "noradrenaline", "adrenaline"]
        .iter()
        .all(|k| markers.get(k).is_none())
    {
        return insufficient(IndexMap::new());
    }

    let mut details = IndexMap::new();
    for (name, low, high) in NEURO_RANGES {
        let Some(value) = markers.get(name) else {
            continue;
        };
        let Some(score) = normalize(value, *low, *high, false) else {
            continue;
        };
        let status = if (40.0..=70.0).contains(&score) {
            "Optimal"
        } else {
            "Déséquilibré"
        };
        details.insert(
            name.to_string(),
            SubScore {
                value,
                score,
                status: status.to_string(),
            },
        );
    }

    let scores: Vec<f64> = details.values().map(|d| d.score).collect();
    let Some(balance) = mean_score(&scores) else {
        return insufficient(details);
    };

    let interpretation = match balance {
        s if s >= 70.0 => "Équilibre neurotransmetteur optimal",
        s if s >= 50.0 => "Équilibre neurotransmetteur correct",
        s if s >= 30.0 => "Déséquilibre neurotransmetteur modéré",
        _ => "Déséquilibre neurotransmetteur important",
    };
    let recommendation = neuro_recommendation(&details);

    NeurotransmitterBalance {
        score: Some(balance),
        interpretation: interpretation.to_string(),
        details,
        recommendation,
    }
}

fn neuro_recommendation(details: &IndexMap<String, SubScore>) -> String {
    let recos: Vec<&str> = details
        .iter()
        .filter_map(|(name, d)| match (name.as_str(), d.score) {
            ("dopamine", s) if s < 40.0 => Some("Stimuler dopamine: L-tyrosine, exercice, objectifs"),
            ("serotonine", s) if s < 40.0 => Some("Stimuler sérotonine: 5-HTP, lumière, rythmes"),
            ("noradrenaline", s) if s < 40.0 => Some("Moduler noradrénaline: adaptogènes, respiration"),
            ("dopamine", s) if s > 70.0 => Some("Réguler dopamine: réduire stimulants"),
            ("noradrenaline", s) if s > 70.0 => Some("Réguler noradrénaline: relaxation, magnésium"),
            _ => None,
        })
        .collect();

    if recos.is_empty() {
        "Équilibre optimal maintenu".to_string()
    } else {
        recos.join(" | ")
    }
}

pub fn inflammation_index(markers: &MarkerSet) -> InflammationIndex {
    let crp = markers.get("crp");
    let lbp = markers.get("lbp");
    let zonuline = markers.get("zonuline");
    let homocysteine = markers.get("homocysteine");

    if [crp, lbp, zonuline, homocysteine].iter().all(Option::is_none) {
        return InflammationIndex {
            score: None,
            interpretation: INSUFFICIENT_DATA.to_string(),
            sources: Vec::new(),
            priority: MISSING.to_string(),
        };
    }

    let mut score = 0.0;
    let mut sources = Vec::new();

    if let Some(c) = crp.filter(|&c| c > 1.0) {
        score += (c / 5.0 * 40.0).min(40.0);
        sources.push(format!("CRP: {:.2} mg/L (inflammation systémique)", c));
    }
    if let Some(l) = lbp.filter(|&l| l > 13.1) {
        score += ((l - 13.1) / 13.1 * 30.0).min(30.0);
        sources.push(format!("LBP: {:.2} ng/mL (endotoxémie)", l));
    }
    if let Some(z) = zonuline.filter(|&z| z > 37.0) {
        score += ((z - 37.0) / 37.0 * 30.0).min(30.0);
        sources.push(format!("Zonuline: {:.2} ng/mL (perméabilité)", z));
    }
    if let Some(h) = homocysteine.filter(|&h| h > 12.0) {
        score += 15.0;
        sources.push(format!("Homocystéine: {:.2} µmol/L (vasculaire)", h));
    }

    let score = clamp_score(score);
    let interpretation = match score {
        s if s < 20.0 => "Inflammation physiologique normale",
        s if s < 40.0 => "Inflammation modérée",
        s if s < 60.0 => "Inflammation importante",
        _ => "Inflammation sévère systémique",
    };

    InflammationIndex {
        score: Some(score),
        interpretation: interpretation.to_string(),
        sources,
        priority: priority_band(score).to_string(),
    }
}

pub fn microbiome_index(markers: &MarkerSet) -> MicrobiomeIndex {
    let benzoate = markers.get("benzoate");
    let hippurate = markers.get("hippurate");
    let phenol = markers.get("phenol");
    let p_cresol = markers.get("p_cresol");
    let indican = markers.get("indican");

    if [benzoate, hippurate, phenol, p_cresol, indican]
        .iter()
        .all(Option::is_none)
    {
        return MicrobiomeIndex {
            score: None,
            interpretation: INSUFFICIENT_DATA.to_string(),
            issues: Vec::new(),
        };
    }

    let mut score = 100.0;
    let mut issues = Vec::new();

    if let Some(v) = phenol.filter(|&v| v > 10.0) {
        score -= ((v - 10.0) * 2.0).min(20.0);
        issues.push(format!("Phénol élevé: {:.1}", v));
    }
    if let Some(v) = p_cresol.filter(|&v| v > 5.0) {
        score -= ((v - 5.0) * 3.0).min(20.0);
        issues.push(format!("P-crésol élevé: {:.1}", v));
    }
    if let Some(v) = indican.filter(|&v| v > 20.0) {
        score -= (v - 20.0).min(15.0);
        issues.push(format!("Indican élevé: {:.1}", v));
    }
    if let Some(v) = hippurate.filter(|&v| v < 200.0) {
        score -= 15.0;
        issues.push(format!("Hippurate bas: {:.1}", v));
    }
    if let Some(v) = benzoate.filter(|&v| v < 5.0) {
        score -= 10.0;
        issues.push(format!("Benzoate bas: {:.1}", v));
    }

    let score = clamp_score(score);
    let interpretation = match score {
        s if s >= 80.0 => "Microbiome équilibré",
        s if s >= 60.0 => "Microbiome correct",
        s if s >= 40.0 => "Dysbiose modérée",
        _ => "Dysbiose importante",
    };

    MicrobiomeIndex {
        score: Some(score),
        interpretation: interpretation.to_string(),
        issues,
    }
}

struct MetabolismPart {
    key: &'static str,
    low: f64,
    high: f64,
    reverse: bool,
    is_optimal: fn(f64) -> bool,
    off_label: &'static str,
}

const METABOLISM_PARTS: &[MetabolismPart] = &[
    MetabolismPart {
        key: "homa_index",
        low: 1.0,
        high: 4.0,
        reverse: true,
        is_optimal: |v| v < 2.0,
        off_label: "Résistance insulinique",
    },
    MetabolismPart {
        key: "triglycerides",
        low: 50.0,
        high: 200.0,
        reverse: true,
        is_optimal: |v| v < 150.0,
        off_label: "Élevé",
    },
    MetabolismPart {
        key: "hdl",
        low: 30.0,
        high: 80.0,
        reverse: false,
        is_optimal: |v| v > 50.0,
        off_label: "Bas",
    },
    MetabolismPart {
        key: "glycemie",
        low: 70.0,
        high: 120.0,
        reverse: true,
        is_optimal: |v| v < 100.0,
        off_label: "Élevée",
    },
    MetabolismPart {
        key: "insuline",
        low: 2.0,
        high: 20.0,
        reverse: true,
        is_optimal: |v| v < 10.0,
        off_label: "Élevée",
    },
];

pub fn metabolism_index(markers: &MarkerSet) -> MetabolismIndex {
    let mut details = IndexMap::new();
    for part in METABOLISM_PARTS {
        let Some(value) = markers.get(part.key) else {
            continue;
        };
        let Some(score) = normalize(value, part.low, part.high, part.reverse) else {
            continue;
        };
        let status = if (part.is_optimal)(value) {
            "Optimal"
        } else {
            part.off_label
        };
        details.insert(
            part.key.to_string(),
            SubScore {
                value,
                score,
                status: status.to_string(),
            },
        );
    }

    let scores: Vec<f64> = details.values().map(|d| d.score).collect();
    let Some(score) = mean_score(&scores) else {
        return MetabolismIndex {
            score: None,
            interpretation: INSUFFICIENT_DATA.to_string(),
            details,
            risk_level: MISSING.to_string(),
        };
    };

    let interpretation = match score {
        s if s >= 80.0 => "Métabolisme optimal",
        s if s >= 60.0 => "Métabolisme correct",
        s if s >= 40.0 => "Dysrégulation métabolique modérée",
        s if s >= 20.0 => "Dysrégulation métabolique importante",
        _ => "Syndrome métabolique",
    };

    MetabolismIndex {
        score: Some(score),
        interpretation: interpretation.to_string(),
        details,
        risk_level: risk_band(score, true).to_string(),
    }
}

/// Runs every index in a fixed order and records the available scores.
pub fn calculate_all(markers: &MarkerSet) -> CompositeIndices {
    let mut indices = CompositeIndices::default();

    let stress = stress_index(markers);
    if let Some(s) = stress.score {
        indices.record("stress_index", s);
    }
    let metabolic = metabolic_health_score(markers);
    if let Some(s) = metabolic.score {
        indices.record("metabolic_score", s);
    }
    let neuro = neurotransmitter_balance(markers);
    if let Some(s) = neuro.score {
        indices.record("neuro_balance", s);
    }
    let inflammation = inflammation_index(markers);
    if let Some(s) = inflammation.score {
        indices.record("inflammation_index", s);
    }
    let microbiome = microbiome_index(markers);
    if let Some(s) = microbiome.score {
        indices.record("microbiome_index", s);
    }
    let metabolism = metabolism_index(markers);
    if let Some(s) = metabolism.score {
        indices.record("metabolism_index", s);
    }

    tracing::debug!("Composite indices: {:?}", indices.scores());

    indices.stress = Some(stress);
    indices.metabolic = Some(metabolic);
    indices.neurotransmitters = Some(neuro);
    indices.inflammation = Some(inflammation);
    indices.microbiome = Some(microbiome);
    indices.metabolism = Some(metabolism);
    indices
}
