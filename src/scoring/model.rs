//! Demonstration predictive model.
//!
//! There is no real cohort behind it: a synthetic population is drawn
//! around the patient's own values (15% CV), a target is built from expert
//! weights plus noise, and an OLS model is fitted on the standardised
//! features. Results are reproducible for a given seed.

use crate::domain::model::MarkerSet;
use crate::scoring::indices::CompositeIndices;
use crate::scoring::stats::{ols_fit, pearson, r_squared, NormalSampler, Standardizer};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const MIN_FEATURES: usize = 4;
pub const INSUFFICIENT_FEATURES: &str =
    "Données insuffisantes pour construire le modèle (minimum 4 variables).";

const SYNTHETIC_CV: f64 = 0.15;
const DEFAULT_WEIGHT: f64 = 0.01;
const SIGNIFICANCE: f64 = 0.05;

pub const KEY_MARKERS: &[&str] = &[
    "cortisol_car_30",
    "dhea",
    "homa_index",
    "crp",
    "vit_d",
    "omega3_index",
    "dopamine",
    "serotonine",
    "glycemie",
];

const EXPERT_WEIGHTS: &[(&str, f64)] = &[
    ("stress_index", -0.02),
    ("metabolic_score", 0.03),
    ("neuro_balance", 0.02),
    ("inflammation_index", -0.015),
    ("cortisol_car_30", -0.01),
    ("homa_index", -0.015),
    ("crp", -0.02),
    ("vit_d", 0.01),
    ("omega3_index", 0.05),
];

fn expert_weight(feature: &str) -> f64 {
    EXPERT_WEIGHTS
        .iter()
        .find(|(name, _)| *name == feature)
        .map(|(_, w)| *w)
        .unwrap_or(DEFAULT_WEIGHT)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub seed: u64,
    pub population_size: usize,
    pub noise_sd: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            population_size: 80,
            noise_sd: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub feature: String,
    pub coefficient: f64,
    pub abs_coefficient: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub correlation: f64,
    pub p_value: f64,
    pub significant: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    pub success: bool,
    pub r2_score: f64,
    pub prediction: Option<f64>,
    pub n_features: usize,
    pub features: Vec<String>,
    /// Sorted by absolute value, largest first.
    pub coefficients: Vec<Coefficient>,
    pub correlations: IndexMap<String, Correlation>,
    pub message: Option<String>,
    pub target: String,
    pub seed: u64,
    pub population_size: usize,
}

impl ModelResult {
    fn failure(message: impl Into<String>, n_features: usize, settings: &ModelSettings) -> Self {
        Self {
            success: false,
            n_features,
            message: Some(message.into()),
            target: "biological_age".to_string(),
            seed: settings.seed,
            population_size: settings.population_size,
            ..Default::default()
        }
    }

    pub fn significant_correlations(&self) -> impl Iterator<Item = (&String, &Correlation)> {
        self.correlations.iter().filter(|(_, c)| c.significant)
    }
}

/// Composite indices first, then key markers, then lifestyle scores.
pub fn collect_features(
    indices: &CompositeIndices,
    markers: &MarkerSet,
    lifestyle: &IndexMap<String, f64>,
) -> IndexMap<String, f64> {
    let mut features = IndexMap::new();
    for (name, value) in indices.scores() {
        features.insert(name.clone(), *value);
    }
    for key in KEY_MARKERS {
        if let Some(value) = markers.get(key) {
            features.insert(key.to_string(), value);
        }
    }
    for (name, value) in lifestyle {
        if value.is_finite() {
            features.insert(name.clone(), *value);
        }
    }
    features
}

pub fn build_predictive_model(
    features: &IndexMap<String, f64>,
    settings: &ModelSettings,
) -> ModelResult {
    let n_features = features.len();
    if n_features < MIN_FEATURES {
        tracing::info!(
            "Predictive model skipped: {} features available",
            n_features
        );
        return ModelResult::failure(INSUFFICIENT_FEATURES, n_features, settings);
    }
    let n = settings.population_size;
    if n < 3 {
        return ModelResult::failure(
            format!("Population synthétique trop petite ({} individus).", n),
            n_features,
            settings,
        );
    }

    let mut sampler = NormalSampler::new(settings.seed);
    let names: Vec<String> = features.keys().cloned().collect();
    let columns: Vec<Vec<f64>> = features
        .values()
        .map(|&v| {
            let sd = if v != 0.0 { v.abs() * SYNTHETIC_CV } else { SYNTHETIC_CV };
            sampler.sample(v, sd, n)
        })
        .collect();

    let mut y = vec![0.0; n];
    for (name, column) in names.iter().zip(&columns) {
        let weight = expert_weight(name);
        for (target, x) in y.iter_mut().zip(column) {
            *target += weight * x;
        }
    }
    for target in y.iter_mut() {
        *target += sampler.normal(0.0, settings.noise_sd);
    }

    let scaler = Standardizer::fit(&columns);
    let scaled = scaler.transform(&columns);
    let Some(fit) = ols_fit(&scaled, &y) else {
        return ModelResult::failure("Ajustement du modèle impossible.", n_features, settings);
    };

    let r2 = r_squared(&y, &fit.predict(&scaled, n));
    let patient_row: Vec<f64> = features.values().copied().collect();
    let prediction = fit.predict_row(&scaler.transform_row(&patient_row));

    let mut coefficients: Vec<Coefficient> = names
        .iter()
        .zip(&fit.coefficients)
        .map(|(feature, &coefficient)| Coefficient {
            feature: feature.clone(),
            coefficient,
            abs_coefficient: coefficient.abs(),
        })
        .collect();
    coefficients.sort_by(|a, b| b.abs_coefficient.total_cmp(&a.abs_coefficient));

    let correlations: IndexMap<String, Correlation> = names
        .iter()
        .zip(&columns)
        .filter_map(|(name, column)| {
            pearson(column, &y).map(|(r, p)| {
                (
                    name.clone(),
                    Correlation {
                        correlation: r,
                        p_value: p,
                        significant: p < SIGNIFICANCE,
                    },
                )
            })
        })
        .collect();

    tracing::info!(
        "Predictive model fitted on {} synthetic individuals: R²={:.3}, {} features",
        n,
        r2,
        n_features
    );

    ModelResult {
        success: true,
        r2_score: r2,
        prediction: Some(prediction),
        n_features,
        features: names,
        coefficients,
        correlations,
        message: None,
        target: "biological_age".to_string(),
        seed: settings.seed,
        population_size: n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pairs: &[(&str, f64)]) -> IndexMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn sample_features() -> IndexMap<String, f64> {
        features(&[
            ("stress_index", 40.0),
            ("metabolic_score", 72.5),
            ("crp", 2.1),
            ("vit_d", 48.0),
            ("omega3_index", 0.0),
            ("sleep", 6.0),
        ])
    }

    #[test]
    fn test_insufficient_features() {
        let result = build_predictive_model(
            &features(&[("crp", 1.0), ("vit_d", 50.0)]),
            &ModelSettings::default(),
        );
        assert!(!result.success);
        assert_eq!(result.n_features, 2);
        assert_eq!(result.message.as_deref(), Some(INSUFFICIENT_FEATURES));
    }

    #[test]
    fn test_model_is_deterministic() {
        let settings = ModelSettings::default();
        let a = build_predictive_model(&sample_features(), &settings);
        let b = build_predictive_model(&sample_features(), &settings);
        assert!(a.success);
        assert_eq!(a, b);

        let other = build_predictive_model(
            &sample_features(),
            &ModelSettings {
                seed: 7,
                ..Default::default()
            },
        );
        assert_ne!(a.r2_score, other.r2_score);
    }

    #[test]
    fn test_model_outputs() {
        let result = build_predictive_model(&sample_features(), &ModelSettings::default());
        assert!((0.0..=1.0).contains(&result.r2_score));
        assert_eq!(result.n_features, 6);
        assert_eq!(result.coefficients.len(), 6);
        assert!(result
            .coefficients
            .windows(2)
            .all(|w| w[0].abs_coefficient >= w[1].abs_coefficient));
        assert_eq!(result.correlations.len(), 6);
        assert!(result.prediction.is_some_and(f64::is_finite));
        assert_eq!(result.features[0], "stress_index");
    }

    #[test]
    fn test_collect_features_order() {
        let mut indices = CompositeIndices::default();
        indices.record("stress_index", 40.0);
        let markers: MarkerSet = vec![
            ("glycemie".to_string(), 92.0),
            ("crp".to_string(), 1.2),
            ("ldl".to_string(), 130.0),
        ]
        .into_iter()
        .collect();
        let mut lifestyle = IndexMap::new();
        lifestyle.insert("sleep".to_string(), 7.0);
        lifestyle.insert("broken".to_string(), f64::NAN);

        let collected = collect_features(&indices, &markers, &lifestyle);
        let names: Vec<&str> = collected.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["stress_index", "crp", "glycemie", "sleep"]);
    }
}
