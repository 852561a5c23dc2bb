use algolife::domain::model::{BiomarkerStatus, MarkerSet, PatientInfo, Sex};
use algolife::extract::{extract_microbiome, import_csv, BiomarkerCatalog, LabReportExtractor};
use algolife::rules::engine::Priority;
use algolife::rules::{FlexibleRulesEngine, RuleTable, RulesEngine};
use algolife::scoring::{build_predictive_model, calculate_all, collect_features, MetricEngine, ModelSettings};
use indexmap::IndexMap;

const SYNLAB_EXTRACT: &str = "SYNLAB Biologie
Page 1/2
Ferritine  187.5 ng/ml  (22.0-322.0)
CRP ultrasensible .... 2.4 mg/L (0.0-3.0)
Insuline à jeun: 14 µUI/mL
Glycémie à jeun: 1,02 g/L
HOMA-IR: 3.5
Cortisol réveil: 14 nmol/L
Cortisol réveil +30: 19 nmol/L
";

#[test]
fn test_lab_text_to_markers() {
    let catalog = BiomarkerCatalog::default();
    let extractor = LabReportExtractor::new(catalog.clone());
    let (known, mut panel) = extractor.extract_complete(SYNLAB_EXTRACT);
    catalog.annotate(&mut panel);

    assert_eq!(known.get("homa_index"), Some(3.5));
    let ferritine = panel.get("ferritine").unwrap();
    assert_eq!(ferritine.status(), BiomarkerStatus::Normal);

    let markers = catalog.marker_set(&panel);
    assert_eq!(markers.get("crp"), Some(2.4));
    assert_eq!(markers.get("insuline"), Some(14.0));
    assert!(panel.iter().all(|b| !b.name.to_lowercase().starts_with("page")));
}

#[test]
fn test_tabular_import_feeds_rules_engine() {
    let data = "Marqueur,Valeur\nFerritine,20\nCRP ultrasensible,4.2\nMagnésium,abc\n";
    let (panel, warnings) = import_csv(data.as_bytes()).unwrap();
    assert_eq!(panel.len(), 2);
    assert_eq!(warnings.len(), 1);

    let base = RuleTable::from_csv(
        "Biomarqueur,Catégorie,Normes H,Normes F,BASSE - Nutrition,HAUTE - Nutrition
Ferritine,Fer,30-300,15-150,Viande rouge,
CRP ultrasensible,Inflammation,<3,<3,,Régime anti-inflammatoire"
            .as_bytes(),
    )
    .unwrap();
    let engine = RulesEngine::from_tables(Some(base), None, None, None);

    let male = PatientInfo {
        sex: Sex::Male,
        ..Default::default()
    };
    let consolidated = engine.generate_consolidated(&panel.named_values(), None, &male);
    assert_eq!(consolidated.base.total, 2);
    assert!(consolidated.alerts.iter().all(|f| f.priority == Priority::High));
    assert_eq!(consolidated.health_score, 84);

    // ferritine 20 is within the female norm
    let female = PatientInfo {
        sex: Sex::Female,
        ..Default::default()
    };
    let consolidated = engine.generate_consolidated(&panel.named_values(), None, &female);
    assert_eq!(consolidated.base.total, 1);
}

#[test]
fn test_microbiome_report_from_filename() {
    let report = extract_microbiome(
        "Result: The bacterial diversity is as expected.\nProteobacteria elevated",
        Some("patient_gutmap_DI-2_EN.txt"),
    )
    .unwrap();
    assert_eq!(report.dysbiosis_index, Some(2));
    assert_eq!(report.diversity_score, Some(3));
    assert_eq!(report.groups.len(), 1);
}

#[test]
fn test_flexible_engine_with_outlier_statuses() {
    let rules = "biomarqueur,ref_min,ref_max,opt_min,opt_max,statut,priorite,alimentation
vit_d,75,250,100,150,normal,Faible,Poissons gras
vit_d,75,250,100,150,low,Élevé,Supplémenter en D3
";
    let engine = FlexibleRulesEngine::from_csv(rules.as_bytes(), None).unwrap();
    let patient = PatientInfo::default();
    let vals = vec![("vit_d".to_string(), 90.0)];

    // 90 is in range but below the optimum; the default outlier list skips it
    let out = engine.apply(&vals, &patient, true, &[]);
    assert_eq!(out.debug.matched_rules, 0);

    let statuses = vec!["normal".to_string()];
    let out = engine.apply(&vals, &patient, true, &statuses);
    assert_eq!(out.debug.matched_rules, 1);
    assert_eq!(out.priorities[0].status, "normal");
    assert_eq!(out.recommendations.alimentation, vec!["Poissons gras"]);

    let out = engine.apply(&[("vit_d".to_string(), 40.0)], &patient, true, &[]);
    assert_eq!(out.priorities[0].priority, "Élevé");
}

#[test]
fn test_scoring_chain() {
    let markers: MarkerSet = [
        ("cortisol_car_30", 5.0),
        ("cortisol_reveil", 12.0),
        ("cortisol_22h", 0.2),
        ("dhea", 1.0),
        ("homa_index", 3.2),
        ("crp", 2.5),
        ("vit_d", 60.0),
        ("glycemie", 105.0),
        ("aa_epa", 12.0),
        ("zonuline", 60.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let patient = PatientInfo {
        age: Some(50),
        biological_age: Some(53.0),
        ..Default::default()
    };

    let metrics = MetricEngine::default().analyze(&markers, &patient);
    assert!(metrics.global_score.is_some());
    assert_eq!(metrics.blocks.len(), 6);

    let indices = calculate_all(&markers);
    let stress = indices.score("stress_index").unwrap();
    // CAR below 7.5 and evening cortisol below 0.3
    assert_eq!(stress, 70.0);
    assert!(indices
        .recommendations()
        .iter()
        .any(|r| r.area == "Gestion du stress"));

    let mut lifestyle = IndexMap::new();
    lifestyle.insert("activite_physique".to_string(), 2.0);
    let features = collect_features(&indices, &markers, &lifestyle);
    assert_eq!(features.keys().next().map(String::as_str), Some("stress_index"));
    assert_eq!(features.keys().last().map(String::as_str), Some("activite_physique"));

    let model = build_predictive_model(&features, &ModelSettings::default());
    assert!(model.success);
    assert!((0.0..=1.0).contains(&model.r2_score));
    assert_eq!(model.coefficients.len(), features.len());
}
