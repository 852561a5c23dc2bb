use algolife::{AnalysisEngine, AnalysisPipeline, CliConfig, LocalStorage, Sex};
use std::fs;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;

const LAB_REPORT: &str = "LABORATOIRE DE BIOLOGIE MEDICALE
CRP ultrasensible .... 4.2 mg/L (0.0-3.0)
Ferritine: 20 ng/mL
HOMA-IR: 3.1
Vitamine D: 40 nmol/L
Glycémie à jeun: 104 mg/dL
Homocystéine: 14 µmol/L
";

const BASE_SHEET: &str = "Biomarqueur,Catégorie,Normes H,Normes F,BASSE - Interprétation,BASSE - Nutrition,BASSE - Micronutrition,BASSE - Lifestyle,HAUTE - Interprétation,HAUTE - Nutrition,HAUTE - Micronutrition,HAUTE - Lifestyle
Ferritine,Fer,30-300 ng/mL,15-150 ng/mL,Réserves basses,Viande rouge,Bisglycinate de fer,,Surcharge,Limiter viande rouge,,Don du sang
CRP ultrasensible,Inflammation,< 3 mg/L,,,,,,Inflammation active,Régime anti-inflammatoire,Oméga-3,Sommeil
";

const MICRO_SHEET: &str = "Marqueur_bacterien,Condition_declenchement,Niveau_gravite,Categorie,Interpretation_clinique,Recommandations_nutritionnelles,Recommandations_supplementation,Recommandations_lifestyle,Notes_additionnelles
Proteobacteria,Élevé,+3 SÉVÈRE,Dysbiose,Inflammation intestinale,Réduire sucres,,,
";

const FLEXIBLE_RULES: &str = "code,label,categorie,ref_low,ref_high,sexe,priorite,supplements,nutrition
homa_index,HOMA,Métabolisme,0,2.4,all,Élevé,Berbérine,Régime méditerranéen
vit_d,Vitamine D,Vitamines,75,150,all,Très élevé,Vitamine D3,Poissons gras
";

const GUTMAP: &str = "IDK GutMAP report
Result: The bacterial diversity is slightly lower than expected.
Akkermansia muciniphila slightly reduced
Proteobacteria elevated
";

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

fn config(temp_dir: &TempDir) -> CliConfig {
    let dir = temp_dir.path();
    CliConfig {
        biology: vec![write(dir, "bilan.txt", LAB_REPORT)],
        microbiome: vec![write(dir, "gutmap_DI-3_EN.txt", GUTMAP)],
        rules_dir: None,
        flexible_rules: None,
        output_path: dir.join("output").to_string_lossy().to_string(),
        patient_name: Some("Jean Dupont".to_string()),
        age: Some(48),
        sex: Sex::Male,
        biological_age: Some(52.0),
        seed: 42,
        population_size: 80,
        all_statuses: false,
        verbose: false,
        monitor: false,
    }
}

fn read_entry(archive: &mut zip::ZipArchive<std::io::Cursor<Vec<u8>>>, name: &str) -> String {
    let mut content = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    content
}

fn open_archive(path: &str) -> zip::ZipArchive<std::io::Cursor<Vec<u8>>> {
    let zip_data = fs::read(path).unwrap();
    zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap()
}

#[tokio::test]
async fn test_end_to_end_analysis_with_rules() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let rules_dir = temp_dir.path().join("rules");
    write(&rules_dir, "BASE_40.csv", BASE_SHEET);
    write(&rules_dir, "Microbiote.csv", MICRO_SHEET);
    let flexible = write(temp_dir.path(), "flexible.csv", FLEXIBLE_RULES);

    let mut config = config(&temp_dir);
    config.rules_dir = Some(rules_dir.to_string_lossy().to_string());
    config.flexible_rules = Some(flexible);
    let expected_output = format!("{}/algolife_report.zip", config.output_path);

    let pipeline = AnalysisPipeline::new(LocalStorage::current_dir(), config);
    let engine = AnalysisEngine::new_with_monitoring(pipeline, false);
    let output_path = engine.run().await?;

    assert_eq!(output_path, expected_output);
    assert!(Path::new(&output_path).exists());

    let mut archive = open_archive(&output_path);
    let mut file_names: Vec<String> = archive.file_names().map(str::to_string).collect();
    file_names.sort();
    assert_eq!(
        file_names,
        vec!["analysis.json", "biomarkers.csv", "findings.csv", "report.md"]
    );

    let markdown = read_entry(&mut archive, "report.md");
    for section in [
        "# Rapport d'analyse ALGO-LIFE",
        "## Résumé exécutif",
        "## Indices composites",
        "## Métriques fonctionnelles",
        "## Analyse statistique",
        "## Biomarqueurs",
        "## Microbiote",
        "## Recommandations issues des règles",
        "## Axes thérapeutiques",
        "## Règles complémentaires",
        "## Plan d'action personnalisé",
        "## Suivi et réévaluation",
    ] {
        assert!(markdown.contains(section), "missing section {}", section);
    }
    assert!(markdown.contains("Jean Dupont"));

    let findings = read_entry(&mut archive, "findings.csv");
    assert!(findings.starts_with("priority,type,category,biomarker"));
    assert!(findings.contains("Ferritine"));
    assert!(findings.contains("CRP ultrasensible"));
    assert!(findings.contains("Proteobacteria"));

    let biomarkers = read_entry(&mut archive, "biomarkers.csv");
    assert!(biomarkers.starts_with("name,key,value,unit,ref_low,ref_high,status,canonical_key,source"));
    assert!(biomarkers.contains("homa_index"));

    let json: serde_json::Value = serde_json::from_str(&read_entry(&mut archive, "analysis.json"))?;
    assert_eq!(json["patient"]["name"], "Jean Dupont");
    assert_eq!(json["microbiome"]["dysbiosis_index"], 3);
    assert_eq!(json["markers"]["homa_index"], 3.1);
    assert!(json["recommendations"]["health_score"].as_u64().unwrap() < 100);

    let flexible_priorities = json["flexible_rules"]["priorities"].as_array().unwrap();
    let order: Vec<&str> = flexible_priorities
        .iter()
        .map(|p| p["biomarker"].as_str().unwrap())
        .collect();
    assert_eq!(order, vec!["vit_d", "homa_index"]);

    Ok(())
}

#[tokio::test]
async fn test_end_to_end_without_rules_has_no_findings_file() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let config = config(&temp_dir);

    let pipeline = AnalysisPipeline::new(LocalStorage::current_dir(), config);
    let output_path = AnalysisEngine::new(pipeline).run().await?;

    let mut archive = open_archive(&output_path);
    assert_eq!(archive.len(), 3);
    assert!(archive.by_name("findings.csv").is_err());

    let markdown = read_entry(&mut archive, "report.md");
    assert!(!markdown.contains("## Recommandations issues des règles"));
    Ok(())
}

#[tokio::test]
async fn test_model_is_reproducible_across_runs() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;

    let mut r2_scores = Vec::new();
    for _ in 0..2 {
        let pipeline = AnalysisPipeline::new(LocalStorage::current_dir(), config(&temp_dir));
        let output_path = AnalysisEngine::new(pipeline).run().await?;
        let mut archive = open_archive(&output_path);
        let json: serde_json::Value =
            serde_json::from_str(&read_entry(&mut archive, "analysis.json"))?;
        r2_scores.push(json["model"]["r2_score"].clone());
    }
    assert_eq!(r2_scores[0], r2_scores[1]);
    Ok(())
}

#[tokio::test]
async fn test_missing_rules_dir_fails() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = config(&temp_dir);
    config.rules_dir = Some(temp_dir.path().join("absent").to_string_lossy().to_string());

    let pipeline = AnalysisPipeline::new(LocalStorage::current_dir(), config);
    let result = AnalysisEngine::new(pipeline).run().await;
    assert!(matches!(
        result,
        Err(algolife::AlgoLifeError::RulesError { .. })
    ));
}

#[tokio::test]
async fn test_end_to_end_with_monitoring() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = config(&temp_dir);
    config.monitor = true;

    let pipeline = AnalysisPipeline::new(LocalStorage::current_dir(), config);
    let engine = AnalysisEngine::new_with_monitoring(pipeline, true);
    let output_path = engine.run().await?;
    assert!(Path::new(&output_path).exists());
    Ok(())
}
