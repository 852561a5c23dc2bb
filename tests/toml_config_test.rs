use algolife::core::ConfigProvider;
use algolife::utils::validation::Validate;
use algolife::{AnalysisEngine, AnalysisPipeline, LocalStorage, Sex, TomlConfig};
use std::fs;
use std::io::Read;
use tempfile::TempDir;

const LAB_TABLE: &str = "biomarker,value,unit,ref_low,ref_high
CRP ultrasensible,0.8,mg/L,0,3
HOMA-IR,1.4,,0,2.4
Vitamine D,82,nmol/L,75,150
Glycémie,88,mg/dL,70,100
Vitamine B12,180,pg/mL,200,900
";

fn write_config(dir: &TempDir, extra: &str) -> String {
    let biology = dir.path().join("bilan.csv");
    fs::write(&biology, LAB_TABLE).unwrap();

    let content = format!(
        r#"
[analysis]
name = "suivi-annuel"
version = "2.0"

[patient]
name = "Claire"
age = 39
sex = "F"

[inputs]
biology = ["{}"]

[model]
seed = 11
population_size = 60

[lifestyle]
sommeil = 7.0
stress_percu = 4.0

[output]
output_path = "${{ALGOLIFE_IT_OUTPUT}}"

[biomarkers.vit_b12]
lab_names = ["vitamine b12"]
unit = "pg/mL"
{}
"#,
        biology.display(),
        extra
    );
    let path = dir.path().join("algolife.toml");
    fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

#[tokio::test]
async fn test_toml_driven_analysis() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let output_dir = temp_dir.path().join("rapport");
    std::env::set_var("ALGOLIFE_IT_OUTPUT", output_dir.to_string_lossy().to_string());

    let config = TomlConfig::from_file(write_config(&temp_dir, ""))?;
    std::env::remove_var("ALGOLIFE_IT_OUTPUT");

    config.validate()?;
    assert_eq!(config.patient().sex, Sex::Female);
    assert_eq!(config.output_path(), output_dir.to_string_lossy());

    let pipeline = AnalysisPipeline::new(LocalStorage::current_dir(), config);
    let output_path = AnalysisEngine::new(pipeline).run().await?;
    assert!(output_dir.join("algolife_report.zip").exists());

    let zip_data = fs::read(&output_path)?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data))?;
    let mut json = String::new();
    archive.by_name("analysis.json")?.read_to_string(&mut json)?;
    let report: serde_json::Value = serde_json::from_str(&json)?;

    // the catalogue extension maps the B12 row onto its canonical key
    assert_eq!(report["markers"]["vit_b12"], 180.0);
    assert_eq!(report["model"]["seed"], 11);
    assert_eq!(report["model"]["population_size"], 60);
    let features: Vec<&str> = report["model"]["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.as_str().unwrap())
        .collect();
    assert!(features.contains(&"sommeil"));
    assert!(features.contains(&"stress_percu"));
    Ok(())
}

#[test]
fn test_invalid_patient_sex_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "");
    let content = fs::read_to_string(&path).unwrap().replace("sex = \"F\"", "sex = \"inconnu\"");
    fs::write(&path, content).unwrap();

    let config = TomlConfig::from_file(&path).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_flexible_rules_must_be_csv() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "\n[rules]\nflexible_file = \"regles.xlsx\"\n");

    let config = TomlConfig::from_file(&path).unwrap();
    assert!(config.validate().is_err());
}
