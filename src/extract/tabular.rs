use crate::domain::model::{Biomarker, BiologyPanel, ExtractionSource, ReferenceRange};
use crate::extract::text::{normalize_key, parse_decimal};
use crate::utils::error::{AlgoLifeError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};

pub const REQUIRED_COLUMNS: &[&str] = &["biomarker", "value", "unit", "ref_low", "ref_high", "sample_date"];

const NAME_COLUMNS: &[&str] = &["biomarker", "biomarqueur", "marqueur"];
const VALUE_COLUMNS: &[&str] = &["value", "valeur"];

struct ColumnIndex {
    name: usize,
    value: usize,
    unit: Option<usize>,
    ref_low: Option<usize>,
    ref_high: Option<usize>,
    sample_date: Option<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |candidates: &[&str]| {
            normalized
                .iter()
                .position(|h| candidates.contains(&h.as_str()))
        };

        match (find(NAME_COLUMNS), find(VALUE_COLUMNS)) {
            (Some(name), Some(value)) => Ok(Self {
                name,
                value,
                unit: find(&["unit", "unite", "unité"]),
                ref_low: find(&["ref_low"]),
                ref_high: find(&["ref_high"]),
                sample_date: find(&["sample_date"]),
            }),
            _ => {
                let missing: Vec<&str> = REQUIRED_COLUMNS
                    .iter()
                    .copied()
                    .filter(|c| !normalized.iter().any(|h| h == c))
                    .collect();
                Err(AlgoLifeError::ValidationError {
                    message: format!(
                        "Colonnes manquantes : {}. Requis : {}",
                        missing.join(", "),
                        REQUIRED_COLUMNS.join(", ")
                    ),
                })
            }
        }
    }
}

fn cell(record: &StringRecord, idx: Option<usize>) -> &str {
    idx.and_then(|i| record.get(i)).map(str::trim).unwrap_or("")
}

/// Imports a biology table. Returns the panel plus per-row warnings for
/// skipped rows; only structural problems are errors.
pub fn import_csv(bytes: &[u8]) -> Result<(BiologyPanel, Vec<String>)> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    let columns = ColumnIndex::resolve(&headers)?;

    let mut panel = BiologyPanel::new();
    let mut warnings = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i + 2;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }

        let name = cell(&record, Some(columns.name));
        if name.is_empty() {
            warnings.push(format!("Ligne {} : biomarqueur vide", line));
            continue;
        }

        let raw_value = cell(&record, Some(columns.value));
        let Some(value) = parse_decimal(raw_value) else {
            warnings.push(format!(
                "Ligne {} : valeur non numérique ou manquante pour {} ('{}')",
                line, name, raw_value
            ));
            continue;
        };

        let reference = ReferenceRange::from_bounds(
            parse_decimal(cell(&record, columns.ref_low)),
            parse_decimal(cell(&record, columns.ref_high)),
        );
        let sample_date = Some(cell(&record, columns.sample_date))
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let inserted = panel.insert(Biomarker {
            name: name.to_string(),
            key: normalize_key(name),
            value,
            unit: cell(&record, columns.unit).to_string(),
            reference,
            canonical_key: None,
            source: ExtractionSource::Tabular,
            line_number: Some(line),
            raw_text: record.iter().collect::<Vec<_>>().join(","),
            sample_date,
        });
        if !inserted {
            warnings.push(format!("Ligne {} : doublon ignoré pour {}", line, name));
        }
    }

    tracing::debug!(
        "Tabular import: {} biomarkers, {} warnings",
        panel.len(),
        warnings.len()
    );
    Ok((panel, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ReferenceKind;

    #[test]
    fn test_full_format() {
        let data = "biomarker,value,unit,ref_low,ref_high,sample_date\n\
                    Ferritine,\"187,5\",ng/mL,22,322,2024-03-12\n\
                    Vitamine D,36.3,ng/mL,30,,2024-03-12\n\
                    ,,,,,\n";
        let (panel, warnings) = import_csv(data.as_bytes()).unwrap();

        assert!(warnings.is_empty());
        assert_eq!(panel.len(), 2);

        let ferritine = panel.get("ferritine").unwrap();
        assert_eq!(ferritine.value, 187.5);
        assert_eq!(ferritine.reference.unwrap().kind, ReferenceKind::Range);
        assert_eq!(ferritine.sample_date.as_deref(), Some("2024-03-12"));

        let vit_d = panel.get("vitamine_d").unwrap();
        assert_eq!(vit_d.reference.unwrap().kind, ReferenceKind::LowerBound);
    }

    #[test]
    fn test_two_column_format() {
        let data = "Marqueur,Valeur\nCRP,2.4\nHDL,55\n";
        let (panel, warnings) = import_csv(data.as_bytes()).unwrap();
        assert!(warnings.is_empty());
        let crp = panel.get("crp").unwrap();
        assert_eq!(crp.value, 2.4);
        assert!(crp.unit.is_empty());
        assert!(crp.reference.is_none());
    }

    #[test]
    fn test_bad_rows_become_warnings() {
        let data = "biomarker,value\n,12\nCRP,abc\nHDL,55\nHDL,60\n";
        let (panel, warnings) = import_csv(data.as_bytes()).unwrap();
        assert_eq!(panel.len(), 1);
        assert_eq!(panel.get("hdl").unwrap().value, 55.0);
        assert_eq!(warnings.len(), 3);
        assert!(warnings[0].contains("biomarqueur vide"));
        assert!(warnings[1].contains("CRP"));
    }

    #[test]
    fn test_missing_columns_error() {
        let err = import_csv(b"name,result\nCRP,2\n").unwrap_err();
        match err {
            AlgoLifeError::ValidationError { message } => {
                assert!(message.contains("biomarker"));
                assert!(message.contains("value"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
