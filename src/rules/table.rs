use crate::utils::error::Result;
use csv::{ReaderBuilder, Trim};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

pub type RuleRow = IndexMap<String, String>;

/// One rule sheet: trimmed headers and rows as header → cell maps.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    headers: Vec<String>,
    rows: Vec<RuleRow>,
}

impl RuleTable {
    pub fn from_csv(bytes: &[u8]) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            let row: RuleRow = headers
                .iter()
                .enumerate()
                .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").trim().to_string()))
                .collect();
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_csv(&bytes)
    }

    /// Trimmed cell, or `""` when the column is absent.
    pub fn get<'a>(row: &'a RuleRow, column: &str) -> &'a str {
        row.get(column).map(|s| s.trim()).unwrap_or("")
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[RuleRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetKind {
    Base,
    Extended,
    Functional,
    Microbiome,
}

impl SheetKind {
    pub const ALL: [SheetKind; 4] = [
        SheetKind::Base,
        SheetKind::Extended,
        SheetKind::Functional,
        SheetKind::Microbiome,
    ];

    /// Accepted sheet names, most specific first.
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            SheetKind::Base => &["BASE_40", "Bio_Base", "bio_base"],
            SheetKind::Extended => &["EXTENDED_92", "Bio_Extended", "bio_extended"],
            SheetKind::Functional => &["FONCTIONNEL_134", "Bio_Functional", "bio_functional"],
            SheetKind::Microbiome => &["Microbiote", "Microbiome", "microbiome"],
        }
    }

    pub fn summary_key(&self) -> &'static str {
        match self {
            SheetKind::Base => "bio_base",
            SheetKind::Extended => "bio_extended",
            SheetKind::Functional => "bio_functional",
            SheetKind::Microbiome => "microbiome",
        }
    }
}

/// First `<candidate>.csv` that exists in `dir`.
pub fn resolve_sheet(dir: &Path, kind: SheetKind) -> Option<PathBuf> {
    kind.candidates()
        .iter()
        .map(|name| dir.join(format!("{}.csv", name)))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_from_csv_trims_and_skips_empty_rows() {
        let data = " Biomarqueur , Normes H \nFerritine, 30-300 \n , \nCRP,<5\n";
        let table = RuleTable::from_csv(data.as_bytes()).unwrap();

        assert_eq!(table.headers(), &["Biomarqueur", "Normes H"]);
        assert_eq!(table.len(), 2);
        let row = &table.rows()[0];
        assert_eq!(RuleTable::get(row, "Normes H"), "30-300");
        assert_eq!(RuleTable::get(row, "Absent"), "");
    }

    #[test]
    fn test_short_rows_are_padded() {
        let data = "a,b,c\n1,2\n";
        let table = RuleTable::from_csv(data.as_bytes()).unwrap();
        assert_eq!(RuleTable::get(&table.rows()[0], "c"), "");
    }

    #[test]
    fn test_resolve_sheet_prefers_first_candidate() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bio_base.csv"), "Biomarqueur\n").unwrap();
        fs::write(dir.path().join("BASE_40.csv"), "Biomarqueur\n").unwrap();

        let path = resolve_sheet(dir.path(), SheetKind::Base).unwrap();
        assert!(path.ends_with("BASE_40.csv"));
        assert!(resolve_sheet(dir.path(), SheetKind::Microbiome).is_none());
    }
}
