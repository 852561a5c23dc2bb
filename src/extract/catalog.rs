use crate::domain::model::{BiologyPanel, MarkerSet};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownBiomarker {
    /// Names the marker is printed under in lab reports, lowercase.
    pub lab_names: Vec<String>,
    #[serde(default)]
    pub unit: String,
}

/// Canonical biomarker keys and the lab names that map onto them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BiomarkerCatalog {
    entries: IndexMap<String, KnownBiomarker>,
}

const DEFAULT_ENTRIES: &[(&str, &[&str], &str)] = &[
    ("crp", &["crp ultrasensible", "crp ultra-sensible", "crp-us", "crp us", "protéine c réactive", "crp"], "mg/L"),
    ("homa_index", &["index homa", "homa-ir", "homa"], ""),
    ("quicki_index", &["index quicki", "quicki"], ""),
    ("vit_d", &["25-oh vitamine d", "vitamine d 25-oh", "25 oh vitamine d", "vitamine d"], "nmol/L"),
    ("glycemie", &["glycémie à jeun", "glycémie", "glucose"], "mg/dL"),
    ("insuline", &["insuline à jeun", "insuline"], "µUI/mL"),
    ("triglycerides", &["triglycérides", "triglycerides"], "mg/dL"),
    ("hdl", &["hdl cholestérol", "cholestérol hdl", "hdl"], "mg/dL"),
    ("ldl", &["ldl cholestérol", "cholestérol ldl", "ldl"], "mg/dL"),
    ("ferritine", &["ferritine"], "ng/mL"),
    ("homocysteine", &["homocystéine"], "µmol/L"),
    ("zonuline", &["zonuline"], "ng/mL"),
    ("lbp", &["lps-binding protein", "lbp"], "µg/mL"),
    ("aa_epa", &["rapport aa/epa", "aa/epa"], ""),
    ("omega3_index", &["index oméga-3", "omega-3 index", "index omega 3"], "%"),
    ("dhea", &["dhea"], "ng/mL"),
    ("cortisol_car_30", &["cortisol réveil +30", "cortisol +30", "cortisol car"], "nmol/L"),
    ("cortisol_reveil", &["cortisol réveil", "cortisol au réveil"], "nmol/L"),
    ("cortisol_12h", &["cortisol 12h"], "nmol/L"),
    ("cortisol_18h", &["cortisol 18h"], "nmol/L"),
    ("cortisol_22h", &["cortisol 22h", "cortisol coucher"], "nmol/L"),
    ("dopamine", &["dopamine"], "µg/g créat"),
    ("serotonine", &["sérotonine"], "µg/g créat"),
    ("noradrenaline", &["noradrénaline"], "µg/g créat"),
    ("adrenaline", &["adrénaline"], "µg/g créat"),
    ("benzoate", &["benzoate"], "mmol/mol créat"),
    ("hippurate", &["hippurate"], "mmol/mol créat"),
    ("phenol", &["phénol"], "mmol/mol créat"),
    ("p_cresol", &["p-crésol", "para-crésol"], "mmol/mol créat"),
    ("indican", &["indican"], "mmol/mol créat"),
    ("tsh", &["tsh"], "mUI/L"),
];

impl Default for BiomarkerCatalog {
    fn default() -> Self {
        let entries = DEFAULT_ENTRIES
            .iter()
            .map(|(key, names, unit)| {
                (
                    key.to_string(),
                    KnownBiomarker {
                        lab_names: names.iter().map(|n| n.to_string()).collect(),
                        unit: unit.to_string(),
                    },
                )
            })
            .collect();
        Self { entries }
    }
}

impl BiomarkerCatalog {
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: KnownBiomarker) {
        self.entries.insert(key.into(), entry);
    }

    /// Entries of `other` override same-key entries of `self`.
    pub fn merge(&mut self, other: BiomarkerCatalog) {
        for (key, entry) in other.entries {
            self.entries.insert(key, entry);
        }
    }

    pub fn get(&self, key: &str) -> Option<&KnownBiomarker> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KnownBiomarker)> {
        self.entries.iter()
    }

    /// Canonical key of the first entry with an alias contained in `name`.
    pub fn canonical_key_for(&self, name: &str) -> Option<&str> {
        let n = name.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(_, meta)| {
                meta.lab_names.iter().any(|alias| {
                    let a = alias.trim().to_lowercase();
                    !a.is_empty() && n.contains(&a)
                })
            })
            .map(|(key, _)| key.as_str())
    }

    pub fn is_known(&self, name: &str, key: &str) -> bool {
        self.contains_key(key) || self.canonical_key_for(name).is_some()
    }

    /// Fills in missing canonical keys from the aliases.
    pub fn annotate(&self, panel: &mut BiologyPanel) {
        for biomarker in panel.iter_mut() {
            if biomarker.canonical_key.is_none() {
                biomarker.canonical_key = self
                    .canonical_key_for(&biomarker.name)
                    .map(str::to_string);
            }
        }
    }

    /// Flattens a panel into canonical keys. A biomarker counts when it
    /// carries a canonical key or its own key is canonical.
    pub fn marker_set(&self, panel: &BiologyPanel) -> MarkerSet {
        let mut set = MarkerSet::new();
        for biomarker in panel.iter() {
            if let Some(canon) = &biomarker.canonical_key {
                set.insert(canon.clone(), biomarker.value);
            } else if self.contains_key(&biomarker.key) {
                set.insert(biomarker.key.clone(), biomarker.value);
            }
        }
        set
    }
}
