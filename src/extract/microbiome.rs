//! GutMAP-style microbiome report reader.
//!
//! Most quantitative results of these reports are charts, so only what the
//! text layer reliably carries is read: the dysbiosis index, the diversity
//! sentence, key species and the `<group> <result>` lines.

use crate::domain::model::{BacteriaGroup, MicrobiomeReport};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;

pub const KEY_SPECIES: &[&str] = &[
    "akkermansia muciniphila",
    "faecalibacterium prausnitzii",
    "bifidobacterium",
    "lactobacillus",
    "prevotella",
    "escherichia coli",
    "clostridium difficile",
];

struct MicrobiomePatterns {
    di_text: Regex,
    di_filename: Regex,
    diversity: Regex,
    group_line: Regex,
}

fn patterns() -> &'static MicrobiomePatterns {
    static PATTERNS: OnceLock<MicrobiomePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| MicrobiomePatterns {
        di_text: Regex::new(r"(?i)(dysbiosis\s+index\s*\(di\)\s*[:=]\s*|di\s*[:=]\s*)([1-5])\b")
            .expect("Invalid dysbiosis index regex"),
        di_filename: Regex::new(r"(?:^|[^A-Z0-9])DI[-_ ]?([1-5])(?:[^0-9]|$)")
            .expect("Invalid filename index regex"),
        diversity: Regex::new(r"(?i)result:\s*the bacterial diversity is ([a-z ]+?)(?:\.|\n|$)")
            .expect("Invalid diversity regex"),
        group_line: Regex::new(
            r"(?im)^[ \t]*([A-Za-z][A-Za-z0-9 .\-/]{2,60}?)[ \t]+(slightly elevated|slightly reduced|deviating high|deviating low|expected|normal|elevated|reduced|high|low)[ \t\r]*$",
        )
        .expect("Invalid bacteria group regex"),
    })
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn di_from_text(text: &str) -> Option<u8> {
    patterns()
        .di_text
        .captures(text)
        .and_then(|caps| caps[2].parse().ok())
}

fn di_from_filename(filename: Option<&str>) -> Option<u8> {
    let upper = filename?.to_uppercase();
    patterns()
        .di_filename
        .captures(&upper)
        .and_then(|caps| caps[1].parse().ok())
}

fn di_from_interpretation(normalized: &str) -> Option<u8> {
    if normalized.contains("microbiota is normobiotic") {
        return Some(1);
    }
    if normalized.contains("mildly dysbiotic") {
        return Some(3);
    }
    if normalized.contains("severely dysbiotic") {
        return Some(4);
    }

    if normalized.contains("normobiotic") {
        return Some(1);
    }
    if normalized.contains("dysbiotic") && normalized.contains("mild") {
        return Some(3);
    }
    if normalized.contains("dysbiotic") && normalized.contains("severe") {
        return Some(4);
    }
    None
}

pub fn dysbiosis_status(index: u8) -> &'static str {
    match index {
        0..=2 => "normobiotic",
        3 => "mildly dysbiotic",
        _ => "severely dysbiotic",
    }
}

/// Ordinal diversity score: 3 as expected, 2 slightly off, 1 reduced.
pub fn diversity_score(phrase: &str) -> u8 {
    if phrase.contains("expected") {
        3
    } else if phrase.contains("slightly") || phrase.contains("mild") {
        2
    } else if phrase.contains("lower") || phrase.contains("reduced") || phrase.contains("low") {
        1
    } else {
        2
    }
}

fn diversity(text: &str, normalized: &str) -> Option<(String, u8)> {
    if let Some(caps) = patterns().diversity.captures(text) {
        let phrase = normalize(&caps[1]);
        let score = diversity_score(&phrase);
        return Some((phrase, score));
    }
    if normalized.contains("bacterial diversity is as expected") {
        return Some(("as expected".to_string(), 3));
    }
    None
}

fn bacteria_groups(text: &str) -> Vec<BacteriaGroup> {
    patterns()
        .group_line
        .captures_iter(text)
        .map(|caps| BacteriaGroup {
            name: caps[1].trim().to_string(),
            result: caps[2].to_lowercase(),
        })
        .collect()
}

/// Returns `None` when nothing useful was found.
pub fn extract_microbiome(text: &str, filename: Option<&str>) -> Option<MicrobiomeReport> {
    let normalized = normalize(text);

    let dysbiosis_index = di_from_text(text)
        .or_else(|| di_from_filename(filename))
        .or_else(|| di_from_interpretation(&normalized));

    let (diversity, diversity_score) = match diversity(text, &normalized) {
        Some((phrase, score)) => (Some(phrase), Some(score)),
        None => (None, None),
    };

    let presence: IndexMap<String, bool> = KEY_SPECIES
        .iter()
        .map(|species| (species.replace(' ', "_"), normalized.contains(species)))
        .collect();

    let report = MicrobiomeReport {
        dysbiosis_index,
        dysbiosis_status: dysbiosis_index.map(|di| dysbiosis_status(di).to_string()),
        diversity,
        diversity_score,
        presence,
        groups: bacteria_groups(text),
    };

    tracing::debug!(
        "Microbiome: DI={:?}, diversity={:?}, {} groups",
        report.dysbiosis_index,
        report.diversity,
        report.groups.len()
    );

    report.is_useful().then_some(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUTMAP: &str = "IDK GutMAP report
Result: The microbiota is mildly dysbiotic.
Result: The bacterial diversity is slightly lower than expected.
Akkermansia muciniphila slightly reduced
Bifidobacterium expected
Faecalibacterium prausnitzii deviating low
Proteobacteria elevated";

    #[test]
    fn test_full_report() {
        let report = extract_microbiome(GUTMAP, None).unwrap();
        assert_eq!(report.dysbiosis_index, Some(3));
        assert_eq!(report.dysbiosis_status.as_deref(), Some("mildly dysbiotic"));
        assert_eq!(
            report.diversity.as_deref(),
            Some("slightly lower than expected")
        );
        // "expected" is checked first
        assert_eq!(report.diversity_score, Some(3));
        assert!(report.presence["akkermansia_muciniphila"]);
        assert!(!report.presence["lactobacillus"]);
        assert_eq!(report.groups.len(), 4);
        assert_eq!(report.groups[0].name, "Akkermansia muciniphila");
        assert_eq!(report.groups[0].result, "slightly reduced");
        assert_eq!(report.groups[3].result, "elevated");
    }

    #[test]
    fn test_di_sources_in_order() {
        assert_eq!(
            extract_microbiome("Dysbiosis Index (DI): 2\nseverely dysbiotic", Some("x_DI-5_EN.txt"))
                .unwrap()
                .dysbiosis_index,
            Some(2)
        );
        assert_eq!(
            extract_microbiome("severely dysbiotic", Some("report_DI-5_EN.txt"))
                .unwrap()
                .dysbiosis_index,
            Some(5)
        );
        let report = extract_microbiome("The sample is severely dysbiotic.", None).unwrap();
        assert_eq!(report.dysbiosis_index, Some(4));
        assert_eq!(report.dysbiosis_status.as_deref(), Some("severely dysbiotic"));
    }

    #[test]
    fn test_diversity_ordinal() {
        assert_eq!(diversity_score("as expected"), 3);
        assert_eq!(diversity_score("mildly reduced"), 2);
        assert_eq!(diversity_score("reduced"), 1);
        assert_eq!(diversity_score("unusual"), 2);
    }

    #[test]
    fn test_nothing_useful() {
        assert!(extract_microbiome("Patient name: John\nSample received", None).is_none());
    }
}
