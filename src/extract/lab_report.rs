//! Universal lab-report text extractor.
//!
//! Runs in three passes. The targeted pass looks up catalogue aliases
//! anywhere in the text. The open pass reads result lines (`name value
//! unit (ref)`) in Synlab and generic layouts. The merge pass lets
//! targeted values override the matching panel entries, unless the targeted
//! value only came from prose and the panel entry from a result line.

use crate::domain::model::{Biomarker, BiologyPanel, ExtractionSource, MarkerSet};
use crate::extract::catalog::BiomarkerCatalog;
use crate::extract::reference::parse_reference;
use crate::extract::text::{normalize_key, parse_decimal, title_case};
use regex::Regex;
use std::sync::OnceLock;

const MIN_VALUE: f64 = 0.0001;
const MAX_VALUE: f64 = 100_000.0;

const SYNLAB_MARKERS: &[&str] = &[
    "synlab",
    "laboratoire de biologie médicale",
    "dossier validé biologiquement",
    "biologistes médicaux",
];

struct LinePatterns {
    spaces: Regex,
    synlab: Regex,
    tabulated: Regex,
    colon: Regex,
    space: Regex,
    noise_prefix: Regex,
    header_footer: Regex,
    dot_leader: Regex,
    label_tail: Regex,
}

fn line_patterns() -> &'static LinePatterns {
    static PATTERNS: OnceLock<LinePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| LinePatterns {
        spaces: Regex::new(r"\s{2,}").expect("Invalid whitespace regex"),
        synlab: Regex::new(
            r"^([A-Za-zÀ-ÿ0-9\s\-\(\)\+/]+?)\s{2,}(\d+[.,]?\d*)\s+([a-zA-Zµμ°/%]+(?:/[a-zA-Z0-9]+)?)(?:\s*\(([^)]{1,40})\))?\s*$",
        )
        .expect("Invalid synlab line regex"),
        tabulated: Regex::new(
            r"^([A-Za-zÀ-ÿ0-9\s\-\(\)\+/]+?)\s*[.:\s]{2,}\s*(\d+[.,]?\d*)\s*([a-zA-Zµμ°/%]+(?:/[a-zA-Z0-9]+)?)?(?:\s*\(([^)]{1,40})\))?\s*$",
        )
        .expect("Invalid tabulated line regex"),
        colon: Regex::new(
            r"^([A-Za-zÀ-ÿ0-9\s\-\(\)\+/]+?)\s*:\s*(\d+[.,]?\d*)\s*([a-zA-Zµμ°/%]+(?:/[a-zA-Z0-9]+)?)?(?:\s*\(([^)]{1,40})\))?\s*$",
        )
        .expect("Invalid colon line regex"),
        space: Regex::new(
            r"^([A-Za-zÀ-ÿ0-9\s\-\(\)\+/]+?)\s+(\d+[.,]?\d*)\s*([a-zA-Zµμ°/%]+(?:/[a-zA-Z0-9]+)?)?(?:\s*\(([^)]{1,40})\))?\s*$",
        )
        .expect("Invalid space line regex"),
        noise_prefix: Regex::new(r"^(?:page|edition|dossier|adresse|t[eé]l|fax)\b")
            .expect("Invalid noise prefix regex"),
        header_footer: Regex::new(
            r"^(?:page\s+\d+|date|laboratoire|patient|docteur|pr[ée]lev|r[ée]f[ée]rence|valeur|r[ée]sultat|unit[ée]|biochimie|h[ée]matologie|immunologie|microbiologie|commentaire|interpretation|conclusion|m[ée]thode)",
        )
        .expect("Invalid header/footer regex"),
        dot_leader: Regex::new(r"\.{3,}").expect("Invalid dot leader regex"),
        label_tail: Regex::new(r"^[a-z]{0,3}[ \t]*:").expect("Invalid label tail regex"),
    })
}

/// A result line broken into its parts.
#[derive(Debug, Clone, PartialEq)]
struct ParsedLine {
    name: String,
    value: f64,
    unit: String,
    reference: Option<String>,
}

/// Patterns for one catalogue alias.
struct TargetedAlias {
    patterns: Vec<Regex>,
    /// Longer aliases of other keys that start with this one.
    shadowed_by: Option<Regex>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TargetedHit {
    value: f64,
    on_result_line: bool,
}

pub struct LabReportExtractor {
    catalog: BiomarkerCatalog,
    targeted: Vec<(String, Vec<TargetedAlias>)>,
}

impl LabReportExtractor {
    pub fn new(catalog: BiomarkerCatalog) -> Self {
        let targeted = catalog
            .iter()
            .map(|(key, meta)| {
                let aliases = meta
                    .lab_names
                    .iter()
                    .map(|name| TargetedAlias {
                        patterns: targeted_patterns(name)
                            .into_iter()
                            .filter_map(|pattern| compile_targeted(key, &pattern))
                            .collect(),
                        shadowed_by: shadowing_pattern(&catalog, key, name)
                            .and_then(|pattern| compile_targeted(key, &pattern)),
                    })
                    .collect();
                (key.clone(), aliases)
            })
            .collect();

        Self { catalog, targeted }
    }

    pub fn catalog(&self) -> &BiomarkerCatalog {
        &self.catalog
    }

    /// Pass 1: catalogue markers found anywhere in the text. A value read
    /// from a result line wins over one read from prose.
    pub fn extract_known(&self, text: &str) -> MarkerSet {
        let mut found = MarkerSet::new();
        for (key, hit) in self.targeted_hits(text) {
            found.insert(key, hit.value);
        }
        found
    }

    fn targeted_hits(&self, text: &str) -> Vec<(String, TargetedHit)> {
        let lower = text.to_lowercase();
        let label_tail = &line_patterns().label_tail;
        let mut hits = Vec::new();

        for (key, aliases) in &self.targeted {
            let mut fallback = None;
            let mut chosen = None;

            'aliases: for alias in aliases {
                for re in &alias.patterns {
                    for caps in re.captures_iter(&lower) {
                        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                            continue;
                        };
                        let alias_start = alias_start(&lower, whole, number);
                        let shadowed = alias
                            .shadowed_by
                            .as_ref()
                            .is_some_and(|guard| guard.is_match(&lower[alias_start..]));
                        if shadowed || label_tail.is_match(&lower[number.end()..]) {
                            continue;
                        }
                        let value = parse_decimal(number.as_str()).filter(|v| is_plausible(*v));
                        let Some(value) = value else {
                            continue;
                        };

                        let hit = TargetedHit {
                            value,
                            on_result_line: is_result_line(line_at(&lower, whole.start())),
                        };
                        if hit.on_result_line {
                            chosen = Some(hit);
                            break 'aliases;
                        }
                        fallback.get_or_insert(hit);
                    }
                }
            }

            if let Some(hit) = chosen.or(fallback) {
                tracing::debug!("[targeted] {} = {}", key, hit.value);
                hits.push((key.clone(), hit));
            }
        }

        hits
    }

    /// Pass 2: every clean result line of the report.
    pub fn extract_all(&self, text: &str) -> BiologyPanel {
        let lines = preclean_lines(text);
        let mut panel = BiologyPanel::new();

        if is_synlab_format(text) {
            tracing::debug!("Synlab layout detected");
            for (i, line) in lines.iter().enumerate() {
                if line.starts_with('(') && line.ends_with(')') {
                    continue;
                }
                if !is_candidate_line(line) {
                    continue;
                }
                let Some(parsed) = parse_synlab_line(line) else {
                    continue;
                };
                panel.insert(self.to_biomarker(parsed, line, i, ExtractionSource::SynlabLine));
            }
        }

        for (i, line) in lines.iter().enumerate() {
            if !is_candidate_line(line) {
                continue;
            }
            let Some(parsed) = parse_generic_line(line) else {
                continue;
            };
            if !(MIN_VALUE..=MAX_VALUE).contains(&parsed.value) {
                continue;
            }

            let key = normalize_key(&parsed.name);
            let has_reference = parsed
                .reference
                .as_deref()
                .and_then(parse_reference)
                .is_some();
            if !(self.catalog.is_known(&parsed.name, &key)
                || !parsed.unit.is_empty()
                || has_reference)
            {
                continue;
            }
            if is_header_or_footer(&parsed.name) {
                continue;
            }

            panel.insert(self.to_biomarker(parsed, line, i, ExtractionSource::GenericLine));
        }

        panel
    }

    /// Pass 3: both passes, with targeted values taking precedence.
    pub fn extract_complete(&self, text: &str) -> (MarkerSet, BiologyPanel) {
        let hits = self.targeted_hits(text);
        let mut panel = self.extract_all(text);
        let mut known = MarkerSet::new();

        for (canonical_key, hit) in &hits {
            let name = title_case(canonical_key);
            let key = normalize_key(&name);
            let by_canonical = panel
                .iter()
                .any(|b| b.canonical_key.as_deref() == Some(canonical_key.as_str()));
            let existing = if by_canonical {
                panel.find_by_canonical_mut(canonical_key)
            } else {
                panel.get_mut(&key)
            };

            if let Some(existing) = existing {
                if !hit.on_result_line && existing.line_number.is_some() {
                    tracing::debug!(
                        "[targeted] {} = {} ignored, result line gives {}",
                        canonical_key,
                        hit.value,
                        existing.value
                    );
                } else {
                    existing.value = hit.value;
                }
                existing.canonical_key = Some(canonical_key.clone());
                known.insert(canonical_key.clone(), existing.value);
                continue;
            }

            known.insert(canonical_key.clone(), hit.value);

            let unit = self
                .catalog
                .get(canonical_key)
                .map(|meta| meta.unit.clone())
                .unwrap_or_default();
            panel.insert(Biomarker {
                name,
                key,
                value: hit.value,
                unit,
                reference: None,
                canonical_key: Some(canonical_key.clone()),
                source: ExtractionSource::Targeted,
                line_number: None,
                raw_text: String::new(),
                sample_date: None,
            });
        }

        tracing::debug!(
            "Lab report: {} targeted markers, {} panel entries",
            known.len(),
            panel.len()
        );
        (known, panel)
    }

    fn to_biomarker(
        &self,
        parsed: ParsedLine,
        line: &str,
        line_number: usize,
        source: ExtractionSource,
    ) -> Biomarker {
        let reference = parsed.reference.as_deref().and_then(parse_reference);
        let canonical_key = self
            .catalog
            .canonical_key_for(&parsed.name)
            .map(str::to_string);
        Biomarker {
            key: normalize_key(&parsed.name),
            name: parsed.name,
            value: parsed.value,
            unit: parsed.unit,
            reference,
            canonical_key,
            source,
            line_number: Some(line_number),
            raw_text: line.to_string(),
            sample_date: None,
        }
    }
}

/// Regex fragment matching `name` with the usual French accents on vowels and `c`.
fn accent_tolerant(name: &str) -> String {
    let mut out = String::new();
    for c in name.trim().to_lowercase().chars() {
        match c {
            'e' => out.push_str("[eéèêë]"),
            'a' => out.push_str("[aàâä]"),
            'i' => out.push_str("[iîï]"),
            'o' => out.push_str("[oôö]"),
            'u' => out.push_str("[uùûü]"),
            'c' => out.push_str("[cç]"),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out
}

fn targeted_patterns(name: &str) -> Vec<String> {
    let n = accent_tolerant(name);
    if n.is_empty() {
        return Vec::new();
    }
    vec![
        format!(r"(?im){n}\s*[:\s]\s*(\d+[.,]?\d*)"),
        format!(r"(?im){n}\s+(\d+[.,]?\d*)\s*[a-zµμ°/%A-Z]{{0,12}}"),
        format!(r"(?im)^[ \t]*(\d+[.,]?\d*)[ \t]+{n}"),
        format!(r"(?im){n}\s*[*+\-]?\s*(\d+[.,]?\d*)"),
    ]
}

/// Anchored pattern for the aliases of other keys that extend `name`,
/// e.g. "cortisol réveil +30" over "cortisol réveil".
fn shadowing_pattern(catalog: &BiomarkerCatalog, key: &str, name: &str) -> Option<String> {
    let prefix = name.trim().to_lowercase();
    if prefix.is_empty() {
        return None;
    }
    let longer: Vec<String> = catalog
        .iter()
        .filter(|(other, _)| other.as_str() != key)
        .flat_map(|(_, meta)| meta.lab_names.iter())
        .map(|alias| alias.trim().to_lowercase())
        .filter(|alias| alias.len() > prefix.len() && alias.starts_with(&prefix))
        .map(|alias| accent_tolerant(&alias))
        .collect();
    if longer.is_empty() {
        None
    } else {
        Some(format!("^(?:{})", longer.join("|")))
    }
}

fn compile_targeted(key: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!("Skipping targeted pattern for {}: {}", key, e);
            None
        }
    }
}

/// Byte offset of the alias inside a targeted match. Only the `value name`
/// form puts the number first.
fn alias_start(text: &str, whole: regex::Match<'_>, number: regex::Match<'_>) -> usize {
    if text[whole.start()..number.start()].trim().is_empty() && number.end() < whole.end() {
        let rest = &text[number.end()..whole.end()];
        number.end() + (rest.len() - rest.trim_start().len())
    } else {
        whole.start()
    }
}

fn line_at(text: &str, pos: usize) -> &str {
    let start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
    &text[start..end]
}

/// Whether the open pass would read `line` as a result line.
fn is_result_line(line: &str) -> bool {
    let line = line_patterns().spaces.replace_all(line.trim(), "  ");
    is_candidate_line(&line)
        && (parse_synlab_line(&line).is_some() || parse_generic_line(&line).is_some())
}

fn is_synlab_format(text: &str) -> bool {
    let lower = text.to_lowercase();
    SYNLAB_MARKERS.iter().any(|m| lower.contains(m))
}

fn preclean_lines(text: &str) -> Vec<String> {
    let spaces = &line_patterns().spaces;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| spaces.replace_all(line, "  ").into_owned())
        .collect()
}

fn is_candidate_line(line: &str) -> bool {
    let len = line.chars().count();
    if !(5..=140).contains(&len) {
        return false;
    }
    if !line.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let lower = line.to_lowercase();
    if lower.contains("http") || lower.contains("www") || lower.contains('@') {
        return false;
    }
    !line_patterns().noise_prefix.is_match(&lower)
}

/// Rejects zero and anything that reads like a year.
fn is_plausible(value: f64) -> bool {
    value != 0.0 && !(1800.0..=2100.0).contains(&value)
}

fn is_header_or_footer(name: &str) -> bool {
    line_patterns().header_footer.is_match(&name.to_lowercase())
}

fn clean_name(raw: &str) -> String {
    let without_leaders = line_patterns().dot_leader.replace_all(raw, "");
    let collapsed = without_leaders.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c| matches!(c, '.' | ':' | ';' | ',' | '|' | '-' | '_'))
        .to_string()
}

fn captures_to_parsed(caps: &regex::Captures<'_>) -> Option<ParsedLine> {
    let name = clean_name(&caps[1]);
    let value = parse_decimal(&caps[2])?;
    let unit = caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
    let reference = caps
        .get(4)
        .map(|m| m.as_str().trim().to_string())
        .filter(|r| !r.is_empty());
    Some(ParsedLine {
        name,
        value,
        unit,
        reference,
    })
}

fn parse_synlab_line(line: &str) -> Option<ParsedLine> {
    let caps = line_patterns().synlab.captures(line)?;
    let parsed = captures_to_parsed(&caps)?;
    if is_header_or_footer(&parsed.name) {
        return None;
    }
    if !(MIN_VALUE..=MAX_VALUE).contains(&parsed.value) || !is_plausible(parsed.value) {
        return None;
    }
    Some(parsed)
}

/// Tries the tabulated, colon and space layouts in order. The first layout
/// that matches decides; a failed sanity check does not fall through.
fn parse_generic_line(line: &str) -> Option<ParsedLine> {
    let p = line_patterns();
    let caps = [&p.tabulated, &p.colon, &p.space]
        .into_iter()
        .find_map(|re| re.captures(line))?;
    let parsed = captures_to_parsed(&caps)?;

    let name_len = parsed.name.chars().count();
    if !(3..=80).contains(&name_len) {
        return None;
    }
    if is_header_or_footer(&parsed.name) || !is_plausible(parsed.value) {
        return None;
    }
    Some(parsed)
}
