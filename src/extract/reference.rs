//! Reference-range parsing and status classification.
//!
//! Three textual shapes show up in lab reports and rule tables: a closed
//! range (`12.5-32.2`, `3,5 à 5,2`), a lower bound (`>30`, `≥ 75`) and an
//! upper bound (`<5.4`).

use crate::domain::model::{BiomarkerStatus, ReferenceRange};
use crate::extract::text::parse_decimal;
use regex::Regex;
use std::sync::OnceLock;

struct ReferencePatterns {
    range: Regex,
    lower: Regex,
    upper: Regex,
    norm_unit_tail: Regex,
    norm_upper: Regex,
    norm_lower: Regex,
    norm_range: Regex,
    free_range: Regex,
    free_upper: Regex,
    free_lower: Regex,
}

fn patterns() -> &'static ReferencePatterns {
    static PATTERNS: OnceLock<ReferencePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ReferencePatterns {
        range: Regex::new(r"^(\d+\.?\d*)-(\d+\.?\d*)$").expect("Invalid range regex"),
        lower: Regex::new(r"^(?:>=|>)(\d+\.?\d*)$").expect("Invalid lower bound regex"),
        upper: Regex::new(r"^(?:<=|<)(\d+\.?\d*)$").expect("Invalid upper bound regex"),
        norm_unit_tail: Regex::new(r"\s*[A-Za-z/%µ]+.*$").expect("Invalid unit tail regex"),
        norm_upper: Regex::new(r"^<\s*([\d.,]+)$").expect("Invalid norm upper regex"),
        norm_lower: Regex::new(r"^>\s*([\d.,]+)$").expect("Invalid norm lower regex"),
        norm_range: Regex::new(r"^([\d.,]+)\s*[–\-]\s*([\d.,]+)$").expect("Invalid norm range regex"),
        free_range: Regex::new(r"(-?\d+[.,]?\d*)\s*(?:-|–|—|à|to)\s*(-?\d+[.,]?\d*)")
            .expect("Invalid free range regex"),
        free_upper: Regex::new(r"(?:<|≤)\s*(-?\d+[.,]?\d*)").expect("Invalid free upper regex"),
        free_lower: Regex::new(r"(?:>|≥)\s*(-?\d+[.,]?\d*)").expect("Invalid free lower regex"),
    })
}

/// Parses the parenthesized reference printed next to a lab value.
pub fn parse_reference(raw: &str) -> Option<ReferenceRange> {
    let s: String = raw
        .trim()
        .replace(['−', '–'], "-")
        .replace('≥', ">=")
        .replace('≤', "<=")
        .replace(',', ".")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if s.is_empty() {
        return None;
    }

    let p = patterns();
    if let Some(caps) = p.range.captures(&s) {
        let low = parse_decimal(&caps[1])?;
        let high = parse_decimal(&caps[2])?;
        return Some(ReferenceRange::range(low, high));
    }
    if let Some(caps) = p.lower.captures(&s) {
        return parse_decimal(&caps[1]).map(ReferenceRange::lower_bound);
    }
    if let Some(caps) = p.upper.captures(&s) {
        return parse_decimal(&caps[1]).map(ReferenceRange::upper_bound);
    }
    None
}

/// Parses a rule-sheet norm cell such as `"3.5-5.2 g/L"`, `"< 5"` or `"> 30 nmol/L"`.
pub fn parse_norm(raw: &str) -> (Option<f64>, Option<f64>) {
    let p = patterns();
    let trimmed = raw.trim();
    let stripped = p.norm_unit_tail.replace(trimmed, "");
    let s = stripped.trim();
    if s.is_empty() {
        return (None, None);
    }

    if let Some(caps) = p.norm_upper.captures(s) {
        return (None, parse_decimal(&caps[1]));
    }
    if let Some(caps) = p.norm_lower.captures(s) {
        return (parse_decimal(&caps[1]), None);
    }
    if let Some(caps) = p.norm_range.captures(s) {
        return match (parse_decimal(&caps[1]), parse_decimal(&caps[2])) {
            (Some(low), Some(high)) => (Some(low), Some(high)),
            _ => (None, None),
        };
    }
    (None, None)
}

/// Classifies a value against a free-text reference (`"3.5 - 5.2"`, `"< 1.0"`, `"> 10"`).
pub fn determine_status(value: f64, reference: &str) -> BiomarkerStatus {
    let p = patterns();
    let reference = reference.trim();

    if let Some(caps) = p.free_range.captures(reference) {
        return match (parse_decimal(&caps[1]), parse_decimal(&caps[2])) {
            (Some(low), Some(high)) => ReferenceRange::range(low, high).status(value),
            _ => BiomarkerStatus::Unknown,
        };
    }
    if let Some(caps) = p.free_upper.captures(reference) {
        return match parse_decimal(&caps[1]) {
            Some(high) => ReferenceRange::upper_bound(high).status(value),
            None => BiomarkerStatus::Unknown,
        };
    }
    if let Some(caps) = p.free_lower.captures(reference) {
        return match parse_decimal(&caps[1]) {
            Some(low) => ReferenceRange::lower_bound(low).status(value),
            None => BiomarkerStatus::Unknown,
        };
    }
    BiomarkerStatus::Unknown
}

/// Status from optional reference and optimal bounds, as carried by rule tables.
pub fn infer_status(
    value: f64,
    ref_low: Option<f64>,
    ref_high: Option<f64>,
    opt_low: Option<f64>,
    opt_high: Option<f64>,
) -> BiomarkerStatus {
    if let (Some(lo), Some(hi)) = (opt_low, opt_high) {
        if lo <= value && value <= hi {
            return BiomarkerStatus::Optimal;
        }
    }

    if let (Some(lo), Some(hi)) = (ref_low, ref_high) {
        if lo <= value && value <= hi {
            return BiomarkerStatus::Normal;
        }
        return if value < lo {
            BiomarkerStatus::Low
        } else {
            BiomarkerStatus::High
        };
    }

    match (ref_low, ref_high) {
        (Some(lo), _) if value < lo => BiomarkerStatus::Low,
        (_, Some(hi)) if value > hi => BiomarkerStatus::High,
        _ => BiomarkerStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ReferenceKind;

    #[test]
    fn test_parse_reference_forms() {
        let r = parse_reference("12.5−32.2").unwrap();
        assert_eq!(r.kind, ReferenceKind::Range);
        assert_eq!((r.low, r.high), (Some(12.5), Some(32.2)));

        let r = parse_reference(">= 75").unwrap();
        assert_eq!(r.kind, ReferenceKind::LowerBound);
        assert_eq!(r.low, Some(75.0));

        let r = parse_reference("<5,4").unwrap();
        assert_eq!(r.kind, ReferenceKind::UpperBound);
        assert_eq!(r.high, Some(5.4));

        assert!(parse_reference("voir commentaire").is_none());
        assert!(parse_reference("").is_none());
    }

    #[test]
    fn test_parse_norm() {
        assert_eq!(parse_norm("3.5-5.2 g/L"), (Some(3.5), Some(5.2)));
        assert_eq!(parse_norm("30 – 100"), (Some(30.0), Some(100.0)));
        assert_eq!(parse_norm("< 5 mg/L"), (None, Some(5.0)));
        assert_eq!(parse_norm(">30"), (Some(30.0), None));
        assert_eq!(parse_norm("mg/L"), (None, None));
        assert_eq!(parse_norm("1.2.3-4"), (None, None));
    }

    #[test]
    fn test_determine_status() {
        assert_eq!(determine_status(3.0, "3.5 - 5.2"), BiomarkerStatus::Low);
        assert_eq!(determine_status(4.0, "3,5 à 5,2"), BiomarkerStatus::Normal);
        assert_eq!(determine_status(1.5, "< 1.0"), BiomarkerStatus::High);
        assert_eq!(determine_status(12.0, "≥ 10"), BiomarkerStatus::Normal);
        assert_eq!(determine_status(12.0, "see note"), BiomarkerStatus::Unknown);
    }

    #[test]
    fn test_infer_status() {
        assert_eq!(
            infer_status(50.0, Some(30.0), Some(100.0), Some(40.0), Some(60.0)),
            BiomarkerStatus::Optimal
        );
        assert_eq!(
            infer_status(35.0, Some(30.0), Some(100.0), Some(40.0), Some(60.0)),
            BiomarkerStatus::Normal
        );
        assert_eq!(infer_status(20.0, Some(30.0), Some(100.0), None, None), BiomarkerStatus::Low);
        assert_eq!(infer_status(120.0, None, Some(100.0), None, None), BiomarkerStatus::High);
        assert_eq!(infer_status(50.0, None, Some(100.0), None, None), BiomarkerStatus::Unknown);
    }
}
