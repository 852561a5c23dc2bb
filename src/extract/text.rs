use regex::Regex;
use std::sync::OnceLock;

fn parenthesized_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(.*?\)").expect("Invalid parenthesized group regex"))
}

fn advice_separator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\r?\n)+|(?:\s*;\s*)|(?:\s*\|\s*)").expect("Invalid advice separator regex")
    })
}

/// Replaces accented Latin letters by their ASCII base letter.
pub fn fold_accents(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'à' | 'á' | 'â' | 'ä' | 'ã' | 'å' => out.push('a'),
            'À' | 'Á' | 'Â' | 'Ä' | 'Ã' | 'Å' => out.push('A'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'É' | 'È' | 'Ê' | 'Ë' => out.push('E'),
            'í' | 'ì' | 'î' | 'ï' => out.push('i'),
            'Í' | 'Ì' | 'Î' | 'Ï' => out.push('I'),
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => out.push('o'),
            'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => out.push('O'),
            'ú' | 'ù' | 'û' | 'ü' => out.push('u'),
            'Ú' | 'Ù' | 'Û' | 'Ü' => out.push('U'),
            'ý' | 'ÿ' => out.push('y'),
            'ç' => out.push('c'),
            'Ç' => out.push('C'),
            'ñ' => out.push('n'),
            'Ñ' => out.push('N'),
            'œ' => out.push_str("oe"),
            'Œ' => out.push_str("OE"),
            'æ' => out.push_str("ae"),
            'Æ' => out.push_str("AE"),
            _ => out.push(c),
        }
    }
    out
}

/// `"CRP ultra-sensible"` → `"crp_ultra_sensible"`.
pub fn normalize_key(name: &str) -> String {
    let folded = fold_accents(&name.to_lowercase());
    let mut key = String::with_capacity(folded.len());
    let mut pending_sep = false;
    for c in folded.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !key.is_empty() {
                key.push('_');
            }
            pending_sep = false;
            key.push(c);
        } else {
            pending_sep = true;
        }
    }
    key
}

/// Label form used for rule matching: no accents, no parenthesized
/// qualifiers, only `[a-z0-9]` words separated by single spaces.
pub fn normalize_label(s: &str) -> String {
    let folded = fold_accents(&s.trim().to_lowercase());
    let without_groups = parenthesized_re().replace_all(&folded, "");
    let spaced: String = without_groups
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Accepts `,` as decimal separator; rejects NaN and infinities.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let cleaned = s.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_placeholder(s: &str) -> bool {
    matches!(
        normalize_label(s).as_str(),
        "" | "nan" | "none" | "null"
    ) || s.trim() == "-"
}

/// Splits a rule cell holding several recommendations (newline, `;` or `|` separated).
pub fn split_advice_lines(cell: &str) -> Vec<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || is_placeholder(trimmed) {
        return Vec::new();
    }
    advice_separator_re()
        .split(trimmed)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// `"crp_us"` → `"Crp Us"`.
pub fn title_case(key: &str) -> String {
    key.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("CRP ultra-sensible"), "crp_ultra_sensible");
        assert_eq!(normalize_key("  Fer sérique "), "fer_serique");
        assert_eq!(normalize_key("25-OH Vitamine D"), "25_oh_vitamine_d");
        assert_eq!(normalize_key("***"), "");
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Ferritine (sérum)"), "ferritine");
        assert_eq!(normalize_label("Vitamine D 25-OH"), "vitamine d 25 oh");
        assert_eq!(normalize_label("  Homocystéine  "), "homocysteine");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("3,5"), Some(3.5));
        assert_eq!(parse_decimal(" 12 "), Some(12.0));
        assert_eq!(parse_decimal("nan"), None);
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
    }

    #[test]
    fn test_split_advice_lines() {
        assert_eq!(
            split_advice_lines("Magnésium 300mg; Oméga-3 | Vitamine D\nZinc"),
            vec!["Magnésium 300mg", "Oméga-3", "Vitamine D", "Zinc"]
        );
        assert!(split_advice_lines("nan").is_empty());
        assert!(split_advice_lines(" - ").is_empty());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("crp_us"), "Crp Us");
        assert_eq!(title_case("vit_d"), "Vit D");
    }
}
