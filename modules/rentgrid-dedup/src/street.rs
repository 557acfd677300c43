//! Street-name normalization for the street-name-equality dedup signal.

use std::sync::LazyLock;

use regex::Regex;

static LEADING_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+[a-zA-Z]?\s*[,-]?\s*").unwrap());
static POSTCODE_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b[a-z]{1,2}\d[a-z0-9]?\s*\d[a-z]{2}\b").unwrap());
static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Common UK address abbreviations, expanded so `"Crown Rd"` and
/// `"Crown Road"` compare equal.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("rd", "road"),
    ("st", "street"),
    ("ave", "avenue"),
    ("ave.", "avenue"),
    ("cl", "close"),
    ("gdns", "gardens"),
    ("ln", "lane"),
    ("pl", "place"),
    ("sq", "square"),
    ("ter", "terrace"),
    ("cres", "crescent"),
    ("mws", "mews"),
    ("ct", "court"),
];

/// Normalize a free-text address into a comparable street name: strips any
/// embedded postcode and leading house number, lowercases, strips
/// punctuation, and expands known abbreviations.
///
/// Returns `None` for input with nothing left to compare (the house number
/// and postcode were the entire string).
pub fn normalize_street(address: &str) -> Option<String> {
    let without_postcode = POSTCODE_TAIL_RE.replace_all(address, "");
    let without_number = LEADING_NUMBER_RE.replace(&without_postcode, "");
    let lowered = without_number.to_lowercase();
    let stripped = NON_ALNUM_RE.replace_all(&lowered, " ");
    let collapsed = WHITESPACE_RE.replace_all(stripped.trim(), " ").to_string();

    if collapsed.is_empty() {
        return None;
    }

    let expanded = collapsed
        .split(' ')
        .map(|token| {
            ABBREVIATIONS
                .iter()
                .find(|(abbrev, _)| *abbrev == token)
                .map(|(_, full)| full.to_string())
                .unwrap_or_else(|| token.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ");

    Some(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_number_and_postcode_and_lowercases() {
        assert_eq!(
            normalize_street("42 Crown Road, London, E8 3RH"),
            Some("crown road london".to_string())
        );
    }

    #[test]
    fn expands_abbreviations_to_match_full_form() {
        assert_eq!(normalize_street("12 Crown Rd"), normalize_street("12 Crown Road"));
    }

    #[test]
    fn all_consumed_input_is_none() {
        assert_eq!(normalize_street("42 E8 3RH"), None);
    }
}
