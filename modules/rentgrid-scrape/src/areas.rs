//! Search-area resolution: named boroughs and raw outcodes.
//!
//! Grounded on the teacher's `rootsignal-scout::sources::city_profile`
//! static-table-plus-alias-normalization shape, applied to boroughs instead
//! of cities.

/// Borough name (already alias-normalized, lowercase, hyphenated) to its
/// member outcodes. Not exhaustive — enough London boroughs to exercise the
/// gate and dedup blocking in tests and to demonstrate the shape.
const BOROUGH_OUTCODES: &[(&str, &[&str])] = &[
    ("hackney", &["E5", "E8", "E9", "N1", "N16"]),
    ("tower-hamlets", &["E1", "E2", "E3", "E14"]),
    ("islington", &["N1", "N4", "N5", "N7", "N19"]),
    ("camden", &["NW1", "NW3", "NW5", "WC1"]),
    ("southwark", &["SE1", "SE5", "SE15", "SE17", "SE22"]),
    ("lambeth", &["SE11", "SE24", "SE27", "SW2", "SW4", "SW9"]),
];

/// Alias spellings to the canonical hyphenated borough name used as the
/// lookup key above.
const ALIASES: &[(&str, &str)] = &[
    ("tower hamlets", "tower-hamlets"),
    ("towerhamlets", "tower-hamlets"),
];

/// Lowercase, collapse internal whitespace, apply known aliases.
fn normalize_area_name(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == collapsed)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(collapsed)
}

/// True if `s` already looks like a bare outcode rather than a borough name
/// (1-2 letters, 1 digit, optional trailing letter/digit, no space).
fn looks_like_outcode(s: &str) -> bool {
    rentgrid_common::outcode_of(&s.to_uppercase()).as_deref() == Some(&s.to_uppercase())
}

/// Resolve a list of search areas (borough names or raw outcodes) into the
/// flat set of outcodes the criteria & location gate should accept.
///
/// Unknown borough names are dropped (logged at `warn` by the caller, not
/// here — this stays a pure function).
pub fn resolve_outcodes(areas: &[String]) -> std::collections::HashSet<String> {
    let mut outcodes = std::collections::HashSet::new();
    for area in areas {
        let normalized = normalize_area_name(area);
        if looks_like_outcode(area) {
            outcodes.insert(area.to_uppercase());
            continue;
        }
        if let Some((_, members)) = BOROUGH_OUTCODES.iter().find(|(name, _)| *name == normalized) {
            outcodes.extend(members.iter().map(|s| s.to_string()));
        }
    }
    outcodes
}
