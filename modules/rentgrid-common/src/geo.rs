use std::sync::LazyLock;

use regex::Regex;

use crate::types::Source;

/// Great-circle distance in meters. Teacher's world module computes the same
/// haversine in km; the dedup scorer here wants meter-scale proximity bands.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}

static OUTCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{1,2}[0-9][A-Z0-9]?)\s").unwrap());
static OUTCODE_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]{1,2}[0-9][A-Z0-9]?)$").unwrap());

/// Normalize a raw postcode string: uppercase, collapse whitespace to a
/// single internal space. Returns `None` for empty input.
pub fn normalize_postcode(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Extract the outcode (e.g. `"E8"` from `"E8 3RH"`) from an already
/// normalized postcode. A bare outcode with no incode (`"E8"`) is its own
/// outcode. Returns `None` when the postcode doesn't match either shape —
/// callers in strict mode should treat that as a gate rejection.
pub fn outcode_of(normalized_postcode: &str) -> Option<String> {
    if let Some(caps) = OUTCODE_RE.captures(normalized_postcode) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = OUTCODE_ONLY_RE.captures(normalized_postcode) {
        return Some(caps[1].to_string());
    }
    None
}

/// True when the postcode carries both outcode and incode (i.e. a full
/// postcode), used by the dedup scorer's "full postcode identity" signal.
pub fn is_full_postcode(normalized_postcode: &str) -> bool {
    OUTCODE_RE.is_match(normalized_postcode)
}

/// Filesystem-safe rendering of a property's identity: `:` and path
/// separators replaced with `_`.
pub fn safe_id(source: Source, source_id: &str) -> String {
    let raw = format!("{source:?}:{source_id}").to_lowercase();
    raw.chars()
        .map(|c| if c == ':' || c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_self_is_zero() {
        assert_eq!(haversine_m(51.5465, -0.0553, 51.5465, -0.0553), 0.0);
    }

    #[test]
    fn haversine_triangle_inequality() {
        let q1 = (51.5465, -0.0553);
        let q2 = (51.5079, -0.1283);
        let q3 = (51.4545, -0.9780);
        let d13 = haversine_m(q1.0, q1.1, q3.0, q3.1);
        let d12 = haversine_m(q1.0, q1.1, q2.0, q2.1);
        let d23 = haversine_m(q2.0, q2.1, q3.0, q3.1);
        assert!(d13 <= d12 + d23 + 1.0);
    }

    #[test]
    fn normalize_collapses_whitespace_and_uppercases() {
        assert_eq!(normalize_postcode("  e8   3rh "), Some("E8 3RH".to_string()));
    }

    #[test]
    fn normalize_empty_is_none() {
        assert_eq!(normalize_postcode(""), None);
        assert_eq!(normalize_postcode("   "), None);
    }

    #[test]
    fn outcode_from_full_postcode() {
        assert_eq!(outcode_of("E8 3RH"), Some("E8".to_string()));
        assert_eq!(outcode_of("SW1A 1AA"), Some("SW1A".to_string()));
        assert_eq!(outcode_of("N1 9GU"), Some("N1".to_string()));
    }

    #[test]
    fn outcode_from_outcode_only() {
        assert_eq!(outcode_of("E8"), Some("E8".to_string()));
    }

    #[test]
    fn outcode_absent_is_none() {
        assert_eq!(outcode_of(""), None);
        assert_eq!(outcode_of("NOTAPOSTCODE"), None);
    }

    #[test]
    fn full_postcode_detection() {
        assert!(is_full_postcode("E8 3RH"));
        assert!(!is_full_postcode("E8"));
    }

    #[test]
    fn safe_id_replaces_separators() {
        let id = safe_id(Source::Openrent, "OR/100:2");
        assert!(!id.contains(':'));
        assert!(!id.contains('/'));
    }
}
