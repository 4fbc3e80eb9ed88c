//! Lot and tract extraction from recorded legal descriptions.

use std::sync::LazyLock;

use regex::Regex;

static LOT_THEN_TRACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"LOT\s+(\d+).*?TRACT\s+(?:NO\.?\s*)?(\d+)").expect("valid regex"));
static TRACT_THEN_LOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"TRACT\s+(?:NO\.?\s*)?(\d+).*?LOT\s+(\d+)").expect("valid regex"));
static TR_THEN_LOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"TR\s+(\d+).*?LOT\s+(\d+)").expect("valid regex"));
static ANY_LOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"LOT\s+(\d+)").expect("valid regex"));
static ANY_TRACT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:TRACT|TR)\s+(?:NO\.?\s*)?(\d+)").expect("valid regex"));

/// Lot and tract numbers found in a legal description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotTract {
    pub lot: String,
    pub tract: String,
}

/// Pull `(lot, tract)` out of free-form legal description text.
///
/// ```
/// use parcelwatch_core::legal::parse_legal_description;
/// let lt = parse_legal_description("LOT 87 OF TRACT NO 13141").unwrap();
/// assert_eq!((lt.lot.as_str(), lt.tract.as_str()), ("87", "13141"));
/// ```
///
/// Recognised shapes, tried in order: `LOT x … TRACT [NO] y`,
/// `TRACT [NO] y … LOT x`, `TR y … LOT x`, then any `LOT x` together with
/// any `TRACT|TR [NO] y`. Matching is case-insensitive.
pub fn parse_legal_description(text: &str) -> Option<LotTract> {
    let upper = text.to_uppercase();
    if upper.trim().is_empty() {
        return None;
    }

    let found = |lot: &str, tract: &str| LotTract {
        lot: lot.to_string(),
        tract: tract.to_string(),
    };

    if let Some(c) = LOT_THEN_TRACT.captures(&upper) {
        return Some(found(&c[1], &c[2]));
    }
    if let Some(c) = TRACT_THEN_LOT.captures(&upper) {
        return Some(found(&c[2], &c[1]));
    }
    if let Some(c) = TR_THEN_LOT.captures(&upper) {
        return Some(found(&c[2], &c[1]));
    }
    let lot = ANY_LOT.captures(&upper)?;
    let tract = ANY_TRACT.captures(&upper)?;
    Some(found(&lot[1], &tract[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(text: &str) -> Option<(String, String)> {
        parse_legal_description(text).map(|lt| (lt.lot, lt.tract))
    }

    fn pair(lot: &str, tract: &str) -> Option<(String, String)> {
        Some((lot.to_string(), tract.to_string()))
    }

    #[test]
    fn lot_of_tract() {
        assert_eq!(parsed("LOT 87 OF TRACT NO 13141"), pair("87", "13141"));
        assert_eq!(parsed("lot 87 of tract no. 13141"), pair("87", "13141"));
    }

    #[test]
    fn tract_then_lot() {
        assert_eq!(parsed("TRACT 7128 LOT 2"), pair("2", "7128"));
        assert_eq!(parsed("TRACT NO 7128, LOT 2"), pair("2", "7128"));
    }

    #[test]
    fn abbreviated_tract() {
        assert_eq!(parsed("TR 5000 LOT 1 BLOCK A"), pair("1", "5000"));
    }

    #[test]
    fn no_lot_or_tract() {
        assert_eq!(parsed("PARCEL 1 OF PM 123"), None);
        assert_eq!(parsed("LOT 4"), None);
        assert_eq!(parsed(""), None);
    }
}
