//! Lot/tract → APN resolution.
//!
//! The county recorder portal exposes the lot and tract numbers from a deed's
//! legal description but not the APN. This table bridges the two. It is
//! populated from assessor exports, parsed legal descriptions and manual
//! curation.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, info};

use crate::address::city_key;
use crate::error::CoreError;
use crate::record::LotTractMapping;

/// Lookup key: trimmed lot and tract, lowercased city (empty when unknown).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LotTractKey {
    pub lot: String,
    pub tract: String,
    pub city: String,
}

impl LotTractKey {
    pub fn new(lot: &str, tract: &str, city: Option<&str>) -> Self {
        Self {
            lot: lot.trim().to_string(),
            tract: tract.trim().to_string(),
            city: city.map(city_key).unwrap_or_default(),
        }
    }

    fn of(mapping: &LotTractMapping) -> Self {
        Self::new(&mapping.lot_number, &mapping.tract_number, Some(&mapping.city))
    }
}

impl fmt::Display for LotTractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.lot, self.tract, self.city)
    }
}

/// How a lot/tract pair was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Lot, tract and city all matched.
    Exact(&'a str),
    /// Lot and tract matched an entry filed under a different (or no) city.
    CityIgnored { apn: &'a str, city: &'a str },
}

impl<'a> Resolution<'a> {
    pub fn apn(&self) -> &'a str {
        match *self {
            Self::Exact(apn) => apn,
            Self::CityIgnored { apn, .. } => apn,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct LotTractIndex {
    map: HashMap<LotTractKey, String>,
    // First-insertion order, scanned by the city-ignoring fallback.
    order: Vec<LotTractKey>,
}

impl LotTractIndex {
    /// Build from every `lot_tract_apn_lookup` row.
    pub fn build<I>(rows: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = LotTractMapping>,
    {
        let mut index = Self::default();
        for (row, mapping) in rows.into_iter().enumerate() {
            if let Some(field) = mapping.blank_field() {
                return Err(CoreError::MalformedRow {
                    table: "lot_tract_apn_lookup",
                    row,
                    reason: format!("blank {field}"),
                });
            }
            index.insert(mapping);
        }
        info!(mappings = index.len(), "built lot/tract index");
        Ok(index)
    }

    /// Upsert one mapping. Returns the APN it replaced, if any.
    pub fn insert(&mut self, mapping: LotTractMapping) -> Option<String> {
        let key = LotTractKey::of(&mapping);
        let apn = mapping.apn.trim().to_string();
        let prev = self.map.insert(key.clone(), apn);
        if prev.is_none() {
            self.order.push(key);
        }
        prev
    }

    /// Exact `(lot, tract, city)` lookup with no fallback.
    pub fn lookup_exact(&self, lot: &str, tract: &str, city: Option<&str>) -> Option<&str> {
        self.map
            .get(&LotTractKey::new(lot, tract, city))
            .map(String::as_str)
    }

    /// Resolve a lot/tract pair.
    ///
    /// Tries the exact key first. With `city_fallback`, a miss falls through
    /// to a linear scan that ignores the city and returns the first mapping
    /// (in insertion order) with the same lot and tract. Jurisdictions that
    /// reuse tract numbers can produce a wrong parcel here, so callers flag
    /// those results for review.
    pub fn resolve(
        &self,
        lot: &str,
        tract: &str,
        city: Option<&str>,
        city_fallback: bool,
    ) -> Option<Resolution<'_>> {
        let key = LotTractKey::new(lot, tract, city);
        if let Some(apn) = self.map.get(&key) {
            return Some(Resolution::Exact(apn.as_str()));
        }
        if !city_fallback {
            return None;
        }
        let hit = self
            .order
            .iter()
            .find(|k| k.lot == key.lot && k.tract == key.tract)?;
        let apn = self.map.get(hit)?;
        debug!(lot = %key.lot, tract = %key.tract, apn = %apn, filed_city = %hit.city, "lot/tract matched without city");
        Some(Resolution::CityIgnored {
            apn: apn.as_str(),
            city: hit.city.as_str(),
        })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(lot: &str, tract: &str, city: &str, apn: &str) -> LotTractMapping {
        LotTractMapping::new(lot, tract, city, apn)
    }

    #[test]
    fn key_display() {
        let key = LotTractKey::new(" 87 ", "13141", Some("Rancho Santa Margarita"));
        assert_eq!(key.to_string(), "87|13141|rancho santa margarita");
        assert_eq!(LotTractKey::new("1", "2", None).to_string(), "1|2|");
    }

    #[test]
    fn exact_city_preferred_over_scan() {
        let index = LotTractIndex::build(vec![
            m("5", "100", "Anaheim", "B"),
            m("5", "100", "Orange", "A"),
        ])
        .unwrap();
        assert_eq!(
            index.resolve("5", "100", Some("Orange"), true),
            Some(Resolution::Exact("A"))
        );
        assert_eq!(
            index.resolve("5", "100", Some("ANAHEIM"), true),
            Some(Resolution::Exact("B"))
        );
    }

    #[test]
    fn fallback_takes_first_inserted() {
        let index = LotTractIndex::build(vec![
            m("5", "100", "Orange", "A"),
            m("5", "100", "Anaheim", "B"),
        ])
        .unwrap();
        assert_eq!(
            index.resolve("5", "100", Some("Tustin"), true),
            Some(Resolution::CityIgnored {
                apn: "A",
                city: "orange"
            })
        );
        assert_eq!(
            index.resolve("5", "100", None, true).map(|r| r.apn()),
            Some("A")
        );
    }

    #[test]
    fn fallback_can_be_disabled() {
        let index = LotTractIndex::build(vec![m("5", "100", "Orange", "A")]).unwrap();
        assert_eq!(index.resolve("5", "100", Some("Tustin"), false), None);
        assert_eq!(
            index.resolve("5", "100", Some("orange"), false),
            Some(Resolution::Exact("A"))
        );
    }

    #[test]
    fn upsert_replaces_and_keeps_order() {
        let mut index = LotTractIndex::build(vec![
            m("5", "100", "Orange", "A"),
            m("5", "100", "Anaheim", "B"),
        ])
        .unwrap();
        assert_eq!(index.insert(m("5", "100", "orange", "C")), Some("A".into()));
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.resolve("5", "100", Some("Irvine"), true).map(|r| r.apn()),
            Some("C")
        );
    }

    #[test]
    fn exact_lookup_has_no_fallback() {
        let index = LotTractIndex::build(vec![m("87", "13141", "Rancho Santa Margarita", "754-012-03")])
            .unwrap();
        assert_eq!(
            index.lookup_exact("87", "13141", Some("rancho santa margarita")),
            Some("754-012-03")
        );
        assert_eq!(index.lookup_exact("87", "13141", None), None);
    }

    #[test]
    fn blank_fields_are_malformed() {
        let err = LotTractIndex::build(vec![m("1", "2", "", "X"), m("3", " ", "Orange", "Y")])
            .unwrap_err();
        assert!(err.to_string().contains("tract_number"), "{err}");
    }

    #[test]
    fn unknown_pair() {
        let index = LotTractIndex::build(vec![m("1", "2", "Orange", "X")]).unwrap();
        assert_eq!(index.resolve("2", "1", Some("Orange"), true), None);
    }
}
