//! Street-number/city buckets of watchlist addresses for fuzzy matching.

use std::collections::HashMap;

use tracing::info;

use crate::address::{city_key, normalize_address, street_number};
use crate::similarity::{AddressMetric, address_similarity};
use crate::watchlist::WatchlistIndex;

/// One indexed watchlist address.
#[derive(Debug, Clone)]
pub struct AddressCandidate {
    /// Normalized APN of the watchlist entry, the key into [`WatchlistIndex`].
    pub apn_key: String,
    pub address: String,
    pub normalized: String,
}

/// Best candidate found in a bucket.
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate<'a> {
    pub candidate: &'a AddressCandidate,
    pub score: f64,
}

/// Outcome of probing the index with a query address.
#[derive(Debug)]
pub enum AddressProbe<'a> {
    /// Query has no leading house number.
    NoStreetNumber,
    /// Nothing on the watchlist shares the house number and city.
    EmptyBucket { street_number: String },
    /// Highest-scoring candidate in the bucket.
    Best(ScoredCandidate<'a>),
}

#[derive(Debug, Default, Clone)]
pub struct AddressIndex {
    buckets: HashMap<(String, String), Vec<AddressCandidate>>,
}

impl AddressIndex {
    /// Index every watchlist entry that has an address with a house number.
    pub fn build(watchlist: &WatchlistIndex) -> Self {
        let mut buckets: HashMap<(String, String), Vec<AddressCandidate>> = HashMap::new();
        let mut skipped = 0usize;
        for (apn_key, entry) in watchlist.iter() {
            let Some(address) = entry.address.as_deref().filter(|a| !a.trim().is_empty()) else {
                continue;
            };
            let normalized = normalize_address(address);
            let Some(number) = street_number(&normalized) else {
                skipped += 1;
                continue;
            };
            let city = entry.city.as_deref().map(city_key).unwrap_or_default();
            buckets
                .entry((number.to_string(), city))
                .or_default()
                .push(AddressCandidate {
                    apn_key: apn_key.to_string(),
                    address: address.to_string(),
                    normalized,
                });
        }
        // Watchlist iteration order is arbitrary; sort so ties resolve the same way every build.
        for candidates in buckets.values_mut() {
            candidates.sort_by(|a, b| a.apn_key.cmp(&b.apn_key));
        }
        info!(
            buckets = buckets.len(),
            skipped_without_number = skipped,
            "built address index"
        );
        Self { buckets }
    }

    /// Find the best-scoring watchlist address for `address` in `city`.
    pub fn probe(&self, metric: AddressMetric, address: &str, city: &str) -> AddressProbe<'_> {
        let normalized = normalize_address(address);
        let Some(number) = street_number(&normalized) else {
            return AddressProbe::NoStreetNumber;
        };
        let key = (number.to_string(), city_key(city));
        let Some(candidates) = self.buckets.get(&key) else {
            return AddressProbe::EmptyBucket {
                street_number: key.0,
            };
        };

        let mut best: Option<ScoredCandidate<'_>> = None;
        for candidate in candidates {
            let score = address_similarity(metric, &normalized, &candidate.normalized);
            if best.is_none_or(|b| score > b.score) {
                best = Some(ScoredCandidate { candidate, score });
            }
        }
        match best {
            Some(best) => AddressProbe::Best(best),
            None => AddressProbe::EmptyBucket {
                street_number: key.0,
            },
        }
    }

    /// Number of `(street number, city)` buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::WatchlistEntry;

    fn entry(apn: &str, address: &str, city: &str) -> WatchlistEntry {
        WatchlistEntry {
            id: apn.into(),
            apn: apn.into(),
            address: Some(address.into()),
            city: Some(city.into()),
            ..Default::default()
        }
    }

    fn index(entries: Vec<WatchlistEntry>) -> AddressIndex {
        AddressIndex::build(&WatchlistIndex::build(entries).unwrap())
    }

    #[test]
    fn buckets_by_number_and_city() {
        let idx = index(vec![
            entry("1", "100 Main St", "Orange"),
            entry("2", "100 Oak Ave", "Orange"),
            entry("3", "100 Main St", "Anaheim"),
            entry("4", "Industrial Park", "Orange"),
        ]);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn picks_best_in_bucket() {
        let idx = index(vec![
            entry("1", "2911 N Orange Olive Rd", "Orange"),
            entry("2", "2911 E Chapman Ave", "Orange"),
        ]);
        match idx.probe(AddressMetric::Gestalt, "2911 North Orange Olive Road", "ORANGE") {
            AddressProbe::Best(best) => {
                assert_eq!(best.candidate.apn_key, "1");
                assert!((best.score - 1.0).abs() < 1e-9);
            }
            other => panic!("expected a candidate, got {other:?}"),
        }
    }

    #[test]
    fn city_mismatch_is_empty_bucket() {
        let idx = index(vec![entry("1", "100 Main St", "Orange")]);
        assert!(matches!(
            idx.probe(AddressMetric::Gestalt, "100 Oak Ave", "Anaheim"),
            AddressProbe::EmptyBucket { street_number } if street_number == "100"
        ));
    }

    #[test]
    fn query_without_number() {
        let idx = index(vec![entry("1", "100 Main St", "Orange")]);
        assert!(matches!(
            idx.probe(AddressMetric::Gestalt, "Main St", "Orange"),
            AddressProbe::NoStreetNumber
        ));
    }

    #[test]
    fn entries_without_address_are_skipped() {
        let mut bare = entry("1", "", "Orange");
        bare.address = None;
        let idx = index(vec![bare, entry("2", "  ", "Orange")]);
        assert!(idx.is_empty());
    }
}
