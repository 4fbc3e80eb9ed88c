//! In-memory snapshot of the parcel watchlist keyed by normalized APN.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::apn::normalize;
use crate::error::CoreError;
use crate::record::WatchlistEntry;

/// Point-in-time watchlist snapshot.
///
/// Rebuilt wholesale; there is no incremental update path. Callers that need
/// fresher data construct a new index on their own refresh cadence.
#[derive(Debug, Default, Clone)]
pub struct WatchlistIndex {
    entries: HashMap<String, WatchlistEntry>,
}

/// Comparison key for a row: the explicit pre-normalized field when present,
/// otherwise computed from the display APN.
pub fn entry_key(entry: &WatchlistEntry) -> String {
    match entry.apn_normalized.as_deref().map(normalize) {
        Some(key) if !key.is_empty() => key,
        _ => normalize(&entry.apn),
    }
}

impl WatchlistIndex {
    /// Build from every watchlist row.
    ///
    /// Two rows that normalise to the same key: the later one wins. Upstream
    /// APNs are expected to be unique, so this is logged rather than rejected.
    pub fn build<I>(rows: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = WatchlistEntry>,
    {
        let mut entries = HashMap::new();
        let mut collisions = 0usize;
        for (row, entry) in rows.into_iter().enumerate() {
            let key = entry_key(&entry);
            if key.is_empty() {
                return Err(CoreError::MalformedRow {
                    table: "apn_watchlist",
                    row,
                    reason: format!("no usable APN (id '{}')", entry.id),
                });
            }
            if let Some(prev) = entries.insert(key.clone(), entry) {
                collisions += 1;
                debug!(key = %key, replaced = %prev.apn, "watchlist key collision, keeping later row");
            }
        }
        info!(parcels = entries.len(), collisions, "built watchlist index");
        Ok(Self { entries })
    }

    /// Look up by any spelling of the APN.
    pub fn get(&self, apn: &str) -> Option<&WatchlistEntry> {
        self.get_normalized(&normalize(apn))
    }

    /// Look up by an already-normalized key.
    pub fn get_normalized(&self, key: &str) -> Option<&WatchlistEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(normalized key, entry)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WatchlistEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, apn: &str) -> WatchlistEntry {
        WatchlistEntry {
            id: id.into(),
            apn: apn.into(),
            ..Default::default()
        }
    }

    #[test]
    fn lookup_ignores_punctuation() {
        let index = WatchlistIndex::build(vec![row("w1", "123-456-78")]).unwrap();
        assert_eq!(index.get("123 456 78").map(|e| e.id.as_str()), Some("w1"));
        assert_eq!(index.get("12345678").map(|e| e.id.as_str()), Some("w1"));
        assert!(index.get("123-456-79").is_none());
    }

    #[test]
    fn explicit_normalized_key_wins() {
        let mut entry = row("w1", "n/a");
        entry.apn_normalized = Some("75401203".into());
        let index = WatchlistIndex::build(vec![entry]).unwrap();
        assert!(index.get("754-012-03").is_some());
        assert!(index.get_normalized("na").is_none());
    }

    #[test]
    fn blank_normalized_key_falls_back_to_apn() {
        let mut entry = row("w1", "754-012-03");
        entry.apn_normalized = Some(String::new());
        assert_eq!(entry_key(&entry), "75401203");
    }

    #[test]
    fn collision_keeps_last_row() {
        let index =
            WatchlistIndex::build(vec![row("first", "123-456-78"), row("second", "12345678")])
                .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("12345678").unwrap().id, "second");
    }

    #[test]
    fn row_without_apn_is_rejected() {
        let err = WatchlistIndex::build(vec![row("ok", "1-2"), row("bad", " - ")]).unwrap_err();
        match err {
            CoreError::MalformedRow { row, .. } => assert_eq!(row, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_watchlist_is_valid() {
        let index = WatchlistIndex::build(Vec::new()).unwrap();
        assert!(index.is_empty());
    }
}
