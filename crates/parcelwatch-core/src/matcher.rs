//! Multi-strategy deed → watchlist matcher.
//!
//! Strategies run in order of reliability and stop at the first hit:
//!
//! 1. **identifier**: the deed's APN, normalized, looked up directly (1.0)
//! 2. **secondary_key**: lot/tract (+ city) resolved to an APN (0.95)
//! 3. **address**: fuzzy street address within the same house number and
//!    city (the similarity score, which must clear the configured minimum)
//!
//! A strategy whose inputs are missing from the record is skipped, not
//! failed. Matching never returns an error: every outcome, including
//! below-threshold scores and unwatched parcels, is a [`MatchResult`] whose
//! note says what happened.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::address_index::{AddressIndex, AddressProbe};
use crate::apn::{Apn, normalize};
use crate::config::MatcherConfig;
use crate::error::{CoreError, SourceError};
use crate::lot_tract::{LotTractIndex, Resolution};
use crate::record::{DeedLike, LotTractMapping, WatchlistEntry};
use crate::source::{LotTractSource, WatchlistSource, fetch_all_lot_tract, fetch_all_watchlist};
use crate::watchlist::WatchlistIndex;

pub const IDENTIFIER_CONFIDENCE: f64 = 1.0;
pub const SECONDARY_KEY_CONFIDENCE: f64 = 0.95;

/// The strategy that produced (or was tried for) a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Identifier,
    SecondaryKey,
    Address,
}

impl MatchMethod {
    /// Evaluation order, most reliable first.
    pub const PRIORITY: [Self; 3] = [Self::Identifier, Self::SecondaryKey, Self::Address];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identifier => "identifier",
            Self::SecondaryKey => "secondary_key",
            Self::Address => "address",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of matching one deed record.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    pub watchlist_entry: Option<WatchlistEntry>,
    pub method: Option<MatchMethod>,
    pub confidence: f64,
    /// APN of the matched watchlist parcel.
    pub apn: Option<Apn>,
    pub note: String,
    /// Lot/tract resolved only after ignoring the city; route to manual review.
    pub review: bool,
    /// Strategies that had enough input to run, in the order they ran.
    pub attempted: Vec<MatchMethod>,
}

impl MatchResult {
    fn hit(method: MatchMethod, entry: &WatchlistEntry, confidence: f64, note: String) -> Self {
        Self {
            matched: true,
            watchlist_entry: Some(entry.clone()),
            method: Some(method),
            confidence,
            apn: Some(Apn::new(entry.apn.as_str())),
            note,
            review: false,
            attempted: Vec::new(),
        }
    }

    fn unmatched(note: String, attempted: Vec<MatchMethod>) -> Self {
        Self {
            matched: false,
            watchlist_entry: None,
            method: None,
            confidence: 0.0,
            apn: None,
            note,
            review: false,
            attempted,
        }
    }

    /// Method name, or `""` when nothing matched.
    pub fn method_str(&self) -> &'static str {
        self.method.map(|m| m.as_str()).unwrap_or("")
    }
}

/// Outcome of a single strategy.
enum Step {
    /// The record lacks the fields this strategy needs.
    Skipped,
    Miss(String),
    Hit(MatchResult),
}

/// Both halves of a lot/tract insert.
///
/// The in-memory insert always takes effect. Persistence is reported
/// separately so callers that need durability can retry it.
#[derive(Debug)]
pub struct MappingOutcome {
    pub mapping: LotTractMapping,
    /// APN previously stored under the same key, if any.
    pub previous: Option<String>,
    pub persisted: Result<(), SourceError>,
}

impl MappingOutcome {
    pub fn is_persisted(&self) -> bool {
        self.persisted.is_ok()
    }
}

/// Matches deed records against one watchlist snapshot.
///
/// The watchlist and address indexes are immutable after construction. The
/// lot/tract table sits behind a lock so [`add_mapping`](Self::add_mapping)
/// can extend it while other threads keep matching.
#[derive(Debug)]
pub struct Matcher {
    watchlist: WatchlistIndex,
    lot_tract: RwLock<LotTractIndex>,
    addresses: AddressIndex,
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(
        watchlist: WatchlistIndex,
        lot_tract: LotTractIndex,
        config: MatcherConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let addresses = AddressIndex::build(&watchlist);
        Ok(Self {
            watchlist,
            lot_tract: RwLock::new(lot_tract),
            addresses,
            config,
        })
    }

    /// Build every index from raw rows.
    pub fn from_rows<W, L>(watchlist: W, lot_tract: L, config: MatcherConfig) -> Result<Self, CoreError>
    where
        W: IntoIterator<Item = WatchlistEntry>,
        L: IntoIterator<Item = LotTractMapping>,
    {
        config.validate()?;
        Self::new(
            WatchlistIndex::build(watchlist)?,
            LotTractIndex::build(lot_tract)?,
            config,
        )
    }

    /// Page through both sources and build the indexes.
    ///
    /// Any source or row error is fatal: a matcher is never handed out with a
    /// partially loaded watchlist.
    pub async fn load<W, L>(watchlist: &W, lot_tract: &L, config: MatcherConfig) -> Result<Self, CoreError>
    where
        W: WatchlistSource + ?Sized,
        L: LotTractSource + ?Sized,
    {
        config.validate()?;
        let watch_rows = fetch_all_watchlist(watchlist, config.page_size)
            .await
            .map_err(|source| CoreError::Source {
                table: "apn_watchlist",
                source,
            })?;
        info!(rows = watch_rows.len(), "loaded watchlist rows");
        let lt_rows = fetch_all_lot_tract(lot_tract, config.page_size)
            .await
            .map_err(|source| CoreError::Source {
                table: "lot_tract_apn_lookup",
                source,
            })?;
        info!(rows = lt_rows.len(), "loaded lot/tract rows");
        Self::from_rows(watch_rows, lt_rows, config)
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn watchlist(&self) -> &WatchlistIndex {
        &self.watchlist
    }

    pub fn lot_tract_len(&self) -> usize {
        self.read_lot_tract().len()
    }

    fn read_lot_tract(&self) -> std::sync::RwLockReadGuard<'_, LotTractIndex> {
        self.lot_tract.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Match one deed record, trying each strategy in priority order.
    pub fn match_record<R>(&self, record: &R) -> MatchResult
    where
        R: DeedLike + ?Sized,
    {
        let mut attempted = Vec::new();
        let mut misses = Vec::new();

        for method in MatchMethod::PRIORITY {
            let step = match method {
                MatchMethod::Identifier => self.try_identifier(record),
                MatchMethod::SecondaryKey => self.try_secondary_key(record),
                MatchMethod::Address => self.try_address(record),
            };
            match step {
                Step::Skipped => continue,
                Step::Miss(note) => {
                    debug!(method = %method, note = %note, "strategy missed");
                    attempted.push(method);
                    misses.push(format!("{method}: {note}"));
                }
                Step::Hit(mut result) => {
                    attempted.push(method);
                    result.attempted = attempted;
                    info!(
                        method = %method,
                        confidence = result.confidence,
                        apn = result.apn.as_ref().map(Apn::display).unwrap_or_default(),
                        review = result.review,
                        "matched deed to watchlist"
                    );
                    return result;
                }
            }
        }

        if attempted.is_empty() {
            if record.address().is_none() {
                if let (Some(city), Some(price)) =
                    (record.city(), record.estimated_sale_price(self.config.dtt_rate))
                {
                    info!(city, estimated_price = price, "sale with no address or parcel keys, needs manual review");
                }
            }
            return MatchResult::unmatched(
                "No applicable matching strategy: record has no APN, lot/tract, or address with city".into(),
                attempted,
            );
        }
        MatchResult::unmatched(
            format!("No matching strategy succeeded ({})", misses.join("; ")),
            attempted,
        )
    }

    fn try_identifier<R: DeedLike + ?Sized>(&self, record: &R) -> Step {
        let Some(apn) = record.apn() else {
            return Step::Skipped;
        };
        let key = normalize(apn);
        if key.is_empty() {
            return Step::Skipped;
        }
        match self.watchlist.get_normalized(&key) {
            Some(entry) => Step::Hit(MatchResult::hit(
                MatchMethod::Identifier,
                entry,
                IDENTIFIER_CONFIDENCE,
                "Direct APN match".into(),
            )),
            None => Step::Miss(format!("APN {apn} not on watchlist")),
        }
    }

    fn try_secondary_key<R: DeedLike + ?Sized>(&self, record: &R) -> Step {
        let (Some(lot), Some(tract)) = (record.lot_number(), record.tract_number()) else {
            return Step::Skipped;
        };
        let city = record.city();
        let table = self.read_lot_tract();
        if table.is_empty() {
            return Step::Miss("Lot/Tract lookup not available".into());
        }

        let Some(resolution) = table.resolve(lot, tract, city, self.config.lot_tract_city_fallback)
        else {
            return Step::Miss(format!("No APN found for Lot {lot}, Tract {tract}"));
        };
        let apn = resolution.apn();
        let Some(entry) = self.watchlist.get(apn) else {
            return Step::Miss(format!(
                "APN {apn} from Lot {lot}, Tract {tract} not on watchlist"
            ));
        };

        let mut result = match resolution {
            Resolution::Exact(_) => MatchResult::hit(
                MatchMethod::SecondaryKey,
                entry,
                SECONDARY_KEY_CONFIDENCE,
                format!("Matched via Lot {lot}, Tract {tract}"),
            ),
            Resolution::CityIgnored { city: filed, .. } => MatchResult::hit(
                MatchMethod::SecondaryKey,
                entry,
                SECONDARY_KEY_CONFIDENCE,
                format!(
                    "Matched via Lot {lot}, Tract {tract} ignoring city (deed city '{}', mapping filed under '{filed}'); needs review",
                    city.unwrap_or_default()
                ),
            ),
        };
        result.review = matches!(resolution, Resolution::CityIgnored { .. });
        Step::Hit(result)
    }

    fn try_address<R: DeedLike + ?Sized>(&self, record: &R) -> Step {
        let (Some(address), Some(city)) = (record.address(), record.city()) else {
            return Step::Skipped;
        };
        let threshold = self.config.min_address_confidence;

        match self.addresses.probe(self.config.address_metric, address, city) {
            AddressProbe::NoStreetNumber => {
                Step::Miss("Could not extract street number from address".into())
            }
            AddressProbe::EmptyBucket { street_number } => Step::Miss(format!(
                "No watchlist addresses at {street_number} in {city}"
            )),
            AddressProbe::Best(best) if best.score >= threshold => {
                match self.watchlist.get_normalized(&best.candidate.apn_key) {
                    Some(entry) => Step::Hit(MatchResult::hit(
                        MatchMethod::Address,
                        entry,
                        best.score,
                        format!(
                            "Address match: '{address}' ~ '{}' ({:.1}%)",
                            best.candidate.address,
                            best.score * 100.0
                        ),
                    )),
                    // The address index is built from the same snapshot, so this is unreachable
                    // unless the two were constructed inconsistently.
                    None => Step::Miss(format!(
                        "Address candidate '{}' missing from watchlist",
                        best.candidate.address
                    )),
                }
            }
            AddressProbe::Best(best) => Step::Miss(format!(
                "Best address match '{}' score {:.1}% below threshold {:.1}%",
                best.candidate.address,
                best.score * 100.0,
                threshold * 100.0
            )),
        }
    }

    /// Exact lot/tract/city lookup, no city fallback.
    pub fn lookup_apn_by_lot_tract(&self, lot: &str, tract: &str, city: Option<&str>) -> Option<String> {
        self.read_lot_tract()
            .lookup_exact(lot, tract, city)
            .map(str::to_string)
    }

    /// Upsert a mapping into the in-memory table only.
    pub fn insert_mapping(&self, mapping: LotTractMapping) -> Option<String> {
        self.lot_tract
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(mapping)
    }

    /// Learn a new lot/tract mapping: insert it in memory, then persist it.
    ///
    /// The in-memory insert is visible to matching before persistence is
    /// attempted and stays in place if persistence fails. A mapping with a
    /// blank lot, tract or APN is rejected before either write.
    pub async fn add_mapping<S>(&self, sink: &S, mapping: LotTractMapping) -> Result<MappingOutcome, CoreError>
    where
        S: LotTractSource + ?Sized,
    {
        if let Some(field) = mapping.blank_field() {
            return Err(CoreError::InvalidMapping(field));
        }
        let previous = self.insert_mapping(mapping.clone());
        let persisted = sink.upsert_lot_tract(&mapping).await;
        match &persisted {
            Ok(()) => info!(
                lot = %mapping.lot_number,
                tract = %mapping.tract_number,
                city = %mapping.city,
                apn = %mapping.apn,
                "saved lot/tract mapping"
            ),
            Err(e) => warn!(
                lot = %mapping.lot_number,
                tract = %mapping.tract_number,
                error = %e,
                "lot/tract mapping kept in memory but not persisted"
            ),
        }
        Ok(MappingOutcome {
            mapping,
            previous,
            persisted,
        })
    }
}
