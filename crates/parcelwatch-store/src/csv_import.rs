//! CSV import for the watchlist and the lot/tract lookup.
//!
//! County and broker exports name their columns inconsistently, so each
//! target field is located through a list of accepted header spellings,
//! compared case-insensitively. The first header that matches wins.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use parcelwatch_core::legal::parse_legal_description;
use parcelwatch_core::{LotTractMapping, WatchlistEntry, format_apn, normalize};
use tracing::{debug, info};

use crate::StoreError;

// ── Header aliases ──

const ID: &[&str] = &["id", "watchlist_id"];
const APN: &[&str] = &[
    "apn",
    "parcel_apn",
    "parcel_number",
    "parcel number",
    "parcel",
    "parcel_id",
];
const ADDRESS: &[&str] = &[
    "address",
    "property_address",
    "situs_address",
    "situs_addr",
    "site_address",
];
const CITY: &[&str] = &["city", "situs_city", "property_city"];
const BUILDING_SF: &[&str] = &[
    "building_sf",
    "building sf",
    "building_sqft",
    "improvement_sf",
    "bldg_area",
    "bldg_sqft",
];
const ASSESSED_TOTAL: &[&str] = &["assessed_total", "total_value", "assessed_value"];
const LISTED: &[&str] = &["is_listed_for_sale", "listed_for_sale", "for_sale"];
const LISTING_PRICE: &[&str] = &["listing_price", "list_price", "asking_price"];
const LOT: &[&str] = &["lot_number", "lot", "lot_num"];
const TRACT: &[&str] = &["tract_number", "tract", "tract_num"];

fn find(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
}

fn missing(field: &'static str, aliases: &[&str], source: &str) -> StoreError {
    StoreError::MissingColumn {
        path: source.to_string(),
        field,
        tried: aliases.join(", "),
    }
}

fn require(
    headers: &StringRecord,
    field: &'static str,
    aliases: &[&str],
    source: &str,
) -> Result<usize, StoreError> {
    find(headers, aliases).ok_or_else(|| missing(field, aliases, source))
}

/// Trimmed, non-empty cell.
fn cell(record: &StringRecord, col: Option<usize>) -> Option<&str> {
    col.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Lenient number parse: `$1,250,000` → 1250000. Unparseable cells are dropped.
fn parse_number(value: &str) -> Option<f64> {
    value.replace(['$', ','], "").trim().parse().ok()
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "t" | "yes" | "y" | "1"
    )
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

// ── Watchlist ──

#[derive(Debug, Default)]
pub struct WatchlistImport {
    pub entries: Vec<WatchlistEntry>,
    /// Rows whose APN cell was blank or punctuation only.
    pub missing_apn: usize,
    /// Rows dropped because an earlier row had the same normalized APN.
    pub duplicates: usize,
}

/// Read watchlist rows. APNs are canonicalised with [`format_apn`]; rows
/// repeating an APN already seen are dropped, keeping the first.
pub fn read_watchlist_csv<R: Read>(input: R, source: &str) -> Result<WatchlistImport, StoreError> {
    let mut rdr = reader(input);
    let headers = rdr.headers()?.clone();
    let apn_col = require(&headers, "apn", APN, source)?;
    let id_col = find(&headers, ID);
    let address_col = find(&headers, ADDRESS);
    let city_col = find(&headers, CITY);
    let building_col = find(&headers, BUILDING_SF);
    let assessed_col = find(&headers, ASSESSED_TOTAL);
    let listed_col = find(&headers, LISTED);
    let price_col = find(&headers, LISTING_PRICE);
    debug!(?apn_col, ?address_col, ?city_col, "watchlist columns");

    let mut out = WatchlistImport::default();
    let mut seen = HashSet::new();
    for record in rdr.records() {
        let record = record?;
        let Some(raw) = cell(&record, Some(apn_col)).filter(|v| !normalize(v).is_empty()) else {
            out.missing_apn += 1;
            continue;
        };
        let apn = format_apn(raw);
        let key = normalize(&apn);
        if !seen.insert(key.clone()) {
            out.duplicates += 1;
            continue;
        }
        out.entries.push(WatchlistEntry {
            id: cell(&record, id_col).map_or_else(|| key.clone(), str::to_string),
            apn,
            apn_normalized: Some(key),
            address: cell(&record, address_col).map(str::to_string),
            city: cell(&record, city_col).map(str::to_string),
            building_sf: cell(&record, building_col).and_then(parse_number),
            assessed_total: cell(&record, assessed_col).and_then(parse_number),
            is_listed_for_sale: cell(&record, listed_col).is_some_and(parse_flag),
            listing_price: cell(&record, price_col).and_then(parse_number),
        });
    }
    info!(
        source,
        rows = out.entries.len(),
        missing_apn = out.missing_apn,
        duplicates = out.duplicates,
        "read watchlist csv"
    );
    Ok(out)
}

pub fn read_watchlist_file(path: &Path) -> Result<WatchlistImport, StoreError> {
    read_watchlist_csv(File::open(path)?, &path.display().to_string())
}

// ── Lot/tract ──

#[derive(Debug, Default)]
pub struct LotTractImport {
    pub mappings: Vec<LotTractMapping>,
    /// Mappings whose lot or tract came from the legal description.
    pub from_legal: usize,
    /// Rows without an APN, or without a lot and tract after parsing.
    pub skipped: usize,
}

/// Read lot/tract → APN rows.
///
/// When the lot or tract cell is blank (or the column is absent), any
/// column whose header contains `legal` is parsed as a legal description.
/// A file needs an APN column plus either both lot/tract columns or a legal
/// description column.
pub fn read_lot_tract_csv<R: Read>(input: R, source: &str) -> Result<LotTractImport, StoreError> {
    let mut rdr = reader(input);
    let headers = rdr.headers()?.clone();
    let apn_col = require(&headers, "apn", APN, source)?;
    let city_col = find(&headers, CITY);
    let legal_col = headers
        .iter()
        .position(|h| h.to_lowercase().contains("legal"));
    let (lot_col, tract_col) = match (find(&headers, LOT), find(&headers, TRACT), legal_col) {
        (lot @ Some(_), tract @ Some(_), _) => (lot, tract),
        (lot, tract, Some(_)) => (lot, tract),
        (None, _, None) => return Err(missing("lot_number", LOT, source)),
        (_, None, None) => return Err(missing("tract_number", TRACT, source)),
    };
    debug!(?apn_col, ?lot_col, ?tract_col, ?city_col, ?legal_col, "lot/tract columns");

    let mut out = LotTractImport::default();
    for record in rdr.records() {
        let record = record?;
        let Some(apn) = cell(&record, Some(apn_col)) else {
            out.skipped += 1;
            continue;
        };
        let mut lot = cell(&record, lot_col).map(str::to_string);
        let mut tract = cell(&record, tract_col).map(str::to_string);
        if lot.is_none() || tract.is_none() {
            if let Some(parsed) = cell(&record, legal_col).and_then(parse_legal_description) {
                lot = lot.or(Some(parsed.lot));
                tract = tract.or(Some(parsed.tract));
                out.from_legal += 1;
            }
        }
        let (Some(lot), Some(tract)) = (lot, tract) else {
            out.skipped += 1;
            continue;
        };
        out.mappings.push(LotTractMapping::new(
            lot,
            tract,
            cell(&record, city_col).unwrap_or_default(),
            format_apn(apn),
        ));
    }
    info!(
        source,
        rows = out.mappings.len(),
        from_legal = out.from_legal,
        skipped = out.skipped,
        "read lot/tract csv"
    );
    Ok(out)
}

pub fn read_lot_tract_file(path: &Path) -> Result<LotTractImport, StoreError> {
    read_lot_tract_csv(File::open(path)?, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watchlist(csv: &str) -> WatchlistImport {
        read_watchlist_csv(csv.as_bytes(), "test.csv").unwrap()
    }

    fn lot_tract(csv: &str) -> LotTractImport {
        read_lot_tract_csv(csv.as_bytes(), "test.csv").unwrap()
    }

    #[test]
    fn watchlist_aliases_and_formatting() {
        let out = watchlist(
            "Parcel Number,SITUS_ADDR,Situs_City,BLDG_AREA,Total_Value,listing_price\n\
             12345678,100 Industrial Way,Anaheim,\"52,000\",$4100000,\n",
        );
        assert_eq!(out.entries.len(), 1);
        let e = &out.entries[0];
        assert_eq!(e.apn, "123-456-78");
        assert_eq!(e.apn_normalized.as_deref(), Some("12345678"));
        assert_eq!(e.id, "12345678");
        assert_eq!(e.address.as_deref(), Some("100 Industrial Way"));
        assert_eq!(e.city.as_deref(), Some("Anaheim"));
        assert_eq!(e.building_sf, Some(52_000.0));
        assert_eq!(e.assessed_total, Some(4_100_000.0));
        assert_eq!(e.listing_price, None);
        assert!(!e.is_listed_for_sale);
    }

    #[test]
    fn watchlist_drops_blank_and_duplicate_apns() {
        let out = watchlist(
            "apn,address\n\
             123-456-78,first\n\
             ,nothing\n\
             --,nothing\n\
             123 456 78,second\n",
        );
        assert_eq!(out.entries.len(), 1);
        assert_eq!(out.entries[0].address.as_deref(), Some("first"));
        assert_eq!(out.missing_apn, 2);
        assert_eq!(out.duplicates, 1);
    }

    #[test]
    fn watchlist_listed_flag() {
        let out = watchlist("apn,for_sale\nA1,Yes\nA2,no\n");
        assert!(out.entries[0].is_listed_for_sale);
        assert!(!out.entries[1].is_listed_for_sale);
    }

    #[test]
    fn watchlist_requires_apn_column() {
        let err = read_watchlist_csv("address,city\n1 A St,Orange\n".as_bytes(), "w.csv").unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn { field: "apn", .. }));
    }

    #[test]
    fn lot_tract_aliases() {
        let out = lot_tract("LOT,Tract_Num,CITY,parcel_number\n87,13141,Rancho Santa Margarita,75401203\n");
        assert_eq!(
            out.mappings,
            vec![LotTractMapping::new("87", "13141", "Rancho Santa Margarita", "754-012-03")]
        );
    }

    #[test]
    fn lot_tract_from_legal_description() {
        let out = lot_tract(
            "apn,lot,tract,legal_description\n\
             111-111-11,,,LOT 4 OF TRACT NO 7128\n\
             222-222-22,9,,TR 500 LOT 9\n\
             333-333-33,,,PARCEL 1 OF PM 12\n",
        );
        assert_eq!(out.mappings.len(), 2);
        assert_eq!(out.mappings[0].lot_number, "4");
        assert_eq!(out.mappings[0].tract_number, "7128");
        assert_eq!(out.mappings[1].tract_number, "500");
        assert_eq!(out.from_legal, 2);
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn lot_tract_legal_only_file() {
        let out = lot_tract("APN,Legal\n12345678,LOT 2 TRACT 99\n");
        assert_eq!(out.mappings[0].city, "");
        assert_eq!(out.mappings[0].apn, "123-456-78");
    }

    #[test]
    fn lot_tract_needs_keys_or_legal() {
        let err = read_lot_tract_csv("apn,lot\n1,2\n".as_bytes(), "lt.csv").unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn { field: "tract_number", .. }));
    }
}
