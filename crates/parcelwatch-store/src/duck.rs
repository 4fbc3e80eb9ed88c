//! DuckDB reference store for the watchlist and the lot/tract lookup.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use duckdb::{Connection, params};
use parcelwatch_core::address::city_key;
use parcelwatch_core::watchlist::entry_key;
use parcelwatch_core::{LotTractMapping, LotTractSource, SourceError, WatchlistEntry, WatchlistSource};
use tracing::info;

use crate::StoreError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS apn_watchlist (
        apn_normalized VARCHAR PRIMARY KEY,
        id VARCHAR NOT NULL,
        apn VARCHAR NOT NULL,
        address VARCHAR,
        city VARCHAR,
        building_sf DOUBLE,
        assessed_total DOUBLE,
        is_listed_for_sale BOOLEAN NOT NULL DEFAULT false,
        listing_price DOUBLE
    );
    CREATE SEQUENCE IF NOT EXISTS lot_tract_seq;
    CREATE TABLE IF NOT EXISTS lot_tract_apn_lookup (
        seq BIGINT NOT NULL DEFAULT nextval('lot_tract_seq'),
        lot_number VARCHAR NOT NULL,
        tract_number VARCHAR NOT NULL,
        city VARCHAR NOT NULL DEFAULT '',
        city_key VARCHAR NOT NULL DEFAULT '',
        apn VARCHAR NOT NULL,
        PRIMARY KEY (lot_number, tract_number, city_key)
    );
";

const UPSERT_WATCHLIST: &str = "
    INSERT OR REPLACE INTO apn_watchlist
        (apn_normalized, id, apn, address, city, building_sf, assessed_total, is_listed_for_sale, listing_price)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)";

// Keyed on the same lowercased city as the in-memory index. `seq` is left
// alone on conflict so a replaced mapping keeps its original position.
const UPSERT_LOT_TRACT: &str = "
    INSERT INTO lot_tract_apn_lookup (lot_number, tract_number, city, city_key, apn)
    VALUES (?, ?, ?, ?, ?)
    ON CONFLICT (lot_number, tract_number, city_key)
    DO UPDATE SET apn = excluded.apn, city = excluded.city";

/// DuckDB store holding `apn_watchlist` and `lot_tract_apn_lookup`.
///
/// In-memory ([`open`](Self::open)) for tests and one-shot runs, file-backed
/// ([`open_persistent`](Self::open_persistent)) for a reference database
/// that survives restarts. The connection sits behind a mutex so the store
/// can serve as a `Send + Sync` source.
pub struct DuckStore {
    conn: Mutex<Connection>,
}

impl DuckStore {
    /// Open an in-memory database with both tables created.
    pub fn open() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open or create a database file. Existing tables and rows are kept.
    pub fn open_persistent(path: &Path) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when both tables hold at least one row.
    pub fn has_tables(&self) -> bool {
        matches!(self.watchlist_count(), Ok(n) if n > 0)
            && matches!(self.lot_tract_count(), Ok(n) if n > 0)
    }

    // ── Writes ──

    /// Insert or replace watchlist rows keyed by normalized APN.
    pub fn insert_watchlist(&self, entries: &[WatchlistEntry]) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_WATCHLIST)?;
            for e in entries {
                let key = entry_key(e);
                if key.is_empty() {
                    return Err(StoreError::Other(format!(
                        "watchlist row '{}' has no usable APN",
                        e.id
                    )));
                }
                let id = if e.id.is_empty() { key.clone() } else { e.id.clone() };
                stmt.execute(params![
                    key,
                    id,
                    e.apn,
                    e.address,
                    e.city,
                    e.building_sf,
                    e.assessed_total,
                    e.is_listed_for_sale,
                    e.listing_price,
                ])?;
            }
        }
        tx.commit()?;
        info!(count = entries.len(), "upserted watchlist rows");
        Ok(entries.len())
    }

    /// Upsert lot/tract rows on `(lot_number, tract_number, city)`, city compared
    /// trimmed and case-insensitively. The latest spelling of the city is kept.
    pub fn insert_lot_tract(&self, mappings: &[LotTractMapping]) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_LOT_TRACT)?;
            for m in mappings {
                stmt.execute(params![
                    m.lot_number.trim(),
                    m.tract_number.trim(),
                    m.city.trim(),
                    city_key(&m.city),
                    m.apn.trim(),
                ])?;
            }
        }
        tx.commit()?;
        info!(count = mappings.len(), "upserted lot/tract rows");
        Ok(mappings.len())
    }

    // ── Counts ──

    /// Rows in `apn_watchlist`.
    pub fn watchlist_count(&self) -> Result<usize, StoreError> {
        self.count_table("apn_watchlist")
    }

    /// Rows in `lot_tract_apn_lookup`.
    pub fn lot_tract_count(&self) -> Result<usize, StoreError> {
        self.count_table("lot_tract_apn_lookup")
    }

    fn count_table(&self, table: &str) -> Result<usize, StoreError> {
        let sql = format!("SELECT count(*)::BIGINT FROM {table}");
        let count: i64 = self.conn().query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ── Paged reads ──

    /// Watchlist rows ordered by normalized APN.
    pub fn watchlist_page(&self, offset: usize, limit: usize) -> Result<Vec<WatchlistEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, apn, apn_normalized, address, city, building_sf, assessed_total,
                    is_listed_for_sale, listing_price
             FROM apn_watchlist
             ORDER BY apn_normalized
             LIMIT ? OFFSET ?",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
            Ok(WatchlistEntry {
                id: row.get(0)?,
                apn: row.get(1)?,
                apn_normalized: row.get(2)?,
                address: row.get(3)?,
                city: row.get(4)?,
                building_sf: row.get(5)?,
                assessed_total: row.get(6)?,
                is_listed_for_sale: row.get(7)?,
                listing_price: row.get(8)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Lot/tract rows in first-insertion order.
    pub fn lot_tract_page(&self, offset: usize, limit: usize) -> Result<Vec<LotTractMapping>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT lot_number, tract_number, city, apn
             FROM lot_tract_apn_lookup
             ORDER BY seq
             LIMIT ? OFFSET ?",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
            Ok(LotTractMapping {
                lot_number: row.get(0)?,
                tract_number: row.get(1)?,
                city: row.get(2)?,
                apn: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl WatchlistSource for DuckStore {
    async fn fetch_watchlist_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<WatchlistEntry>, SourceError> {
        Ok(self.watchlist_page(offset, limit)?)
    }
}

#[async_trait]
impl LotTractSource for DuckStore {
    async fn fetch_lot_tract_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LotTractMapping>, SourceError> {
        Ok(self.lot_tract_page(offset, limit)?)
    }

    async fn upsert_lot_tract(&self, mapping: &LotTractMapping) -> Result<(), SourceError> {
        self.insert_lot_tract(std::slice::from_ref(mapping))?;
        Ok(())
    }
}
