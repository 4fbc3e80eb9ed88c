//! Paged data sources feeding the matcher.
//!
//! Implementations live next to their backend (`parcelwatch-store` for
//! DuckDB, `parcelwatch-sync` for the hosted REST database). [`MemorySource`]
//! is the in-process implementation used for fixtures and offline runs.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::SourceError;
use crate::record::{LotTractMapping, WatchlistEntry};

#[async_trait]
pub trait WatchlistSource: Send + Sync {
    /// Rows `offset..offset + limit`. A page shorter than `limit` is the last one.
    async fn fetch_watchlist_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<WatchlistEntry>, SourceError>;
}

#[async_trait]
pub trait LotTractSource: Send + Sync {
    /// Rows `offset..offset + limit`. A page shorter than `limit` is the last one.
    async fn fetch_lot_tract_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LotTractMapping>, SourceError>;

    /// Insert or replace the mapping keyed by `(lot_number, tract_number, city)`.
    async fn upsert_lot_tract(&self, mapping: &LotTractMapping) -> Result<(), SourceError>;
}

/// Drain every watchlist page.
pub async fn fetch_all_watchlist<S>(
    source: &S,
    page_size: usize,
) -> Result<Vec<WatchlistEntry>, SourceError>
where
    S: WatchlistSource + ?Sized,
{
    let mut rows = Vec::new();
    loop {
        let page = source.fetch_watchlist_page(rows.len(), page_size).await?;
        let short = page.len() < page_size;
        debug!(offset = rows.len(), count = page.len(), "fetched watchlist page");
        rows.extend(page);
        if short {
            return Ok(rows);
        }
    }
}

/// Drain every lot/tract page.
pub async fn fetch_all_lot_tract<S>(
    source: &S,
    page_size: usize,
) -> Result<Vec<LotTractMapping>, SourceError>
where
    S: LotTractSource + ?Sized,
{
    let mut rows = Vec::new();
    loop {
        let page = source.fetch_lot_tract_page(rows.len(), page_size).await?;
        let short = page.len() < page_size;
        debug!(offset = rows.len(), count = page.len(), "fetched lot/tract page");
        rows.extend(page);
        if short {
            return Ok(rows);
        }
    }
}

/// In-memory source for both tables.
///
/// Upserts follow the reference table's semantics: a row with the same
/// `(lot, tract, city)` (city compared case-insensitively) is replaced.
#[derive(Debug, Default)]
pub struct MemorySource {
    watchlist: Vec<WatchlistEntry>,
    lot_tract: Mutex<Vec<LotTractMapping>>,
    reject_writes: bool,
}

impl MemorySource {
    pub fn new(watchlist: Vec<WatchlistEntry>, lot_tract: Vec<LotTractMapping>) -> Self {
        Self {
            watchlist,
            lot_tract: Mutex::new(lot_tract),
            reject_writes: false,
        }
    }

    /// Make every upsert fail, as a read-only replica would.
    pub fn read_only(mut self) -> Self {
        self.reject_writes = true;
        self
    }

    /// Snapshot of the lot/tract rows, including upserts.
    pub fn lot_tract_rows(&self) -> Vec<LotTractMapping> {
        self.lot_tract
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn page<T: Clone>(rows: &[T], offset: usize, limit: usize) -> Vec<T> {
    rows.iter().skip(offset).take(limit).cloned().collect()
}

#[async_trait]
impl WatchlistSource for MemorySource {
    async fn fetch_watchlist_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<WatchlistEntry>, SourceError> {
        Ok(page(&self.watchlist, offset, limit))
    }
}

#[async_trait]
impl LotTractSource for MemorySource {
    async fn fetch_lot_tract_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LotTractMapping>, SourceError> {
        let rows = self.lot_tract.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(page(&rows, offset, limit))
    }

    async fn upsert_lot_tract(&self, mapping: &LotTractMapping) -> Result<(), SourceError> {
        if self.reject_writes {
            return Err(SourceError::WriteRejected(
                "lot_tract_apn_lookup is read-only".into(),
            ));
        }
        let mut rows = self.lot_tract.lock().unwrap_or_else(PoisonError::into_inner);
        let same_key = |r: &LotTractMapping| {
            r.lot_number == mapping.lot_number
                && r.tract_number == mapping.tract_number
                && r.city.eq_ignore_ascii_case(&mapping.city)
        };
        match rows.iter_mut().find(|r| same_key(r)) {
            Some(existing) => *existing = mapping.clone(),
            None => rows.push(mapping.clone()),
        }
        Ok(())
    }
}
