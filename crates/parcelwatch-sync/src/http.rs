//! REST client for the hosted watchlist database (PostgREST conventions).

use async_trait::async_trait;
use parcelwatch_core::{LotTractMapping, LotTractSource, SourceError, WatchlistEntry, WatchlistSource};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

const WATCHLIST_TABLE: &str = "apn_watchlist";
const WATCHLIST_COLUMNS: &str =
    "id,apn,apn_normalized,address,city,building_sf,assessed_total,is_listed_for_sale,listing_price";
const LOT_TRACT_TABLE: &str = "lot_tract_apn_lookup";
const LOT_TRACT_COLUMNS: &str = "lot_number,tract_number,city,apn";
const LOT_TRACT_CONFLICT: &str = "lot_number,tract_number,city";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SyncError> for SourceError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Json(e) => SourceError::Malformed(e.to_string()),
            other => SourceError::Unavailable(other.to_string()),
        }
    }
}

/// A 4xx on a write means the server refused the row, not that it is down.
fn write_error(e: SyncError) -> SourceError {
    match e {
        SyncError::Server { status, body } if (400..500).contains(&status) => {
            SourceError::WriteRejected(format!("{status}: {body}"))
        }
        other => other.into(),
    }
}

/// Client for the hosted `apn_watchlist` and `lot_tract_apn_lookup` tables.
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestClient {
    /// `base_url` is the project root, e.g. `https://abc.supabase.co`.
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn page_url(&self, table: &str, columns: &str, offset: usize, limit: usize) -> String {
        format!(
            "{}?select={columns}&order=id&offset={offset}&limit={limit}",
            self.table_url(table)
        )
    }

    fn upsert_url(&self) -> String {
        format!("{}?on_conflict={LOT_TRACT_CONFLICT}", self.table_url(LOT_TRACT_TABLE))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        table: &str,
        columns: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<T>, SyncError> {
        let url = self.page_url(table, columns, offset, limit);
        debug!(url = %url, "fetching page");
        let resp = Self::check(self.authed(self.client.get(&url)).send().await?).await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn watchlist_page(&self, offset: usize, limit: usize) -> Result<Vec<WatchlistEntry>, SyncError> {
        self.get_page(WATCHLIST_TABLE, WATCHLIST_COLUMNS, offset, limit).await
    }

    pub async fn lot_tract_page(&self, offset: usize, limit: usize) -> Result<Vec<LotTractMapping>, SyncError> {
        self.get_page(LOT_TRACT_TABLE, LOT_TRACT_COLUMNS, offset, limit).await
    }

    /// Upsert one mapping on `(lot_number, tract_number, city)`.
    pub async fn upsert_mapping(&self, mapping: &LotTractMapping) -> Result<(), SyncError> {
        let url = self.upsert_url();
        let req = self
            .client
            .post(&url)
            .header("Prefer", "resolution=merge-duplicates")
            .json(&[mapping]);
        Self::check(self.authed(req).send().await?).await?;
        info!(
            lot = %mapping.lot_number,
            tract = %mapping.tract_number,
            city = %mapping.city,
            "upserted lot/tract mapping"
        );
        Ok(())
    }
}

#[async_trait]
impl WatchlistSource for RestClient {
    async fn fetch_watchlist_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<WatchlistEntry>, SourceError> {
        Ok(self.watchlist_page(offset, limit).await?)
    }
}

#[async_trait]
impl LotTractSource for RestClient {
    async fn fetch_lot_tract_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LotTractMapping>, SourceError> {
        Ok(self.lot_tract_page(offset, limit).await?)
    }

    async fn upsert_lot_tract(&self, mapping: &LotTractMapping) -> Result<(), SourceError> {
        self.upsert_mapping(mapping).await.map_err(write_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RestClient {
        RestClient::new("https://abc.example.co/".into(), "anon".into())
    }

    #[test]
    fn rest_client_trims_trailing_slash() {
        assert_eq!(client().base_url, "https://abc.example.co");
    }

    #[test]
    fn page_url() {
        assert_eq!(
            client().page_url(LOT_TRACT_TABLE, LOT_TRACT_COLUMNS, 2000, 1000),
            "https://abc.example.co/rest/v1/lot_tract_apn_lookup\
             ?select=lot_number,tract_number,city,apn&order=id&offset=2000&limit=1000"
        );
    }

    #[test]
    fn upsert_url_names_conflict_columns() {
        assert_eq!(
            client().upsert_url(),
            "https://abc.example.co/rest/v1/lot_tract_apn_lookup?on_conflict=lot_number,tract_number,city"
        );
    }

    #[test]
    fn watchlist_rows_with_nulls() {
        let json = r#"[{
            "id": 42,
            "apn": "123-456-78",
            "apn_normalized": "12345678",
            "address": "100 Industrial Way",
            "city": "Anaheim",
            "building_sf": 52000,
            "assessed_total": null,
            "is_listed_for_sale": null,
            "listing_price": null
        }]"#;
        let rows: Vec<WatchlistEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].id, "42");
        assert_eq!(rows[0].apn, "123-456-78");
        assert_eq!(rows[0].building_sf, Some(52_000.0));
        assert!(!rows[0].is_listed_for_sale);
    }

    #[test]
    fn lot_tract_rows_ignore_extra_columns() {
        let json = r#"[{"id": 7, "lot_number": "87", "tract_number": "13141",
                        "city": "Rancho Santa Margarita", "apn": "754-012-03", "source": "csv"}]"#;
        let rows: Vec<LotTractMapping> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0], LotTractMapping::new("87", "13141", "Rancho Santa Margarita", "754-012-03"));
    }

    #[test]
    fn server_errors_map_to_source_errors() {
        let rejected = write_error(SyncError::Server {
            status: 409,
            body: "conflict".into(),
        });
        assert!(matches!(rejected, SourceError::WriteRejected(_)));

        let down = write_error(SyncError::Server {
            status: 503,
            body: String::new(),
        });
        assert!(matches!(down, SourceError::Unavailable(_)));

        let read: SourceError = SyncError::Server {
            status: 404,
            body: "relation does not exist".into(),
        }
        .into();
        assert!(matches!(read, SourceError::Unavailable(_)));
    }
}
