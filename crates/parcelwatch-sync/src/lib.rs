//! Remote access to the hosted `apn_watchlist` and `lot_tract_apn_lookup` tables.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{RestClient, SyncError};
