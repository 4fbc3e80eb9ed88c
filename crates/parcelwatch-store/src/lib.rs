//! Reference storage: DuckDB tables for the watchlist and lot/tract lookup,
//! plus CSV import into either.

pub mod csv_import;
mod error;
pub use error::StoreError;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::DuckStore;
