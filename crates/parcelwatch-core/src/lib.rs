pub mod address;
pub mod address_index;
pub mod apn;
pub mod config;
pub mod error;
pub mod legal;
pub mod lot_tract;
pub mod matcher;
pub mod record;
pub mod similarity;
pub mod source;
pub mod watchlist;

pub use apn::{Apn, format_apn, normalize, normalize_opt};
pub use config::MatcherConfig;
pub use error::{CoreError, SourceError};
pub use lot_tract::{LotTractIndex, LotTractKey};
pub use matcher::{MappingOutcome, MatchMethod, MatchResult, Matcher};
pub use record::{DeedLike, DeedRecord, LotTractMapping, WatchlistEntry};
pub use similarity::AddressMetric;
pub use source::{LotTractSource, MemorySource, WatchlistSource};
pub use watchlist::WatchlistIndex;
