use thiserror::Error;

/// Failure reported by a watchlist or lot/tract source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("malformed row from source: {0}")]
    Malformed(String),

    #[error("write rejected: {0}")]
    WriteRejected(String),

    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised while building a [`Matcher`](crate::Matcher) or teaching it a mapping.
///
/// Matching itself never fails; every miss is a [`MatchResult`](crate::MatchResult).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid matcher config: {0}")]
    InvalidConfig(String),

    #[error("malformed {table} row {row}: {reason}")]
    MalformedRow {
        table: &'static str,
        row: usize,
        reason: String,
    },

    #[error("invalid lot/tract mapping: blank {0}")]
    InvalidMapping(&'static str),

    #[error("loading {table}: {source}")]
    Source {
        table: &'static str,
        #[source]
        source: SourceError,
    },
}
