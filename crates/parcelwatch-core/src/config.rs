//! Matcher tuning knobs.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::record::DEFAULT_DTT_RATE;
use crate::similarity::AddressMetric;

/// Minimum address score accepted as a match.
pub const DEFAULT_MIN_ADDRESS_CONFIDENCE: f64 = 0.85;
/// Rows requested per page from a paged source.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatcherConfig {
    /// Address matches scoring below this are reported as misses.
    pub min_address_confidence: f64,
    /// Retry a lot/tract miss ignoring the city. Raises recall at the cost of
    /// possible cross-city false positives; such matches are flagged for review.
    pub lot_tract_city_fallback: bool,
    pub address_metric: AddressMetric,
    pub page_size: usize,
    /// Transfer tax per $1000, used to estimate sale prices.
    pub dtt_rate: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_address_confidence: DEFAULT_MIN_ADDRESS_CONFIDENCE,
            lot_tract_city_fallback: true,
            address_metric: AddressMetric::default(),
            page_size: DEFAULT_PAGE_SIZE,
            dtt_rate: DEFAULT_DTT_RATE,
        }
    }
}

impl MatcherConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&self.min_address_confidence) {
            return Err(CoreError::InvalidConfig(format!(
                "min_address_confidence must be within [0, 1], got {}",
                self.min_address_confidence
            )));
        }
        if self.page_size == 0 {
            return Err(CoreError::InvalidConfig("page_size must be positive".into()));
        }
        if !(self.dtt_rate.is_finite() && self.dtt_rate > 0.0) {
            return Err(CoreError::InvalidConfig(format!(
                "dtt_rate must be positive, got {}",
                self.dtt_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MatcherConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_address_confidence, 0.85);
        assert!(config.lot_tract_city_fallback);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            MatcherConfig::from_json(r#"{"lot_tract_city_fallback": false, "address_metric": "levenshtein"}"#)
                .unwrap();
        assert!(!config.lot_tract_city_fallback);
        assert_eq!(config.address_metric, AddressMetric::Levenshtein);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn threshold_out_of_range() {
        let err = MatcherConfig::from_json(r#"{"min_address_confidence": 1.5}"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(MatcherConfig::from_json(r#"{"min_confidence": 0.9}"#).is_err());
    }

    #[test]
    fn zero_page_size_rejected() {
        let config = MatcherConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
