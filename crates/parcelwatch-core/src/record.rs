//! Row types shared between the matcher, the reference store and the REST client.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// California county documentary transfer tax, dollars per $1000 of consideration.
pub const DEFAULT_DTT_RATE: f64 = 1.10;

/// A monitored parcel (`apn_watchlist` row).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    /// Row id. Hosted tables use a serial integer, CSV imports a text key.
    #[serde(default, deserialize_with = "text_or_integer")]
    pub id: String,
    pub apn: String,
    /// Pre-computed comparison key. Derived from `apn` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apn_normalized: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub building_sf: Option<f64>,
    #[serde(default)]
    pub assessed_total: Option<f64>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_listed_for_sale: bool,
    #[serde(default)]
    pub listing_price: Option<f64>,
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

fn text_or_integer<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match Option::<Id>::deserialize(deserializer)? {
        Some(Id::Text(s)) => s,
        Some(Id::Signed(n)) => n.to_string(),
        Some(Id::Unsigned(n)) => n.to_string(),
        None => String::new(),
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One `lot_tract_apn_lookup` row: `(lot, tract, city) → apn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotTractMapping {
    pub lot_number: String,
    pub tract_number: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub city: String,
    pub apn: String,
}

impl LotTractMapping {
    pub fn new(
        lot_number: impl Into<String>,
        tract_number: impl Into<String>,
        city: impl Into<String>,
        apn: impl Into<String>,
    ) -> Self {
        Self {
            lot_number: lot_number.into(),
            tract_number: tract_number.into(),
            city: city.into(),
            apn: apn.into(),
        }
    }

    /// First of lot, tract or APN that is blank, if any. Such a row cannot be indexed.
    pub fn blank_field(&self) -> Option<&'static str> {
        [
            ("lot_number", &self.lot_number),
            ("tract_number", &self.tract_number),
            ("apn", &self.apn),
        ]
        .into_iter()
        .find(|(_, v)| v.trim().is_empty())
        .map(|(field, _)| field)
    }
}

/// Field access for anything that looks like a deed recording.
///
/// Every accessor defaults to `None`, so a source that only knows lot and
/// tract numbers implements just those two.
pub trait DeedLike {
    fn apn(&self) -> Option<&str> {
        None
    }
    fn lot_number(&self) -> Option<&str> {
        None
    }
    fn tract_number(&self) -> Option<&str> {
        None
    }
    fn city(&self) -> Option<&str> {
        None
    }
    fn address(&self) -> Option<&str> {
        None
    }
    fn documentary_transfer_tax(&self) -> Option<f64> {
        None
    }

    /// Sale price implied by the transfer tax: `dtt / rate × 1000`, rounded.
    fn estimated_sale_price(&self, dtt_rate: f64) -> Option<f64> {
        match self.documentary_transfer_tax() {
            Some(dtt) if dtt > 0.0 && dtt_rate > 0.0 => Some((dtt / dtt_rate * 1000.0).round()),
            _ => None,
        }
    }
}

/// A deed recording as delivered by a recorder feed. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeedRecord {
    pub doc_number: Option<String>,
    pub recording_date: Option<NaiveDate>,
    pub doc_type: Option<String>,
    pub apn: Option<String>,
    pub lot_number: Option<String>,
    pub tract_number: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub grantor: Option<String>,
    pub grantee: Option<String>,
    pub documentary_transfer_tax: Option<f64>,
}

/// Treat blank strings the same as missing ones.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl DeedLike for DeedRecord {
    fn apn(&self) -> Option<&str> {
        present(&self.apn)
    }
    fn lot_number(&self) -> Option<&str> {
        present(&self.lot_number)
    }
    fn tract_number(&self) -> Option<&str> {
        present(&self.tract_number)
    }
    fn city(&self) -> Option<&str> {
        present(&self.city)
    }
    fn address(&self) -> Option<&str> {
        present(&self.address)
    }
    fn documentary_transfer_tax(&self) -> Option<f64> {
        self.documentary_transfer_tax
    }
}
