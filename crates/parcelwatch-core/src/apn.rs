//! Assessor parcel number (APN) normalisation.
//!
//! County systems print the same parcel number in many shapes:
//! "123-456-78", "123 456 78", "12345678". Equality is always decided on the
//! normalized form, which keeps only letters and digits. The punctuated form
//! is kept for display and logging.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Strip every character that is not a letter or digit.
///
/// Order and case are preserved. Empty input yields an empty string.
///
/// ```
/// use parcelwatch_core::normalize;
/// assert_eq!(normalize("123-456-78"), "12345678");
/// assert_eq!(normalize(" 123 456 78 "), "12345678");
/// ```
pub fn normalize(apn: &str) -> String {
    apn.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// [`normalize`] for values that may be absent upstream.
pub fn normalize_opt(apn: Option<&str>) -> String {
    apn.map(normalize).unwrap_or_default()
}

/// Canonical display form used when importing parcel lists.
///
/// Orange County APNs are 8 digits grouped 3-3-2. Anything else is returned
/// trimmed but otherwise untouched.
pub fn format_apn(raw: &str) -> String {
    let clean = normalize(raw);
    if clean.len() == 8 && clean.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &clean[..3], &clean[3..6], &clean[6..])
    } else {
        raw.trim().to_string()
    }
}

/// A parcel number carrying both its display and comparison forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Apn {
    display: String,
    normalized: String,
}

impl Apn {
    /// Wrap a parcel number as printed; the comparison form is derived from it.
    pub fn new(display: impl Into<String>) -> Self {
        let display = display.into();
        let normalized = normalize(&display);
        Self {
            display,
            normalized,
        }
    }

    /// The parcel number as it was given.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// Letters and digits only, used for equality and hashing.
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn is_empty(&self) -> bool {
        self.normalized.is_empty()
    }
}

impl PartialEq for Apn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Apn {}

impl std::hash::Hash for Apn {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl fmt::Display for Apn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<String> for Apn {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Apn {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Apn> for String {
    fn from(apn: Apn) -> Self {
        apn.display
    }
}
