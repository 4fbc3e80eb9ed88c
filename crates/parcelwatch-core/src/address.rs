//! Street address normalisation.
//!
//! Watchlist addresses and deed addresses come from different systems and
//! disagree on abbreviations ("North Orange Olive Road" vs "N Orange Olive
//! Rd"). Both sides are pushed through the same pipeline before they are
//! indexed or compared:
//!
//! 1. lowercase and trim
//! 2. drop `.`, `,` and `#`
//! 3. abbreviate compass directions (whole words only)
//! 4. abbreviate street types (whole words only)
//! 5. collapse runs of whitespace

use std::sync::LazyLock;

use regex::{Captures, Regex};

const DIRECTIONALS: &[(&str, &str)] = &[
    ("north", "n"),
    ("south", "s"),
    ("east", "e"),
    ("west", "w"),
    ("northeast", "ne"),
    ("northwest", "nw"),
    ("southeast", "se"),
    ("southwest", "sw"),
];

const STREET_TYPES: &[(&str, &str)] = &[
    ("street", "st"),
    ("avenue", "ave"),
    ("boulevard", "blvd"),
    ("drive", "dr"),
    ("road", "rd"),
    ("lane", "ln"),
    ("court", "ct"),
    ("circle", "cir"),
    ("place", "pl"),
    ("way", "wy"),
    ("parkway", "pkwy"),
    ("highway", "hwy"),
];

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.,#]").expect("valid regex"));
static DIRECTIONAL_WORDS: LazyLock<Regex> = LazyLock::new(|| word_regex(DIRECTIONALS));
static STREET_TYPE_WORDS: LazyLock<Regex> = LazyLock::new(|| word_regex(STREET_TYPES));

fn word_regex(table: &[(&str, &str)]) -> Regex {
    let words: Vec<&str> = table.iter().map(|(full, _)| *full).collect();
    Regex::new(&format!(r"\b(?:{})\b", words.join("|"))).expect("valid regex")
}

fn abbreviate(re: &Regex, table: &[(&str, &str)], text: &str) -> String {
    re.replace_all(text, |caps: &Captures<'_>| {
        let word = &caps[0];
        table
            .iter()
            .find(|(full, _)| *full == word)
            .map(|(_, abbrev)| (*abbrev).to_string())
            .unwrap_or_else(|| word.to_string())
    })
    .into_owned()
}

/// Normalise an address for indexing and comparison.
pub fn normalize_address(address: &str) -> String {
    let addr = address.trim().to_lowercase();
    if addr.is_empty() {
        return addr;
    }
    let addr = PUNCTUATION.replace_all(&addr, "");
    let addr = abbreviate(&DIRECTIONAL_WORDS, DIRECTIONALS, &addr);
    let addr = abbreviate(&STREET_TYPE_WORDS, STREET_TYPES, &addr);
    addr.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Leading run of digits (the house number), if any.
pub fn street_number(address: &str) -> Option<&str> {
    let end = address
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(address.len());
    (end > 0).then(|| &address[..end])
}

/// City key used by the address index: trimmed, lowercased.
pub fn city_key(city: &str) -> String {
    city.trim().to_lowercase()
}
