//! Fuzzy string similarity for normalized addresses.

use serde::{Deserialize, Serialize};

use crate::address::street_number;

/// Bonus added when both addresses start with the same house number.
pub const STREET_NUMBER_BONUS: f64 = 0.10;

/// Base similarity metric used by the address strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressMetric {
    /// Ratcliff/Obershelp gestalt ratio: `2·M / (|a| + |b|)`.
    #[default]
    Gestalt,
    /// Levenshtein distance scaled to `[0, 1]`.
    Levenshtein,
}

impl AddressMetric {
    pub fn ratio(self, a: &str, b: &str) -> f64 {
        match self {
            Self::Gestalt => gestalt_ratio(a, b),
            Self::Levenshtein => strsim::normalized_levenshtein(a, b),
        }
    }
}

impl std::str::FromStr for AddressMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gestalt" => Ok(Self::Gestalt),
            "levenshtein" => Ok(Self::Levenshtein),
            other => Err(format!("unknown address metric '{other}' (expected gestalt or levenshtein)")),
        }
    }
}

/// Gestalt pattern-matching ratio over characters.
///
/// Finds the longest common substring, then recurses into the pieces to its
/// left and right, summing matched characters `M`. Two empty strings are
/// identical (1.0).
pub fn gestalt_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matches = matching_chars(&a, &b);
    2.0 * matches as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block in `a[alo..ahi]` and `b[blo..bhi]`.
///
/// Ties go to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
    // prev[j - blo] = length of the common suffix ending at a[i-1], b[j-1]
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];
    let mut curr = vec![0usize; width + 1];
    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            curr[col] = if a[i] == b[j] { prev[col - 1] + 1 } else { 0 };
            if curr[col] > best_k {
                best_k = curr[col];
                best_i = i + 1 - best_k;
                best_j = j + 1 - best_k;
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    (best_i, best_j, best_k)
}

/// Score two already-normalized addresses.
///
/// Base ratio from `metric`, plus [`STREET_NUMBER_BONUS`] when both leading
/// house numbers are textually identical, capped at 1.0.
pub fn address_similarity(metric: AddressMetric, a: &str, b: &str) -> f64 {
    let mut score = metric.ratio(a, b);
    if let (Some(na), Some(nb)) = (street_number(a), street_number(b)) {
        if na == nb {
            score = (score + STREET_NUMBER_BONUS).min(1.0);
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::normalize_address;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_strings() {
        assert!(approx(gestalt_ratio("main st", "main st"), 1.0));
        assert!(approx(gestalt_ratio("", ""), 1.0));
    }

    #[test]
    fn disjoint_strings() {
        assert!(approx(gestalt_ratio("abc", "xyz"), 0.0));
        assert!(approx(gestalt_ratio("abc", ""), 0.0));
    }

    #[test]
    fn known_ratios() {
        // Classic examples: "abcd" vs "bcde" share "bcd" -> 2*3/8.
        assert!(approx(gestalt_ratio("abcd", "bcde"), 0.75));
        // "qabxcd" vs "abycdf": blocks "ab" and "cd" -> 2*4/12.
        assert!(approx(gestalt_ratio("qabxcd", "abycdf"), 2.0 * 4.0 / 12.0));
    }

    #[test]
    fn ratio_is_symmetric_in_length() {
        let r1 = gestalt_ratio("100 main st", "100 maine st");
        let r2 = gestalt_ratio("100 maine st", "100 main st");
        assert!(approx(r1, r2));
        assert!(r1 > 0.9);
    }

    #[test]
    fn street_number_bonus_applies() {
        let base = gestalt_ratio("100 main st", "100 mian st");
        let scored = address_similarity(AddressMetric::Gestalt, "100 main st", "100 mian st");
        assert!(approx(scored, (base + STREET_NUMBER_BONUS).min(1.0)));
    }

    #[test]
    fn bonus_requires_identical_numbers() {
        let base = gestalt_ratio("100 main st", "1000 main st");
        let scored = address_similarity(AddressMetric::Gestalt, "100 main st", "1000 main st");
        assert!(approx(scored, base));
    }

    #[test]
    fn bonus_is_capped() {
        let scored = address_similarity(AddressMetric::Gestalt, "9 elm st", "9 elm st");
        assert!(approx(scored, 1.0));
    }

    #[test]
    fn abbreviation_variants_clear_threshold() {
        let a = normalize_address("123 N Main St");
        let b = normalize_address("123 North Main Street");
        assert!(address_similarity(AddressMetric::Gestalt, &a, &b) >= 0.85);
        assert!(address_similarity(AddressMetric::Levenshtein, &a, &b) >= 0.85);
    }

    #[test]
    fn different_streets_score_low() {
        let a = normalize_address("100 Main St");
        let b = normalize_address("100 Oak Ave");
        assert!(address_similarity(AddressMetric::Gestalt, &a, &b) < 0.85);
    }

    #[test]
    fn metric_from_str() {
        assert_eq!("Levenshtein".parse::<AddressMetric>(), Ok(AddressMetric::Levenshtein));
        assert!("jaro".parse::<AddressMetric>().is_err());
    }

    #[test]
    fn metric_deserializes_snake_case() {
        let m: AddressMetric = serde_json::from_str("\"levenshtein\"").unwrap();
        assert_eq!(m, AddressMetric::Levenshtein);
    }
}
