//! Vertical card display for match results.

use parcelwatch_core::{DeedLike, DeedRecord, MatchResult, WatchlistEntry};

// ── Public API ──

/// Print a match result followed by the deed it was computed for.
pub fn print_match_card(result: &MatchResult, deed: &DeedRecord, dtt_rate: f64) {
    if result.matched {
        println!(
            "=== MATCH via {} ({:.1}%) ===",
            result.method_str(),
            result.confidence * 100.0
        );
    } else {
        println!("=== NO MATCH ===");
    }
    println!("{}", result.note);
    if result.review {
        println!("** needs manual review **");
    }
    println!();

    if let Some(entry) = &result.watchlist_entry {
        print_parcel(entry);
    }
    print_deed(deed, dtt_rate);

    if !result.attempted.is_empty() {
        let tried: Vec<&str> = result.attempted.iter().map(|m| m.as_str()).collect();
        println!("Strategies tried: {}", tried.join(" → "));
    }
}

// ── Sections ──

fn print_parcel(entry: &WatchlistEntry) {
    println!("Watchlist parcel");
    row("apn", Some(entry.apn.as_str()));
    row("address", entry.address.as_deref());
    row("city", entry.city.as_deref());
    row("building_sf", entry.building_sf.map(format_area).as_deref());
    row("assessed_total", entry.assessed_total.map(format_dollars).as_deref());
    if entry.is_listed_for_sale {
        row(
            "listed_for_sale",
            Some(
                entry
                    .listing_price
                    .map_or_else(|| "yes".to_string(), format_dollars)
                    .as_str(),
            ),
        );
    }
    println!();
}

fn print_deed(deed: &DeedRecord, dtt_rate: f64) {
    println!("Deed");
    row("doc_number", deed.doc_number.as_deref());
    row(
        "recording_date",
        deed.recording_date.map(|d| d.to_string()).as_deref(),
    );
    row("doc_type", deed.doc_type.as_deref());
    row("apn", deed.apn());
    row("lot_number", deed.lot_number());
    row("tract_number", deed.tract_number());
    row("address", deed.address());
    row("city", deed.city());
    row("grantor", deed.grantor.as_deref());
    row("grantee", deed.grantee.as_deref());
    row(
        "transfer_tax",
        deed.documentary_transfer_tax().map(format_dollars).as_deref(),
    );
    row(
        "est_sale_price",
        deed.estimated_sale_price(dtt_rate).map(format_dollars).as_deref(),
    );
    println!();
}

fn row(label: &str, value: Option<&str>) {
    if let Some(value) = value {
        println!("  {label:<18} {value}");
    }
}

// ── Formatting ──

/// `1400000.0` → `$1,400,000`. Cents are shown only when non-zero.
pub fn format_dollars(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let sign = if amount < 0.0 { "-" } else { "" };
    let whole = group_thousands(cents / 100);
    match cents % 100 {
        0 => format!("{sign}${whole}"),
        c => format!("{sign}${whole}.{c:02}"),
    }
}

fn format_area(sf: f64) -> String {
    format!("{} sf", group_thousands(sf.round().max(0.0) as u64))
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollars() {
        assert_eq!(format_dollars(1_400_000.0), "$1,400,000");
        assert_eq!(format_dollars(1_540.0), "$1,540");
        assert_eq!(format_dollars(999.5), "$999.50");
        assert_eq!(format_dollars(0.0), "$0");
        assert_eq!(format_dollars(-12_345.0), "-$12,345");
    }

    #[test]
    fn area() {
        assert_eq!(format_area(52_000.4), "52,000 sf");
        assert_eq!(format_area(950.0), "950 sf");
    }

    #[test]
    fn thousands() {
        assert_eq!(group_thousands(100), "100");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(123_456_789), "123,456,789");
    }
}
