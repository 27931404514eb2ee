//! Date normalization for report date columns.
//!
//! The report emits dates in several shapes. Inputs are tried against
//! [`ACCEPTED_DATE_FORMATS`] in order and the first format that parses wins.
//!
//! Month/day/year comes first, so `03/04/2025` is read as March 4th. A
//! day/month/year source would be silently misread whenever both leading
//! components are 12 or less; this precedence is part of the contract and is
//! covered by tests.

use chrono::{Datelike, NaiveDate};

/// Accepted formats, highest precedence first.
pub const ACCEPTED_DATE_FORMATS: [&str; 4] = [
    "%m/%d/%Y", // 5/30/2025
    "%Y-%m-%d", // 2025-05-30
    "%m-%d-%Y", // 5-30-2025
    "%Y/%m/%d", // 2025/05/30
];

/// Canonical text form used for comparisons and query filters.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d";

/// Parses date text against the accepted formats.
///
/// Returns `None` for blank input or when no format matches. Years must have
/// four digits.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    ACCEPTED_DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .find(|date| (1000..=9999).contains(&date.year()))
}

/// Normalizes date text to canonical `YYYY-MM-DD`.
///
/// # Examples
///
/// ```
/// use billsync_core::dates::normalize_date;
///
/// assert_eq!(normalize_date("5/30/2025").as_deref(), Some("2025-05-30"));
/// assert_eq!(normalize_date("2025/05/30").as_deref(), Some("2025-05-30"));
/// assert_eq!(normalize_date("not-a-date"), None);
/// assert_eq!(normalize_date(""), None);
/// ```
pub fn normalize_date(text: &str) -> Option<String> {
    parse_date(text).map(format_canonical)
}

pub fn format_canonical(date: NaiveDate) -> String {
    date.format(CANONICAL_FORMAT).to_string()
}

/// Parses a strictly canonical date, as supplied on the command line.
pub fn parse_canonical(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), CANONICAL_FORMAT).ok()
}
