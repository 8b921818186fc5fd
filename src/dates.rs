// src/dates.rs

//! Listing date normalization.
//!
//! jobs.ge renders dates as `"<day> <month name> [year]"` in Georgian.
//! This module converts them into the canonical `DD/MM/YYYY` wire format
//! used everywhere downstream.

use chrono::{Datelike, Local};

use crate::models::MonthTable;

/// Convert a localized listing date into `DD/MM/YYYY`.
///
/// Example: `"16 ოქტომბერი"` -> `"16/10/2025"` (current year substituted).
///
/// Malformed input is passed through unchanged rather than failing the
/// caller; a blank input yields an empty string.
pub fn normalize_date(raw: &str, months: &MonthTable) -> String {
    normalize_date_with_year(raw, months, Local::now().year())
}

/// Same as [`normalize_date`] but with an explicit fallback year.
pub fn normalize_date_with_year(raw: &str, months: &MonthTable, fallback_year: i32) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() < 2 {
        log::warn!("Unexpected date format: '{}'", raw);
        return raw.to_string();
    }

    let day = format!("{:0>2}", parts[0]);
    let Some(month) = months.lookup(parts[1]) else {
        log::warn!("Unknown month name: '{}'", parts[1]);
        return raw.to_string();
    };

    let year = parts
        .get(2)
        .map(|y| y.to_string())
        .unwrap_or_else(|| fallback_year.to_string());

    format!("{}/{}/{}", day, month, year)
}
