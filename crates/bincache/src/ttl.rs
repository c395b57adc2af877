//! Human-readable TTL parsing
//!
//! Accepts `"3600"`, `"1 year"`, `"2 months 3 days"`, `"12 hours 30 min"`.
//! Calendar units use fixed lengths (a year is 365 days, a month 30 days).

use crate::error::{CacheError, CacheResult};

/// Default TTL for permanent entries, about one year
pub const PERM_TTL_DEFAULT: u64 = 31_536_000;

pub const YEAR: u64 = 31_536_000;
pub const MONTH: u64 = 2_592_000;
pub const WEEK: u64 = 604_800;
pub const DAY: u64 = 86_400;
pub const HOUR: u64 = 3_600;
pub const MINUTE: u64 = 60;

/// Longest TTL handed to a store
pub const MAX_STORE_TTL: u64 = 100 * YEAR;

fn unit_seconds(unit: &str) -> Option<u64> {
    let seconds = match unit.to_ascii_lowercase().as_str() {
        "year" | "years" => YEAR,
        "month" | "months" => MONTH,
        "week" | "weeks" => WEEK,
        "day" | "days" => DAY,
        "hour" | "hours" => HOUR,
        "minute" | "minutes" | "min" | "mins" => MINUTE,
        "second" | "seconds" | "sec" | "secs" => 1,
        _ => return None,
    };
    Some(seconds)
}

/// Parse a TTL expression into seconds
pub fn parse_ttl(text: &str) -> CacheResult<u64> {
    let invalid = || CacheError::InvalidConfiguration(format!("unparseable TTL '{text}'"));

    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }
    if let Ok(seconds) = trimmed.parse::<u64>() {
        return Ok(seconds);
    }

    let mut words = trimmed.split_whitespace();
    let mut total: u64 = 0;
    while let Some(count) = words.next() {
        let count = count.parse::<u64>().map_err(|_| invalid())?;
        let unit = words.next().and_then(unit_seconds).ok_or_else(invalid)?;
        total = count
            .checked_mul(unit)
            .and_then(|s| total.checked_add(s))
            .ok_or_else(invalid)?;
    }
    Ok(total)
}
