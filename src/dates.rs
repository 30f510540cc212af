use chrono::{DateTime, Datelike, Days, NaiveDate};

use crate::error::DateError;

const FULL_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%B %d %Y",
    "%B %d, %Y",
];

const YEARLESS_FORMATS: &[&str] = &["%B %d %Y", "%d %B %Y"];

/// Read a date the way a person would type it. `today` anchors the relative
/// words and dates given without a year.
pub fn parse_date(input: &str, today: NaiveDate) -> Result<NaiveDate, DateError> {
    let trimmed = input.trim();
    let error = || DateError {
        input: input.to_string(),
    };

    match trimmed.to_lowercase().as_str() {
        "today" => return Ok(today),
        "yesterday" => return today.checked_sub_days(Days::new(1)).ok_or_else(error),
        "tomorrow" => return today.checked_add_days(Days::new(1)).ok_or_else(error),
        _ => {}
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.date_naive());
    }

    // %B also accepts abbreviated month names
    FULL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            let with_year = format!("{} {}", trimmed, today.year());
            YEARLESS_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&with_year, fmt).ok())
        })
        .ok_or_else(error)
}
