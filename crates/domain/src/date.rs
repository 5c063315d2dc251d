use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Parses a `YYYY-MM-DD` date string into its `(year, month, day)` parts,
/// validating that the date actually exists on the calendar.
pub fn is_valid_date(date_str: &str) -> Result<(i32, u32, u32), String> {
    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| format!("Malformed date: {date_str}"))?;
    Ok((date.year(), date.month(), date.day()))
}

/// Formats a UTC instant as a `YYYY-MM-DD` date string.
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Number of days in the given month of the given year (leap-year aware).
pub fn get_month_length(year: i32, month: u32) -> u32 {
    let next_month_first_day = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    #[allow(clippy::unwrap_used)]
    let next_month_first_day = next_month_first_day.unwrap();
    #[allow(clippy::unwrap_used)]
    let this_month_first_day = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    (next_month_first_day - this_month_first_day).num_days() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_dates() {
        assert!(is_valid_date("2023-13-40").is_err());
        assert!(is_valid_date("not-a-date").is_err());
    }

    #[test]
    fn accepts_valid_dates() {
        assert_eq!(is_valid_date("2025-03-03").unwrap(), (2025, 3, 3));
    }

    #[test]
    fn month_length_handles_leap_years() {
        assert_eq!(get_month_length(2024, 2), 29);
        assert_eq!(get_month_length(2023, 2), 28);
        assert_eq!(get_month_length(2023, 12), 31);
    }
}
