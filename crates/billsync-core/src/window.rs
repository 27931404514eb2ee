//! Inclusive date windows and the range filter applied before upload.

use std::fmt;

use chrono::{Duration, NaiveDate};

use crate::dates::{format_canonical, parse_canonical};
use crate::error::AppError;
use crate::models::TargetRecord;

/// Inclusive `[start, end]` range of calendar dates.
///
/// `start <= end` is the caller's responsibility; an inverted window simply
/// matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The rolling window of `days` days ending on `today`.
    ///
    /// Fails with `AppError::InvalidDate` for a negative length or one that
    /// reaches past the representable calendar.
    pub fn trailing_days(today: NaiveDate, days: i64) -> Result<Self, AppError> {
        let start = Duration::try_days(days)
            .filter(|_| days >= 0)
            .and_then(|span| today.checked_sub_signed(span))
            .ok_or_else(|| {
                AppError::InvalidDate(format!("{} days before {}", days, today))
            })?;
        Ok(Self { start, end: today })
    }

    /// Builds a window from two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, AppError> {
        let start_date =
            parse_canonical(start).ok_or_else(|| AppError::InvalidDate(start.to_string()))?;
        let end_date =
            parse_canonical(end).ok_or_else(|| AppError::InvalidDate(end.to_string()))?;
        Ok(Self::new(start_date, end_date))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {}",
            format_canonical(self.start),
            format_canonical(self.end)
        )
    }
}

/// Server-side selection of existing remote records by work date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFilter {
    /// `start <= date <= end`
    Within(DateWindow),
    /// `date > cutoff`
    After(NaiveDate),
}

impl RemoteFilter {
    /// OData `$filter` expression over `date_field`.
    ///
    /// # Examples
    ///
    /// ```
    /// use billsync_core::window::{DateWindow, RemoteFilter};
    ///
    /// let window = DateWindow::parse("2025-01-01", "2025-12-31").unwrap();
    /// assert_eq!(
    ///     RemoteFilter::Within(window).to_odata("cr834_date"),
    ///     "cr834_date ge '2025-01-01' and cr834_date le '2025-12-31'"
    /// );
    /// ```
    pub fn to_odata(&self, date_field: &str) -> String {
        match self {
            RemoteFilter::Within(window) => format!(
                "{field} ge '{}' and {field} le '{}'",
                format_canonical(window.start),
                format_canonical(window.end),
                field = date_field
            ),
            RemoteFilter::After(cutoff) => {
                format!("{} gt '{}'", date_field, format_canonical(*cutoff))
            }
        }
    }
}

impl fmt::Display for RemoteFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteFilter::Within(window) => write!(f, "{}", window),
            RemoteFilter::After(cutoff) => write!(f, "after {}", format_canonical(*cutoff)),
        }
    }
}

/// Keeps the records whose work date lies inside `window`.
///
/// Records without a parsable work date are dropped. With no window the
/// input is returned unchanged.
pub fn filter_by_window(records: Vec<TargetRecord>, window: Option<&DateWindow>) -> Vec<TargetRecord> {
    let Some(window) = window else {
        return records;
    };

    records
        .into_iter()
        .filter(|record| record.window_date().is_some_and(|date| window.contains(date)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::map_record;
    use crate::models::SourceRecord;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dated(person: &str, date: &str) -> TargetRecord {
        map_record(&SourceRecord::from_pairs(&[("Person", person), ("Date", date)]))
    }

    #[test]
    fn test_filter_keeps_in_range_and_drops_rest() {
        let records = vec![
            dated("a", "2025-01-01"),
            dated("b", "2025-06-15"),
            dated("c", "2026-01-01"),
            dated("d", ""),
        ];
        let window = DateWindow::new(ymd(2025, 1, 1), ymd(2025, 12, 31));

        let kept = filter_by_window(records.clone(), Some(&window));

        assert_eq!(kept, records[..2].to_vec());
    }

    #[test]
    fn test_filter_drops_unparsable_dates_silently() {
        let records = vec![dated("a", "sometime in May"), dated("b", "5/30/2025")];
        let window = DateWindow::new(ymd(2025, 1, 1), ymd(2025, 12, 31));

        let kept = filter_by_window(records, Some(&window));

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].window_date(), Some(ymd(2025, 5, 30)));
    }

    #[test]
    fn test_filter_bounds_are_inclusive() {
        let records = vec![dated("a", "12/31/2025"), dated("b", "2025-01-01")];
        let window = DateWindow::new(ymd(2025, 1, 1), ymd(2025, 12, 31));
        assert_eq!(filter_by_window(records, Some(&window)).len(), 2);
    }

    #[test]
    fn test_no_window_is_identity() {
        let records = vec![dated("a", ""), dated("b", "2030-01-01")];
        assert_eq!(filter_by_window(records.clone(), None), records);
    }

    #[test]
    fn test_trailing_days() {
        let window = DateWindow::trailing_days(ymd(2025, 10, 24), 365).unwrap();
        assert_eq!(window.start, ymd(2024, 10, 24));
        assert_eq!(window.end, ymd(2025, 10, 24));
        assert_eq!(window.to_string(), "2024-10-24 to 2025-10-24");
    }

    #[test]
    fn test_trailing_days_zero_is_today() {
        let window = DateWindow::trailing_days(ymd(2025, 10, 19), 0).unwrap();
        assert_eq!(window, DateWindow::new(ymd(2025, 10, 19), ymd(2025, 10, 19)));
    }

    #[test]
    fn test_trailing_days_out_of_range() {
        let today = ymd(2025, 10, 19);
        assert!(matches!(
            DateWindow::trailing_days(today, 100_000_000),
            Err(AppError::InvalidDate(_))
        ));
        assert!(matches!(
            DateWindow::trailing_days(today, i64::MAX),
            Err(AppError::InvalidDate(_))
        ));
        assert!(matches!(
            DateWindow::trailing_days(today, -1),
            Err(AppError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_remote_filter_after() {
        let filter = RemoteFilter::After(ymd(2024, 12, 31));
        assert_eq!(filter.to_odata("cr834_date"), "cr834_date gt '2024-12-31'");
        assert_eq!(filter.to_string(), "after 2024-12-31");
    }

    #[test]
    fn test_parse_window() {
        let window = DateWindow::parse("2025-01-01", "2025-12-31").unwrap();
        assert!(window.contains(ymd(2025, 7, 4)));
        assert!(matches!(
            DateWindow::parse("01/01/2025", "2025-12-31"),
            Err(AppError::InvalidDate(_))
        ));
    }
}
