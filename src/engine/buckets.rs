//! Six-month histograms for the dashboard charts.

use std::ops::AddAssign;

use chrono::{Datelike, Month, NaiveDate};

use crate::models::MonthBucket;

pub const WINDOW_MONTHS: u32 = 6;

/// `(year, month)` of the month `back` months before `date`'s month.
fn months_back(date: NaiveDate, back: u32) -> (i32, u32) {
    let index = date.year() * 12 + date.month0() as i32 - back as i32;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Upper-case three-letter month label, `JAN` to `DEC`.
pub fn month_label(month: u32) -> String {
    Month::try_from(month as u8)
        .map(|m| m.name()[..3].to_uppercase())
        .unwrap_or_default()
}

/// Buckets `rows` into the six calendar months ending with `today`'s
/// month, oldest first. Every bucket is present even when empty; rows
/// outside the window are ignored.
pub fn last_six_months<T, I>(today: NaiveDate, rows: I) -> Vec<MonthBucket<T>>
where
    T: AddAssign + Default,
    I: IntoIterator<Item = (NaiveDate, T)>,
{
    let mut buckets: Vec<MonthBucket<T>> = (0..WINDOW_MONTHS)
        .rev()
        .map(|back| {
            let (year, month) = months_back(today, back);
            MonthBucket {
                year,
                month,
                label: month_label(month),
                value: T::default(),
            }
        })
        .collect();

    for (date, value) in rows {
        if let Some(bucket) = buckets
            .iter_mut()
            .find(|b| b.year == date.year() && b.month == date.month())
        {
            bucket.value += value;
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_crosses_year_boundary() {
        let buckets = last_six_months::<i64, _>(date(2024, 2, 10), Vec::new());

        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, vec!["SEP", "OCT", "NOV", "DEC", "JAN", "FEB"]);
        assert_eq!((buckets[0].year, buckets[0].month), (2023, 9));
        assert_eq!((buckets[5].year, buckets[5].month), (2024, 2));
        assert!(buckets.iter().all(|b| b.value == 0));
    }

    #[test]
    fn test_rows_land_in_matching_month() {
        let rows = vec![
            (date(2024, 6, 1), 1),
            (date(2024, 6, 30), 1),
            (date(2024, 1, 31), 1),
            // Same month a year earlier is outside the window
            (date(2023, 6, 15), 1),
            // Future months are outside the window
            (date(2024, 7, 1), 1),
            (date(2023, 12, 31), 1),
        ];

        let buckets = last_six_months(date(2024, 6, 15), rows);
        let values: Vec<i64> = buckets.iter().map(|b| b.value).collect();
        assert_eq!(values, vec![1, 0, 0, 0, 0, 2]);
        assert_eq!(buckets[0].label, "JAN");
    }

    #[test]
    fn test_sums_amounts() {
        let rows = vec![
            (date(2024, 5, 3), 300.0),
            (date(2024, 5, 20), 800.0),
            (date(2024, 3, 1), 2500.0),
        ];

        let buckets = last_six_months(date(2024, 5, 31), rows);
        assert_eq!(buckets[5].value, 1100.0);
        assert_eq!(buckets[3].value, 2500.0);
        assert_eq!(buckets.len(), 6);
    }

    #[test]
    fn test_month_labels() {
        assert_eq!(month_label(1), "JAN");
        assert_eq!(month_label(9), "SEP");
        assert_eq!(month_label(12), "DEC");
    }
}
