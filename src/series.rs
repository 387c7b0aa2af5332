// src/series.rs
//
// Indexed view over one entity's normalized records: per-column series
// extraction, inclusive date-range slicing, and ordered tabular output
// for the rendering layer.

use crate::normalize::{normalize_rows, Record};
use crate::schema::HeaderLayout;
use chrono::NaiveDate;
use serde::Serialize;

/// An inclusive `[start, end]` calendar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// One column of one entity as an ordered time series.
/// Points are ascending by date and dates are unique.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub entity: String,
    pub column: String,
    pub points: Vec<(NaiveDate, f64)>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|&(_, v)| v).collect()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|&(_, v)| v)
    }
}

/// Normalized records for one entity, indexed for per-column access.
///
/// Records are held sorted ascending by date with unique dates (the
/// normalizer guarantees both), so range slicing is a pair of binary
/// searches plus a copy of the k in-range points.
#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    entity: String,
    columns: Vec<String>,
    records: Vec<Record>,
}

impl TimeSeriesStore {
    /// Resolve the grid's header, normalize its data rows, and index the
    /// result. The first resolved column is the date axis; the remaining
    /// columns become the store's indicator columns, order preserved.
    pub fn from_grid(entity: &str, grid: &[Vec<String>], layout: HeaderLayout) -> Self {
        let (header, data) = layout.consume(grid);
        let records = normalize_rows(&header, data);
        let columns = header.into_iter().skip(1).collect();
        TimeSeriesStore {
            entity: entity.to_string(),
            columns,
            records,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Resolved indicator columns, in sheet order (date axis excluded).
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The full span of dates held, or `None` for an empty store.
    pub fn date_span(&self) -> Option<DateRange> {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) => Some(DateRange::new(first.date, last.date)),
            _ => None,
        }
    }

    /// The whole series for `column`, or `None` for an unknown column.
    pub fn series(&self, column: &str) -> Option<Series> {
        self.series_in(column, None)
    }

    /// The series for `column` restricted to an inclusive date range.
    /// Ascending order and date uniqueness carry over from the records.
    pub fn series_in(&self, column: &str, range: Option<DateRange>) -> Option<Series> {
        if !self.columns.iter().any(|c| c == column) {
            return None;
        }
        let slice = match range {
            Some(r) => {
                let lo = self.records.partition_point(|rec| rec.date < r.start);
                let hi = self.records.partition_point(|rec| rec.date <= r.end);
                &self.records[lo..hi]
            }
            None => &self.records[..],
        };
        let points = slice
            .iter()
            .map(|rec| (rec.date, rec.values.get(column).copied().unwrap_or(0.0)))
            .collect();
        Some(Series {
            entity: self.entity.clone(),
            column: column.to_string(),
            points,
        })
    }

    /// Ordered tabular view: one `(date, values)` row per record with
    /// values in column order, ready for direct tabulation or export.
    pub fn rows(&self) -> impl Iterator<Item = (NaiveDate, Vec<f64>)> + '_ {
        self.records.iter().map(move |rec| {
            let values = self
                .columns
                .iter()
                .map(|c| rec.values.get(c).copied().unwrap_or(0.0))
                .collect();
            (rec.date, values)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn monthly_store() -> TimeSeriesStore {
        let g = grid(&[
            &["Date", "Visits", "Labs"],
            &["01/2024", "10", "1"],
            &["02/2024", "20", "2"],
            &["03/2024", "30", "3"],
            &["04/2024", "40", "4"],
        ]);
        TimeSeriesStore::from_grid("clinic-a", &g, HeaderLayout::Single)
    }

    #[test]
    fn series_preserves_order_and_values() {
        let store = monthly_store();
        let s = store.series("Visits").unwrap();
        assert_eq!(s.entity, "clinic-a");
        assert_eq!(s.values(), vec![10.0, 20.0, 30.0, 40.0]);
        assert!(store.series("Nope").is_none());
    }

    #[test]
    fn range_slice_is_inclusive_and_ordered() {
        let store = monthly_store();
        let r = DateRange::new(date(2024, 2, 1), date(2024, 3, 1));
        let s = store.series_in("Visits", Some(r)).unwrap();
        assert_eq!(
            s.points,
            vec![(date(2024, 2, 1), 20.0), (date(2024, 3, 1), 30.0)]
        );

        // window past the data is empty, not an error
        let r = DateRange::new(date(2025, 1, 1), date(2025, 12, 31));
        assert!(store.series_in("Visits", Some(r)).unwrap().is_empty());
    }

    #[test]
    fn date_span_covers_first_to_last() {
        let store = monthly_store();
        let span = store.date_span().unwrap();
        assert_eq!(span.start, date(2024, 1, 1));
        assert_eq!(span.end, date(2024, 4, 1));
    }

    #[test]
    fn rows_follow_column_order() {
        let store = monthly_store();
        let rows: Vec<_> = store.rows().collect();
        assert_eq!(rows[0], (date(2024, 1, 1), vec![10.0, 1.0]));
        assert_eq!(rows[3], (date(2024, 4, 1), vec![40.0, 4.0]));
    }

    #[test]
    fn empty_sheet_yields_empty_store() {
        let store = TimeSeriesStore::from_grid("empty", &[], HeaderLayout::Single);
        assert!(store.is_empty());
        assert!(store.date_span().is_none());
    }

    // End-to-end: two-row sheet through the full pipeline.
    #[test]
    fn two_row_sheet_end_to_end() {
        let g = grid(&[
            &["Date", "Revenue"],
            &["01/2024", "1,000"],
            &["02/2024", "-"],
        ]);
        let store = TimeSeriesStore::from_grid("clinic-a", &g, HeaderLayout::Single);
        let s = store.series("Revenue").unwrap();
        assert_eq!(
            s.points,
            vec![(date(2024, 1, 1), 1000.0), (date(2024, 2, 1), 0.0)]
        );
        let result = kpi::analyze(&s, kpi::DEFAULT_RECENT_WINDOW);
        assert_eq!(result.total, 1000.0);
        assert_eq!(result.average, 500.0);
    }
}
