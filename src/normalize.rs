// src/normalize.rs
//
// Turns raw sheet rows into canonical per-entity records: column 0 is a
// date axis parsed through a cascade of legacy formats, every other
// column is coerced to a float with a documented default-to-zero policy.

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// One reporting period for one entity. `date` is never null here:
/// rows whose date cell survives no parse stage are dropped entirely.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date: NaiveDate,
    pub values: HashMap<String, f64>,
}

/// Day-first calendar formats tried in stage (a) of the date cascade.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d/%m/%y",
    "%m/%d/%Y",
];

/// The legacy spreadsheet epoch: serial day 0.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Largest serial accepted by the fallback (9999-12-31 in spreadsheet days).
const SERIAL_MAX: f64 = 2_958_465.0;

/// Parse a raw date cell through the three-stage cascade:
/// (a) calendar formats with day-before-month precedence,
/// (b) explicit month/year patterns (`%m/%Y`, `%m-%Y`, `%Y-%m`),
/// (c) spreadsheet serial-day fallback against the 1899-12-30 epoch.
///
/// Returns `None` when all three stages fail; callers drop the row.
pub fn parse_date_cell(cell: &str) -> Option<NaiveDate> {
    let v = cell.trim();
    if v.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(v, fmt) {
            return Some(d);
        }
    }

    if let Some(d) = parse_month_year(v) {
        return Some(d);
    }

    parse_serial(v)
}

/// Month/year cells normalize to the first day of that month.
fn parse_month_year(v: &str) -> Option<NaiveDate> {
    let sep = if v.contains('/') { '/' } else { '-' };
    let mut parts = v.splitn(2, sep);
    let first = parts.next()?.trim();
    let second = parts.next()?.trim();

    let (year_str, month_str) = if first.len() == 4 {
        (first, second)
    } else if second.len() == 4 {
        (second, first)
    } else {
        return None;
    };

    let year: i32 = year_str.parse().ok()?;
    let month: u32 = month_str.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn parse_serial(v: &str) -> Option<NaiveDate> {
    let serial: f64 = v.parse().ok()?;
    if !serial.is_finite() || serial < 1.0 || serial > SERIAL_MAX {
        return None;
    }
    let (y, m, d) = SERIAL_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]").expect("separator regex"));

/// Tokens that malformed exports use for "no value". Compared after
/// separator stripping, case-insensitively where the source data varies.
fn is_null_token(v: &str) -> bool {
    matches!(v, "" | "-" | "—")
        || v.eq_ignore_ascii_case("n/a")
        || v.eq_ignore_ascii_case("null")
        || v.eq_ignore_ascii_case("none")
        || v.eq_ignore_ascii_case("nan")
        || v.eq_ignore_ascii_case("inf")
        || v.eq_ignore_ascii_case("infinity")
}

/// Coerce a raw numeric cell to a float.
///
/// Thousands separators, stray whitespace and percent signs are stripped;
/// null-ish tokens and anything still unparseable map to `0.0`. Malformed
/// financial exports are expected, not exceptional, so this never errors.
pub fn coerce_numeric(cell: &str) -> f64 {
    let stripped = SEPARATORS.replace_all(cell.trim(), "");
    let v = stripped.trim_end_matches('%');
    if is_null_token(v) {
        return 0.0;
    }
    match v.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// Normalize data rows against a resolved header.
///
/// Rows whose first cell fails the date cascade are dropped. Cells missing
/// from a short row coerce to `0.0`; cells beyond the header width are
/// ignored. Output is sorted ascending by date (stable, so original row
/// order breaks ties) and de-duplicated keeping the *last* record for a
/// repeated date — later rows in append-only sheets are corrections.
pub fn normalize_rows(header: &[String], rows: &[Vec<String>]) -> Vec<Record> {
    let mut records: Vec<Record> = Vec::with_capacity(rows.len());

    for (idx, raw) in rows.iter().enumerate() {
        let date = match raw.first().and_then(|c| parse_date_cell(c)) {
            Some(d) => d,
            None => {
                debug!(row = idx, "dropping row with unparseable date");
                continue;
            }
        };

        let mut values = HashMap::with_capacity(header.len().saturating_sub(1));
        for (j, name) in header.iter().enumerate().skip(1) {
            let cell = raw.get(j).map(String::as_str).unwrap_or("");
            values.insert(name.clone(), coerce_numeric(cell));
        }
        records.push(Record { date, values });
    }

    records.sort_by_key(|r| r.date);

    let mut out: Vec<Record> = Vec::with_capacity(records.len());
    for rec in records {
        match out.last_mut() {
            Some(prev) if prev.date == rec.date => *prev = rec,
            _ => out.push(rec),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn calendar_formats_parse_day_first() {
        assert_eq!(parse_date_cell("2024-03-05"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date_cell("05/03/2024"), Some(date(2024, 3, 5)));
        assert_eq!(parse_date_cell("05-03-2024"), Some(date(2024, 3, 5)));
    }

    #[test]
    fn month_year_fallback_parses_after_general_failure() {
        assert_eq!(parse_date_cell("03/2024"), Some(date(2024, 3, 1)));
        assert_eq!(parse_date_cell("03-2024"), Some(date(2024, 3, 1)));
        assert_eq!(parse_date_cell("2024-03"), Some(date(2024, 3, 1)));
        assert_eq!(parse_date_cell("13/2024"), None);
    }

    #[test]
    fn serial_fallback_uses_spreadsheet_epoch() {
        // 45000 days after 1899-12-30 lands in 2023.
        let d = parse_date_cell("45000").expect("serial should parse");
        assert_eq!(d.format("%Y").to_string(), "2023");
        assert_eq!(d, date(2023, 3, 15));
    }

    #[test]
    fn hopeless_cells_parse_to_none() {
        assert_eq!(parse_date_cell(""), None);
        assert_eq!(parse_date_cell("soon"), None);
        assert_eq!(parse_date_cell("-3"), None);
    }

    #[test]
    fn numeric_coercion_policy() {
        assert_eq!(coerce_numeric("1,234"), 1234.0);
        assert_eq!(coerce_numeric("15%"), 15.0);
        assert_eq!(coerce_numeric("-"), 0.0);
        assert_eq!(coerce_numeric("—"), 0.0);
        assert_eq!(coerce_numeric("N/A"), 0.0);
        assert_eq!(coerce_numeric("null"), 0.0);
        assert_eq!(coerce_numeric("None"), 0.0);
        assert_eq!(coerce_numeric("abc"), 0.0);
        assert_eq!(coerce_numeric(" 1 234,5 "), 12345.0);
        assert_eq!(coerce_numeric("-42.5"), -42.5);
        assert_eq!(coerce_numeric("inf"), 0.0);
    }

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn raw(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rows_with_bad_dates_are_dropped() {
        let h = header(&["Date", "Visits"]);
        let rows = vec![
            raw(&["01/2024", "10"]),
            raw(&["not a date", "99"]),
            raw(&["02/2024", "20"]),
        ];
        let records = normalize_rows(&h, &rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].values["Visits"], 10.0);
        assert_eq!(records[1].values["Visits"], 20.0);
    }

    #[test]
    fn short_rows_default_missing_cells_to_zero() {
        let h = header(&["Date", "Visits", "Labs"]);
        let records = normalize_rows(&h, &[raw(&["01/2024", "10"])]);
        assert_eq!(records[0].values["Labs"], 0.0);
    }

    #[test]
    fn output_is_sorted_and_last_record_wins_on_duplicate_dates() {
        let h = header(&["Date", "Visits"]);
        let rows = vec![
            raw(&["03/2024", "30"]),
            raw(&["01/2024", "10"]),
            raw(&["01/2024", "11"]),
            raw(&["02/2024", "20"]),
        ];
        let records = normalize_rows(&h, &rows);
        let dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![date(2024, 1, 1), date(2024, 2, 1), date(2024, 3, 1)]
        );
        // the later "01/2024" row is the correction
        assert_eq!(records[0].values["Visits"], 11.0);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let h = header(&["Date", "Visits"]);
        assert!(normalize_rows(&h, &[]).is_empty());
    }

    #[test]
    fn duplicate_headers_stay_independent_columns() {
        let h = header(&["Date", "Visits", "Visits.1"]);
        let records = normalize_rows(&h, &[raw(&["01/2024", "10", "99"])]);
        assert_eq!(records[0].values["Visits"], 10.0);
        assert_eq!(records[0].values["Visits.1"], 99.0);
    }
}
