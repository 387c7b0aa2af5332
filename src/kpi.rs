// src/kpi.rs
//
// Descriptive statistics, trend classification, recent-vs-prior growth,
// and a naive compounded forecast for a single indicator series. Every
// function here is total: degenerate input produces neutral results,
// never a panic or an error.

use crate::series::{DateRange, Series, TimeSeriesStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;

/// Trailing window compared against the points immediately before it.
pub const DEFAULT_RECENT_WINDOW: usize = 30;

/// |Pearson r| at or below this is treated as no linear relationship.
pub const PEARSON_SIGNIFICANCE: f64 = 0.3;

/// Summary cards flag indicators whose growth magnitude reaches this.
pub const ALERT_THRESHOLD_PCT: f64 = 20.0;

/// Qualitative direction of a series, from an OLS fit over point indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        };
        f.write_str(s)
    }
}

/// An extreme value and the date it first occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Extreme {
    pub value: f64,
    pub date: NaiveDate,
}

/// Full KPI analysis of one series. A pure value object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiResult {
    pub total: f64,
    pub average: f64,
    pub max: Option<Extreme>,
    pub min: Option<Extreme>,
    pub trend: Trend,
    pub slope: f64,
    pub std_dev: f64,
    pub cv_pct: f64,
    pub recent_avg: f64,
    pub prior_avg: f64,
    pub growth_pct: f64,
    pub sample_count: usize,
    /// Fewer than 2 points: trend, slope, growth and dispersion are
    /// sentinel values and should not be read as signal.
    pub insufficient: bool,
}

impl KpiResult {
    fn empty() -> Self {
        KpiResult {
            total: 0.0,
            average: 0.0,
            max: None,
            min: None,
            trend: Trend::Stable,
            slope: 0.0,
            std_dev: 0.0,
            cv_pct: 0.0,
            recent_avg: 0.0,
            prior_avg: 0.0,
            growth_pct: 0.0,
            sample_count: 0,
            insufficient: true,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// OLS fit of value against point index 0..n-1.
/// Returns `(slope, pearson_r)`; `(0, 0)` for fewer than 2 points or a
/// flat series (zero variance has no defined correlation).
fn linear_fit(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n < 2 {
        return (0.0, 0.0);
    }
    let mean_x = (n as f64 - 1.0) / 2.0;
    let mean_y = mean(values);
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let slope = sxy / sxx;
    let r = if syy == 0.0 { 0.0 } else { sxy / (sxx * syy).sqrt() };
    (slope, r)
}

fn classify(values: &[f64]) -> (Trend, f64) {
    let (slope, r) = linear_fit(values);
    let trend = if r.abs() > PEARSON_SIGNIFICANCE {
        if slope > 0.0 {
            Trend::Up
        } else if slope < 0.0 {
            Trend::Down
        } else {
            Trend::Stable
        }
    } else {
        Trend::Stable
    };
    (trend, slope)
}

/// Analyze one series with the given recent-window size.
///
/// The recent window is the trailing `recent_window` points; the prior
/// window is the `recent_window` points immediately before it, or, when
/// the series is shorter than two windows, whatever points remain before
/// the recent window (possibly none, in which case growth is 0).
pub fn analyze(series: &Series, recent_window: usize) -> KpiResult {
    let values = series.values();
    let n = values.len();
    if n == 0 {
        return KpiResult::empty();
    }

    let total: f64 = values.iter().sum();
    let average = total / n as f64;

    let mut max: Option<Extreme> = None;
    let mut min: Option<Extreme> = None;
    for &(date, value) in &series.points {
        if max.map_or(true, |m| value > m.value) {
            max = Some(Extreme { value, date });
        }
        if min.map_or(true, |m| value < m.value) {
            min = Some(Extreme { value, date });
        }
    }

    let (trend, slope) = classify(&values);

    // sample standard deviation, pinned to 0 for a single point
    let std_dev = if n > 1 {
        let ss: f64 = values.iter().map(|v| (v - average).powi(2)).sum();
        (ss / (n - 1) as f64).sqrt()
    } else {
        0.0
    };
    let cv_pct = if average != 0.0 {
        std_dev / average * 100.0
    } else {
        0.0
    };

    let w = recent_window.max(1);
    let recent_start = n.saturating_sub(w);
    let recent = &values[recent_start..];
    let prior = if n > 2 * w {
        &values[n - 2 * w..n - w]
    } else {
        &values[..recent_start]
    };
    let recent_avg = mean(recent);
    let prior_avg = mean(prior);
    let growth_pct = if prior_avg != 0.0 {
        (recent_avg - prior_avg) / prior_avg * 100.0
    } else {
        0.0
    };

    KpiResult {
        total,
        average,
        max,
        min,
        trend,
        slope,
        std_dev,
        cv_pct,
        recent_avg,
        prior_avg,
        growth_pct,
        sample_count: n,
        insufficient: n < 2,
    }
}

/// Naive forecast `periods_ahead` periods past the end of the series:
/// the average period-over-period percentage change, compounded.
///
/// `None` when the rate is undefined — fewer than 2 points, or any step
/// ratio is non-finite (a zero value followed by anything).
pub fn naive_forecast(series: &Series, periods_ahead: u32) -> Option<f64> {
    let points = &series.points;
    if points.len() < 2 {
        return None;
    }
    let mut sum = 0.0;
    for pair in points.windows(2) {
        let prev = pair[0].1;
        let ratio = (pair[1].1 - prev) / prev;
        if !ratio.is_finite() {
            return None;
        }
        sum += ratio;
    }
    let rate = sum / (points.len() - 1) as f64;
    let last = points.last().map(|&(_, v)| v)?;
    let forecast = last * (1.0 + rate).powi(periods_ahead as i32);
    forecast.is_finite().then_some(forecast)
}

/// Pearson correlation between two series over the dates they share.
/// `None` with fewer than 2 common dates or when either side is flat.
pub fn correlation(a: &Series, b: &Series) -> Option<f64> {
    let b_dates: std::collections::HashMap<NaiveDate, f64> = b.points.iter().copied().collect();
    let (mut xs, mut ys) = (Vec::new(), Vec::new());
    for &(date, value) in &a.points {
        if let Some(&other) = b_dates.get(&date) {
            xs.push(value);
            ys.push(other);
        }
    }
    if xs.len() < 2 {
        return None;
    }
    let (mx, my) = (mean(&xs), mean(&ys));
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(&ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

/// How an indicator rolls up into its summary-card headline value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Average,
}

/// Indicator names the Config sheet marks for sum aggregation.
/// Everything else defaults to average.
#[derive(Debug, Clone, Default)]
pub struct TotalsConfig {
    sum_columns: HashSet<String>,
}

impl TotalsConfig {
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        TotalsConfig {
            sum_columns: names
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    pub fn aggregation_for(&self, column: &str) -> Aggregation {
        if self.sum_columns.contains(column.trim()) {
            Aggregation::Sum
        } else {
            Aggregation::Average
        }
    }
}

/// One rendered summary card for an indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryCard {
    pub column: String,
    pub aggregation: Aggregation,
    /// Headline value: sum or mean of the series per `aggregation`.
    pub value: f64,
    pub latest: f64,
    pub average: f64,
    /// Latest value vs the series average, in percent.
    pub growth_pct: f64,
    /// |growth| reached `ALERT_THRESHOLD_PCT`.
    pub alert: bool,
}

/// Build one card per store column, restricted to an optional window.
/// Columns with no points in the window are skipped.
pub fn summary_cards(
    store: &TimeSeriesStore,
    totals: &TotalsConfig,
    range: Option<DateRange>,
) -> Vec<SummaryCard> {
    let mut cards = Vec::with_capacity(store.columns().len());
    for column in store.columns() {
        let series = match store.series_in(column, range) {
            Some(s) if !s.is_empty() => s,
            _ => continue,
        };
        let values = series.values();
        let sum: f64 = values.iter().sum();
        let average = sum / values.len() as f64;
        let latest = series.last_value().unwrap_or(0.0);
        let aggregation = totals.aggregation_for(column);
        let value = match aggregation {
            Aggregation::Sum => sum,
            Aggregation::Average => average,
        };
        let growth_pct = if average != 0.0 {
            (latest - average) / average * 100.0
        } else {
            0.0
        };
        cards.push(SummaryCard {
            column: column.clone(),
            aggregation,
            value,
            latest,
            average,
            growth_pct,
            alert: growth_pct.abs() >= ALERT_THRESHOLD_PCT,
        });
    }
    cards
}
