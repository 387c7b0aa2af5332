//! Ingestion and KPI analytics for spreadsheet-style facility exports.
//!
//! The pipeline, leaves first: fetch a raw string grid per entity sheet
//! (`fetch`), resolve its header rows into a unique column contract
//! (`schema`), coerce cells into a dated numeric record stream
//! (`normalize`), index it per column (`series`), then compute trend,
//! growth, dispersion and naive forecasts (`kpi`) or line several
//! entities up on a shared date axis (`align`).

pub mod align;
pub mod fetch;
pub mod kpi;
pub mod normalize;
pub mod schema;
pub mod series;

pub use align::{align, common_columns, date_axis, AlignError, AlignedComparison};
pub use fetch::{FetchError, RawGrid, SheetsClient};
pub use kpi::{
    analyze, correlation, naive_forecast, summary_cards, Aggregation, KpiResult, SummaryCard,
    TotalsConfig, Trend,
};
pub use normalize::Record;
pub use schema::HeaderLayout;
pub use series::{DateRange, Series, TimeSeriesStore};
