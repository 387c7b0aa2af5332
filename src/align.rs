// src/align.rs
//
// Cross-entity alignment: a shared date axis (union of all observed
// dates) and the intersection of column names, so several entities can
// be charted against each other without interpolation or zero-fill.

use crate::series::{DateRange, Series, TimeSeriesStore};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignError {
    /// No stores were supplied.
    NoEntities,
    /// The entities share no column name at all.
    NoCommonIndicator,
    /// The requested column is missing from at least one entity.
    NotShared(String),
}

impl std::fmt::Display for AlignError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlignError::NoEntities => write!(f, "no entities to align"),
            AlignError::NoCommonIndicator => {
                write!(f, "no comparable indicator exists across the entities")
            }
            AlignError::NotShared(column) => {
                write!(f, "indicator `{}` is not shared by every entity", column)
            }
        }
    }
}

impl std::error::Error for AlignError {}

/// Several entities projected onto one column and one date axis.
/// Entities missing an axis date simply omit that point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedComparison {
    pub column: String,
    pub date_axis: Vec<NaiveDate>,
    pub per_entity: BTreeMap<String, Series>,
}

/// Column names present in every store.
pub fn common_columns(stores: &[TimeSeriesStore]) -> BTreeSet<String> {
    let mut iter = stores.iter();
    let mut common: BTreeSet<String> = match iter.next() {
        Some(first) => first.columns().iter().cloned().collect(),
        None => return BTreeSet::new(),
    };
    for store in iter {
        let names: BTreeSet<&str> = store.columns().iter().map(String::as_str).collect();
        common.retain(|c| names.contains(c.as_str()));
    }
    common
}

/// Sorted union of all distinct dates across the stores, optionally
/// restricted to an inclusive window. Without a window the axis spans
/// the global minimum to the global maximum observed date.
pub fn date_axis(stores: &[TimeSeriesStore], range: Option<DateRange>) -> Vec<NaiveDate> {
    let mut dates = BTreeSet::new();
    for store in stores {
        for record in store.records() {
            if range.map_or(true, |r| r.contains(record.date)) {
                dates.insert(record.date);
            }
        }
    }
    dates.into_iter().collect()
}

/// Project every entity onto `column` over the shared date axis.
///
/// Each entity contributes exactly its own in-window points; sparse and
/// non-uniform series stay sparse rather than being filled or merged.
pub fn align(
    stores: &[TimeSeriesStore],
    column: &str,
    range: Option<DateRange>,
) -> Result<AlignedComparison, AlignError> {
    if stores.is_empty() {
        return Err(AlignError::NoEntities);
    }
    let common = common_columns(stores);
    if common.is_empty() {
        return Err(AlignError::NoCommonIndicator);
    }
    if !common.contains(column) {
        return Err(AlignError::NotShared(column.to_string()));
    }

    let axis = date_axis(stores, range);
    let mut per_entity = BTreeMap::new();
    for store in stores {
        // column membership was checked against the intersection
        if let Some(series) = store.series_in(column, range) {
            per_entity.insert(store.entity().to_string(), series);
        }
    }

    Ok(AlignedComparison {
        column: column.to_string(),
        date_axis: axis,
        per_entity,
    })
}
