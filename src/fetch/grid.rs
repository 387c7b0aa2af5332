// src/fetch/grid.rs
//
// The raw rectangular-ish grid every sheet source produces, plus a CSV
// loader for local exports and test fixtures. No rectangularity is
// guaranteed: downstream code must tolerate short and long rows.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;

/// Ordered rows of raw text cells, exactly as the source produced them.
pub type RawGrid = Vec<Vec<String>>;

/// Read a grid from any CSV reader. Rows keep their own widths
/// (`flexible`), and no row is interpreted as a header here — header
/// resolution is the schema module's job.
pub fn from_csv_reader<R: Read>(reader: R) -> Result<RawGrid> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut grid = RawGrid::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("CSV parse error at record {}", idx))?;
        grid.push(record.iter().map(|c| c.to_string()).collect());
    }
    Ok(grid)
}

pub fn from_csv_path(path: impl AsRef<Path>) -> Result<RawGrid> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open CSV export {}", path.display()))?;
    from_csv_reader(file).with_context(|| format!("failed to parse {}", path.display()))
}
