// src/schema.rs
//
// Header resolution: turn the raw header row(s) of a sheet into a single
// ordered list of unique column names, consumed afterwards as a fixed
// contract instead of being re-discovered per access.

use tracing::debug;

/// Placeholder assigned when every candidate cell for a column is blank.
pub const UNNAMED: &str = "Unnamed";

/// How many leading rows of a grid carry header labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// Row 0 is the header; data starts at row 1.
    Single,
    /// Rows 0..=2 are header candidates merged per `resolve_merged`
    /// (row 1 preferred, row 0 fallback, row 2 secondary fallback);
    /// data starts at row 3. Sheets with a title row above the true
    /// header use this layout.
    Merged,
}

impl HeaderLayout {
    /// Split `grid` into a resolved header and the remaining data rows.
    pub fn consume<'a>(self, grid: &'a [Vec<String>]) -> (Vec<String>, &'a [Vec<String>]) {
        match self {
            HeaderLayout::Single => {
                let header = grid.first().map(|r| resolve_single(r)).unwrap_or_default();
                (header, grid.get(1..).unwrap_or(&[]))
            }
            HeaderLayout::Merged => {
                let empty: &[String] = &[];
                let row1 = grid.first().map(Vec::as_slice).unwrap_or(empty);
                let row2 = grid.get(1).map(Vec::as_slice).unwrap_or(empty);
                let row3 = grid.get(2).map(Vec::as_slice).unwrap_or(empty);
                let header = resolve_merged(row1, row2, row3);
                let start = grid.len().min(3);
                (header, &grid[start..])
            }
        }
    }
}

/// Resolve a single raw header row: trim every cell, replace blanks with
/// `Unnamed`, then uniquify.
pub fn resolve_single(row: &[String]) -> Vec<String> {
    let tentative: Vec<String> = row
        .iter()
        .map(|c| {
            let t = c.trim();
            if t.is_empty() {
                UNNAMED.to_string()
            } else {
                t.to_string()
            }
        })
        .collect();
    make_unique(tentative)
}

/// Merge up to three raw header rows into one resolved header.
///
/// For each column index the first non-blank value among `row2[j]`,
/// `row1[j]`, `row3[j]` wins, in that order; if all three are blank the
/// column becomes `Unnamed`. The output is as wide as the widest input
/// row and always unique.
pub fn resolve_merged(row1: &[String], row2: &[String], row3: &[String]) -> Vec<String> {
    let width = row1.len().max(row2.len()).max(row3.len());
    let cell = |row: &[String], j: usize| -> String {
        row.get(j).map(|c| c.trim().to_string()).unwrap_or_default()
    };

    let mut tentative = Vec::with_capacity(width);
    for j in 0..width {
        let a = cell(row2, j);
        let b = cell(row1, j);
        let c = cell(row3, j);
        let name = if !a.is_empty() {
            a
        } else if !b.is_empty() {
            b
        } else if !c.is_empty() {
            c
        } else {
            UNNAMED.to_string()
        };
        tentative.push(name);
    }
    make_unique(tentative)
}

/// Disambiguate repeated names by suffixing `.<occurrence>`: the first
/// occurrence keeps its name, the second becomes `name.1`, the third
/// `name.2`, counted independently per distinct name. Order is preserved.
pub fn make_unique(names: Vec<String>) -> Vec<String> {
    use std::collections::HashMap;

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        match seen.get_mut(&name) {
            None => {
                seen.insert(name.clone(), 0);
                out.push(name);
            }
            Some(count) => {
                *count += 1;
                let suffixed = format!("{}.{}", name, count);
                debug!(column = %name, resolved = %suffixed, "duplicate header disambiguated");
                out.push(suffixed);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn merged_prefers_row2_then_row1_then_row3() {
        let resolved = resolve_merged(&row(&["B"]), &row(&["A"]), &row(&["C"]));
        assert_eq!(resolved, vec!["A"]);

        let resolved = resolve_merged(&row(&["B"]), &row(&[" "]), &row(&["C"]));
        assert_eq!(resolved, vec!["B"]);

        let resolved = resolve_merged(&row(&[""]), &row(&[""]), &row(&["C"]));
        assert_eq!(resolved, vec!["C"]);

        let resolved = resolve_merged(&row(&[""]), &row(&[""]), &row(&[""]));
        assert_eq!(resolved, vec!["Unnamed"]);
    }

    #[test]
    fn merged_width_is_widest_row() {
        let resolved = resolve_merged(
            &row(&["Date", "Visits"]),
            &row(&["", "Clinic Visits", "Referrals"]),
            &row(&[]),
        );
        assert_eq!(resolved, vec!["Date", "Clinic Visits", "Referrals"]);
    }

    #[test]
    fn all_blank_rows_become_numbered_unnamed() {
        let blank = row(&["", "", ""]);
        let resolved = resolve_merged(&blank, &blank, &blank);
        assert_eq!(resolved, vec!["Unnamed", "Unnamed.1", "Unnamed.2"]);
    }

    #[test]
    fn repeats_are_suffixed_per_name() {
        let resolved = make_unique(row(&["Visits", "Visits", "Labs", "Visits", "Labs"]));
        assert_eq!(resolved, vec!["Visits", "Visits.1", "Labs", "Visits.2", "Labs.1"]);
    }

    #[test]
    fn no_duplicates_for_any_combination() {
        let resolved = resolve_merged(
            &row(&["X", "X", ""]),
            &row(&["X", "", "X"]),
            &row(&["", "X", "X"]),
        );
        assert_eq!(resolved.len(), 3);
        let mut sorted = resolved.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 3, "resolved header contains duplicates: {:?}", resolved);
    }

    #[test]
    fn single_layout_consumes_first_row() {
        let grid = vec![row(&["Date", "", "Revenue"]), row(&["01/2024", "5", "7"])];
        let (header, data) = HeaderLayout::Single.consume(&grid);
        assert_eq!(header, vec!["Date", "Unnamed", "Revenue"]);
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn merged_layout_consumes_three_rows() {
        let grid = vec![
            row(&["Monthly Report", "", ""]),
            row(&["Date", "Revenue", "Expenses"]),
            row(&["", "", ""]),
            row(&["01/2024", "1,000", "500"]),
        ];
        let (header, data) = HeaderLayout::Merged.consume(&grid);
        assert_eq!(header, vec!["Date", "Revenue", "Expenses"]);
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn empty_grid_yields_empty_header() {
        let grid: Vec<Vec<String>> = Vec::new();
        let (header, data) = HeaderLayout::Single.consume(&grid);
        assert!(header.is_empty());
        assert!(data.is_empty());
    }
}
