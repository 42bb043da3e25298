//! Pivots per-project reading counts and ranks projects by successful opens

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::models::{MatrixRow, PivotRow, PivotTable, RankMatrix, RankedProject, RawEvent};

use super::aggregator::valid_rows;

/// Default marker identifying the successful-open family of reading types
pub const DEFAULT_OPEN_MARKER: &str = "open";

/// Build the project × reading-type table.
///
/// Project aliases are trimmed, reading types normalized, and every row gets
/// a cell for every column observed in `rows` (missing combinations are 0).
pub fn pivot(rows: &[RawEvent]) -> PivotTable {
    let mut columns = BTreeSet::new();
    let mut by_project: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();

    for row in valid_rows(rows) {
        let reading_type = row.reading_key();
        let cell = by_project
            .entry(row.project_key().to_string())
            .or_default()
            .entry(reading_type.clone())
            .or_default();
        *cell = cell.saturating_add(row.count);
        columns.insert(reading_type);
    }

    let rows = by_project
        .into_iter()
        .map(|(project, mut counts)| {
            for column in &columns {
                counts.entry(column.clone()).or_insert(0);
            }
            PivotRow { project, counts }
        })
        .collect();

    PivotTable {
        columns: columns.into_iter().collect(),
        rows,
    }
}

/// Rank projects by the sum of every column whose key contains `marker`.
///
/// Matching is a case-sensitive substring test on the (already normalized)
/// column keys. Rows sharing a project are merged. Results are sorted by
/// `open_total` descending, then project ascending, and cut to `n`.
pub fn top_n(rows: &[PivotRow], marker: &str, n: usize) -> Result<Vec<RankedProject>> {
    if n == 0 {
        return Err(Error::invalid_argument("top-N size must be positive"));
    }

    let mut totals: BTreeMap<&str, i64> = BTreeMap::new();
    for row in rows {
        let open_total = row
            .counts
            .iter()
            .filter(|(reading_type, _)| reading_type.contains(marker))
            .fold(0i64, |sum, (_, count)| sum.saturating_add(*count));
        let total = totals.entry(row.project.as_str()).or_default();
        *total = total.saturating_add(open_total);
    }

    let mut ranked: Vec<(&str, i64)> = totals.into_iter().collect();
    // BTreeMap iteration already yields projects ascending; the stable sort keeps that for ties
    ranked.sort_by_key(|&(_, open_total)| Reverse(open_total));

    Ok(ranked
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(index, (project, open_total))| RankedProject {
            project: project.to_string(),
            open_total,
            rank: index + 1,
        })
        .collect())
}

/// Join ranked projects back to their pivot counts
pub fn matrix(table: &PivotTable, ranked: &[RankedProject]) -> RankMatrix {
    let rows = ranked
        .iter()
        .map(|entry| {
            let source = table.rows.iter().find(|row| row.project == entry.project);
            let cells = table
                .columns
                .iter()
                .map(|column| source.map_or(0, |row| row.count(column)))
                .collect();
            MatrixRow {
                ranked: entry.clone(),
                cells,
            }
        })
        .collect();

    RankMatrix {
        columns: table.columns.clone(),
        rows,
    }
}

/// Configured ranking: marker and size fixed up front
#[derive(Debug, Clone)]
pub struct Ranker {
    marker: String,
    n: usize,
}

impl Ranker {
    /// Create a ranker; `n` must be positive
    pub fn new(marker: impl Into<String>, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::invalid_argument("top-N size must be positive"));
        }
        Ok(Self {
            marker: marker.into(),
            n,
        })
    }

    /// Marker substring
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Pivot `rows`, rank, and return the matrix of the top projects
    pub fn rank(&self, rows: &[RawEvent]) -> Result<RankMatrix> {
        let table = pivot(rows);
        let ranked = top_n(&table.rows, &self.marker, self.n)?;
        Ok(matrix(&table, &ranked))
    }
}
