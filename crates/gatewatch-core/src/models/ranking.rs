//! Pivot and ranking models

use std::collections::BTreeMap;

use serde::Serialize;

/// One project's counts, keyed by normalized reading type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotRow {
    /// Project alias
    pub project: String,

    /// Count per reading type; every column of the owning table is present
    pub counts: BTreeMap<String, i64>,
}

impl PivotRow {
    /// Count for a reading type, zero if the column is absent
    pub fn count(&self, reading_type: &str) -> i64 {
        self.counts.get(reading_type).copied().unwrap_or(0)
    }
}

/// Project × reading-type matrix for the current query window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PivotTable {
    /// Distinct reading types, sorted
    pub columns: Vec<String>,

    /// One row per project, sorted by project
    pub rows: Vec<PivotRow>,
}

/// A project's position in the success-volume ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedProject {
    /// Project alias
    pub project: String,
    /// Successful opens across the window
    pub open_total: i64,
    /// 1-based
    pub rank: usize,
}

/// Ranked rows joined back to their pivot counts, ready for rendering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RankMatrix {
    /// Column labels, in cell order
    pub columns: Vec<String>,

    /// Rows in rank order
    pub rows: Vec<MatrixRow>,
}

/// A single row of a [`RankMatrix`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixRow {
    /// Project and its position
    pub ranked: RankedProject,
    /// Counts aligned with `RankMatrix::columns`
    pub cells: Vec<i64>,
}
