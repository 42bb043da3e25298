//! Metrics data models

use serde::Serialize;

use super::event::Bucket;

/// Summary of one project's readings over one time bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectMetrics {
    /// Project alias
    pub project: String,

    /// Time bucket the counts cover
    pub bucket: Bucket,

    // Counters
    /// All readings
    pub total: i64,

    /// Successful opens
    pub correct: i64,

    /// Every reading that is not a successful open
    pub error: i64,

    /// `error * 100 / total`, truncated
    pub error_pct: i64,

    // Error breakdown
    /// Gate controller unreachable
    pub disconnect: i64,

    /// Presence not detected
    pub presence_error: i64,

    /// Any other failure code
    pub other_error: i64,
}

impl ProjectMetrics {
    /// Whether the error percentage is strictly above `threshold_pct`
    pub fn exceeds(&self, threshold_pct: f64) -> bool {
        self.error_pct as f64 > threshold_pct
    }
}

/// Output of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    /// One entry per (project, bucket) with at least one reading
    pub metrics: Vec<ProjectMetrics>,

    /// Rows dropped as malformed
    pub rejected: usize,
}

/// Count of one reading type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadingCount {
    /// Normalized reading type
    pub reading_type: String,
    /// Summed count across the window
    pub count: i64,
}

/// Count of one reading type within one bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    /// Bucket start
    pub bucket: Bucket,
    /// Summed count within the bucket
    pub count: i64,
}
