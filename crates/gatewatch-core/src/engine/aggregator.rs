//! Folds raw gate events into per-project, per-bucket error metrics
//!
//! Every function here is a pure transform over its input slice. Malformed
//! rows (empty project, negative count) and rows that would overflow their
//! group's sums are dropped and counted rather than failing the whole pass.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::FixedOffset;
use tracing::{debug, warn};

use crate::models::{
    normalize_label, AggregateReport, Bucket, Granularity, ProjectMetrics, RawEvent,
    ReadingCount, SeriesPoint, DISCONNECT, OPEN, PRESENCE_ERROR,
};

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    total: i64,
    correct: i64,
    disconnect: i64,
    presence_error: i64,
    other_error: i64,
}

impl Tally {
    /// Add `count` to the total and its slot; leaves the tally untouched and
    /// returns false if either sum would overflow
    fn add(&mut self, reading_type: &str, count: i64) -> bool {
        let Some(total) = self.total.checked_add(count) else {
            return false;
        };
        let slot = match reading_type {
            OPEN => &mut self.correct,
            DISCONNECT => &mut self.disconnect,
            PRESENCE_ERROR => &mut self.presence_error,
            _ => &mut self.other_error,
        };
        let Some(sum) = slot.checked_add(count) else {
            return false;
        };
        *slot = sum;
        self.total = total;
        true
    }

    fn into_metrics(self, project: String, bucket: Bucket) -> Option<ProjectMetrics> {
        if self.total == 0 {
            return None;
        }

        let error = self.total - self.correct;
        // truncated, not rounded
        let error_pct = (i128::from(error) * 100 / i128::from(self.total)) as i64;

        Some(ProjectMetrics {
            project,
            bucket,
            total: self.total,
            correct: self.correct,
            error,
            error_pct,
            disconnect: self.disconnect,
            presence_error: self.presence_error,
            other_error: self.other_error,
        })
    }
}

/// Aggregates raw rows into [`ProjectMetrics`]
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    granularity: Granularity,
    offset: FixedOffset,
}

impl Aggregator {
    /// Create an aggregator bucketing by `granularity` in the timezone `offset`
    pub fn new(granularity: Granularity, offset: FixedOffset) -> Self {
        Self {
            granularity,
            offset,
        }
    }

    /// Bucket width
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Bucket a row falls into
    pub fn bucket_of(&self, row: &RawEvent) -> Bucket {
        Bucket::containing(row.timestamp, self.granularity, self.offset)
    }

    /// Group rows by (project, bucket) and summarize each group.
    ///
    /// Output is ordered by project, then bucket. Groups whose total is zero
    /// are omitted.
    pub fn aggregate(&self, rows: &[RawEvent]) -> AggregateReport {
        let mut groups: BTreeMap<(String, Bucket), Tally> = BTreeMap::new();
        let mut rejected = 0usize;

        for row in rows {
            if let Some(reason) = row.rejection() {
                debug!(project = %row.project, reading_type = %row.reading_type, count = row.count, reason, "Rejected row");
                rejected += 1;
                continue;
            }

            let added = groups
                .entry((row.project_key().to_string(), self.bucket_of(row)))
                .or_default()
                .add(&row.reading_key(), row.count);
            if !added {
                debug!(project = %row.project, reading_type = %row.reading_type, count = row.count, "Rejected row, group sum overflow");
                rejected += 1;
            }
        }

        if rejected > 0 {
            warn!(rejected, total_rows = rows.len(), "Dropped malformed rows during aggregation");
            metrics::counter!("gatewatch_rows_rejected_total").increment(rejected as u64);
        }

        let metrics = groups
            .into_iter()
            .filter_map(|((project, bucket), tally)| tally.into_metrics(project, bucket))
            .collect();

        AggregateReport { metrics, rejected }
    }

    /// Counts of one reading type for one project, per bucket, oldest first
    pub fn series(&self, rows: &[RawEvent], project: &str, reading_type: &str) -> Vec<SeriesPoint> {
        let project = project.trim();
        let reading_type = normalize_label(reading_type);
        let mut points: BTreeMap<Bucket, i64> = BTreeMap::new();

        for row in valid_rows(rows) {
            if row.project_key() == project && row.reading_key() == reading_type {
                let count = points.entry(self.bucket_of(row)).or_default();
                *count = count.saturating_add(row.count);
            }
        }

        points
            .into_iter()
            .map(|(bucket, count)| SeriesPoint { bucket, count })
            .collect()
    }
}

/// Total per reading type for one project, largest first (ties by name)
pub fn breakdown(rows: &[RawEvent], project: &str) -> Vec<ReadingCount> {
    let project = project.trim();
    let mut counts: HashMap<String, i64> = HashMap::new();

    for row in valid_rows(rows).filter(|row| row.project_key() == project) {
        let count = counts.entry(row.reading_key()).or_default();
        *count = count.saturating_add(row.count);
    }

    let mut breakdown: Vec<ReadingCount> = counts
        .into_iter()
        .map(|(reading_type, count)| ReadingCount {
            reading_type,
            count,
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.reading_type.cmp(&b.reading_type))
    });
    breakdown
}

/// Distinct project aliases, trimmed and sorted
pub fn projects(rows: &[RawEvent]) -> Vec<String> {
    valid_rows(rows)
        .map(|row| row.project_key().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct normalized reading types, sorted
pub fn reading_types(rows: &[RawEvent]) -> Vec<String> {
    valid_rows(rows)
        .map(RawEvent::reading_key)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) fn valid_rows(rows: &[RawEvent]) -> impl Iterator<Item = &RawEvent> {
    rows.iter().filter(|row| row.rejection().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, hour, 15, 0).unwrap()
    }

    fn event(project: &str, reading_type: &str, hour: u32, count: i64) -> RawEvent {
        RawEvent::new(project, reading_type, at(hour), count)
    }

    #[test]
    fn test_aggregate_splits_error_categories() {
        let aggregator = Aggregator::new(Granularity::Day, utc());
        let rows = vec![
            event("Plaza Sur", "open", 8, 90),
            event("Plaza Sur", "open_error_500", 9, 4),
            event("Plaza Sur", "open_error_501", 10, 3),
            event("Plaza Sur", "qr_invalid", 11, 3),
        ];

        let report = aggregator.aggregate(&rows);

        assert_eq!(report.rejected, 0);
        assert_eq!(report.metrics.len(), 1);
        let m = &report.metrics[0];
        assert_eq!(m.project, "Plaza Sur");
        assert_eq!(m.bucket.to_string(), "2024-05-02");
        assert_eq!((m.total, m.correct, m.error), (100, 90, 10));
        assert_eq!((m.disconnect, m.presence_error, m.other_error), (4, 3, 3));
        assert_eq!(m.error_pct, 10);
    }

    #[test]
    fn test_overflowing_row_is_rejected() {
        let aggregator = Aggregator::new(Granularity::Day, utc());
        let rows = vec![
            event("Plaza Sur", "open_error_500", 8, i64::MAX),
            event("Plaza Sur", "qr_invalid", 9, 1),
            event("Plaza Sur", "open", 10, 1),
        ];

        let report = aggregator.aggregate(&rows);

        assert_eq!(report.rejected, 2);
        let m = &report.metrics[0];
        assert_eq!((m.total, m.correct, m.error), (i64::MAX, 0, i64::MAX));
        assert_eq!(m.disconnect + m.presence_error + m.other_error, m.error);
        assert_eq!(m.error_pct, 100);
    }

    #[test]
    fn test_error_pct_truncates() {
        let aggregator = Aggregator::new(Granularity::Day, utc());
        // 2 / 3 = 66.67% -> 66
        let rows = vec![event("A", "open", 1, 1), event("A", "open_error_500", 1, 2)];

        let report = aggregator.aggregate(&rows);

        assert_eq!(report.metrics[0].error_pct, 66);
    }

    #[test]
    fn test_reading_types_are_normalized() {
        let aggregator = Aggregator::new(Granularity::Day, utc());
        let rows = vec![event(" A ", " Open ", 1, 5), event("A", "OPEN_ERROR_501", 2, 5)];

        let report = aggregator.aggregate(&rows);

        assert_eq!(report.metrics.len(), 1);
        assert_eq!(report.metrics[0].correct, 5);
        assert_eq!(report.metrics[0].presence_error, 5);
    }

    #[test]
    fn test_hourly_buckets() {
        let aggregator = Aggregator::new(Granularity::Hour, utc());
        let rows = vec![
            event("A", "open", 9, 10),
            event("A", "open_error_500", 10, 1),
            event("A", "open", 10, 9),
        ];

        let report = aggregator.aggregate(&rows);

        let buckets: Vec<String> = report.metrics.iter().map(|m| m.bucket.to_string()).collect();
        assert_eq!(buckets, vec!["2024-05-02 09:00", "2024-05-02 10:00"]);
        assert_eq!(report.metrics[1].error_pct, 10);
    }

    #[test]
    fn test_zero_total_groups_are_omitted() {
        let aggregator = Aggregator::new(Granularity::Day, utc());
        let rows = vec![event("Idle", "open", 1, 0), event("Busy", "open", 1, 3)];

        let report = aggregator.aggregate(&rows);

        assert_eq!(report.metrics.len(), 1);
        assert_eq!(report.metrics[0].project, "Busy");
    }

    #[test]
    fn test_malformed_rows_are_counted_and_skipped() {
        let aggregator = Aggregator::new(Granularity::Day, utc());
        let rows = vec![
            event("", "open", 1, 3),
            event("A", "open", 1, -2),
            event("A", "open", 1, 4),
        ];

        let report = aggregator.aggregate(&rows);

        assert_eq!(report.rejected, 2);
        assert_eq!(report.metrics[0].total, 4);
    }

    #[test]
    fn test_breakdown_orders_by_count() {
        let rows = vec![
            event("A", "open", 1, 50),
            event("A", "open_error_500", 1, 7),
            event("A", "open_error_501", 2, 7),
            event("A", "Open", 3, 5),
            event("B", "open", 1, 500),
        ];

        let breakdown = breakdown(&rows, "A");

        assert_eq!(
            breakdown,
            vec![
                ReadingCount { reading_type: "open".into(), count: 55 },
                ReadingCount { reading_type: "open_error_500".into(), count: 7 },
                ReadingCount { reading_type: "open_error_501".into(), count: 7 },
            ]
        );
    }

    #[test]
    fn test_series_follows_bucket_order() {
        let aggregator = Aggregator::new(Granularity::Hour, utc());
        let rows = vec![
            event("A", "open_error_500", 12, 2),
            event("A", "open_error_500", 8, 1),
            event("A", "open_error_500", 12, 3),
            event("A", "open", 8, 40),
        ];

        let series = aggregator.series(&rows, "A", "open_error_500");

        let points: Vec<(String, i64)> = series.iter().map(|p| (p.bucket.to_string(), p.count)).collect();
        assert_eq!(
            points,
            vec![("2024-05-02 08:00".to_string(), 1), ("2024-05-02 12:00".to_string(), 5)]
        );
    }

    #[test]
    fn test_distinct_listings() {
        let rows = vec![
            event("B ", " open", 1, 1),
            event("A", "open ", 1, 1),
            event("A", "open_error_500", 1, 1),
        ];

        assert_eq!(projects(&rows), vec!["A", "B"]);
        assert_eq!(reading_types(&rows), vec!["open", "open_error_500"]);
    }

    fn arb_event() -> impl Strategy<Value = RawEvent> {
        (
            prop::sample::select(vec!["A", "B", "C", ""]),
            prop::sample::select(vec!["open", "open_error_500", "open_error_501", "timeout"]),
            0u32..24,
            -5i64..1_000,
        )
            .prop_map(|(project, reading_type, hour, count)| event(project, reading_type, hour, count))
    }

    proptest! {
        #[test]
        fn prop_metrics_invariants(rows in prop::collection::vec(arb_event(), 0..64)) {
            let aggregator = Aggregator::new(Granularity::Hour, utc());
            let report = aggregator.aggregate(&rows);

            for m in &report.metrics {
                prop_assert!(m.total > 0);
                prop_assert_eq!(m.correct + m.error, m.total);
                prop_assert_eq!(m.disconnect + m.presence_error + m.other_error, m.error);
                prop_assert!((0..=100).contains(&m.error_pct));
            }
            let malformed = rows.iter().filter(|r| r.rejection().is_some()).count();
            prop_assert_eq!(report.rejected, malformed);
        }

        #[test]
        fn prop_aggregate_is_idempotent(rows in prop::collection::vec(arb_event(), 0..64)) {
            let aggregator = Aggregator::new(Granularity::Day, utc());
            prop_assert_eq!(aggregator.aggregate(&rows), aggregator.aggregate(&rows));
        }
    }
}
