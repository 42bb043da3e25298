//! File-backed metrics source for offline runs and replays
//!
//! Reads `<dir>/<service>.json`, which holds either a JSON array of rows or
//! one JSON row per line. Undecodable lines are skipped and counted; a
//! malformed array fails the whole read.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::RawEvent;

use super::{FetchRequest, MetricsSource};

/// Metrics source reading exported rows from disk
#[derive(Debug, Clone)]
pub struct FileMetricsSource {
    dir: PathBuf,
    offset: FixedOffset,
}

impl FileMetricsSource {
    /// Create a source reading from `dir`; date ranges are interpreted in UTC
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            offset: Utc.fix(),
        }
    }

    /// Interpret date ranges in the given timezone
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    fn path_for(&self, request: &FetchRequest) -> PathBuf {
        self.dir.join(format!("{}.json", request.service))
    }
}

fn parse_rows(content: &str) -> Result<Vec<RawEvent>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut rows = Vec::new();
    let mut skipped = 0u64;
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!(line = idx + 1, error = %e, "Skipping undecodable reading line");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        metrics::counter!("gatewatch_source_lines_skipped_total").increment(skipped);
    }
    Ok(rows)
}

#[async_trait]
impl MetricsSource for FileMetricsSource {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawEvent>> {
        let path = self.path_for(request);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::upstream("metrics source", format!("cannot read {}: {e}", path.display()))
        })?;

        let rows: Vec<RawEvent> = parse_rows(&content)?
            .into_iter()
            .filter(|row| request.project.matches(&row.project))
            .filter(|row| request.range.contains(row.timestamp, self.offset))
            .collect();

        debug!(path = %path.display(), rows = rows.len(), "Loaded readings from file");
        Ok(rows)
    }
}
