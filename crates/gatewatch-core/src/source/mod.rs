//! Metrics source layer for Gatewatch
//!
//! A source returns pre-summed reading counts per project, reading type and
//! time bucket. Rows arrive in no particular order and may be eventually
//! consistent; everything downstream treats them as an unordered bag.

mod file;
mod http;

pub use file::FileMetricsSource;
pub use http::HttpMetricsSource;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::config::{SourceConfig, SourceKind};
use crate::error::Result;
use crate::models::{DateRange, Granularity, ProjectFilter, RawEvent, ServiceType};

/// What to fetch from a metrics source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Which gate log to read
    pub service: ServiceType,
    /// Project alias, or every project
    pub project: ProjectFilter,
    /// Local days to cover
    pub range: DateRange,
    /// Bucket width the rows should be pre-summed at
    pub group_by: Granularity,
}

/// Supplies raw reading counts
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Fetch rows matching `request`
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawEvent>>;
}

/// Build the configured metrics source
pub fn build_source(
    config: &SourceConfig,
    timeout: Duration,
    offset: FixedOffset,
) -> Result<Arc<dyn MetricsSource>> {
    let source: Arc<dyn MetricsSource> = match config.kind {
        SourceKind::Http => Arc::new(HttpMetricsSource::from_config(config, timeout)?),
        SourceKind::File => Arc::new(FileMetricsSource::new(&config.path).with_offset(offset)),
    };
    Ok(source)
}
