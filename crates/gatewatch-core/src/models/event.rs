//! Raw gate events and the time bucketing applied to them

use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Reading type recorded for a successful open
pub const OPEN: &str = "open";

/// Reading type recorded when the gate controller was unreachable
pub const DISCONNECT: &str = "open_error_500";

/// Reading type recorded when no vehicle/person was detected at the gate
pub const PRESENCE_ERROR: &str = "open_error_501";

/// Normalize a free-form label: surrounding whitespace removed, lowercased.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Which gate log a scope reads from
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ServiceType {
    /// Access-control gates
    AccessControl,
    /// Digital parking gates
    DigitalParking,
}

impl ServiceType {
    /// All known service types
    pub const ALL: [ServiceType; 2] = [ServiceType::AccessControl, ServiceType::DigitalParking];

    /// Stable identifier used in logs, metrics labels and the API
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessControl => "access_control",
            Self::DigitalParking => "digital_parking",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pre-summed row from the metrics source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Project (site) alias
    pub project: String,

    /// Outcome code of the reading
    pub reading_type: String,

    /// Start of the time bucket the row was summed over
    pub timestamp: DateTime<Utc>,

    /// Number of readings
    pub count: i64,
}

impl RawEvent {
    /// Create a new raw event
    pub fn new(
        project: impl Into<String>,
        reading_type: impl Into<String>,
        timestamp: DateTime<Utc>,
        count: i64,
    ) -> Self {
        Self {
            project: project.into(),
            reading_type: reading_type.into(),
            timestamp,
            count,
        }
    }

    /// Project alias with surrounding whitespace removed
    pub fn project_key(&self) -> &str {
        self.project.trim()
    }

    /// Normalized reading type
    pub fn reading_key(&self) -> String {
        normalize_label(&self.reading_type)
    }

    /// Why this row cannot be aggregated, if it can't
    pub fn rejection(&self) -> Option<&'static str> {
        if self.project_key().is_empty() {
            Some("empty project")
        } else if self.count < 0 {
            Some("negative count")
        } else {
            None
        }
    }
}

/// Width of a time bucket
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One bucket per hour
    Hour,
    /// One bucket per calendar day
    #[default]
    Day,
    /// One bucket per calendar month
    Month,
}

/// A truncated point in local (reporting) time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bucket {
    start: NaiveDateTime,
    granularity: Granularity,
}

impl Bucket {
    /// Bucket containing `timestamp`, in the reporting timezone given by `offset`
    pub fn containing(timestamp: DateTime<Utc>, granularity: Granularity, offset: FixedOffset) -> Self {
        let local = timestamp.with_timezone(&offset).naive_local();
        let date = match granularity {
            Granularity::Month => local.date().with_day(1).unwrap_or(local.date()),
            Granularity::Hour | Granularity::Day => local.date(),
        };
        let hour = match granularity {
            Granularity::Hour => local.hour(),
            Granularity::Day | Granularity::Month => 0,
        };

        Self {
            start: date.and_hms_opt(hour, 0, 0).unwrap_or(local),
            granularity,
        }
    }

    /// First local instant covered by the bucket
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Width of the bucket
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self.granularity {
            Granularity::Hour => "%Y-%m-%d %H:00",
            Granularity::Day => "%Y-%m-%d",
            Granularity::Month => "%Y-%m",
        };
        write!(f, "{}", self.start.format(pattern))
    }
}

impl Serialize for Bucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Inclusive range of local calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day (inclusive)
    pub start: NaiveDate,
    /// Last day (inclusive)
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> crate::Result<Self> {
        if start > end {
            return Err(crate::Error::invalid_argument(format!(
                "date range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// A single local day
    pub fn day(date: NaiveDate) -> Self {
        Self {
            start: date,
            end: date,
        }
    }

    /// The local day containing `now`
    pub fn today(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::day(now.with_timezone(&offset).date_naive())
    }

    /// Whether `timestamp` falls on a day inside the range
    pub fn contains(&self, timestamp: DateTime<Utc>, offset: FixedOffset) -> bool {
        let date = timestamp.with_timezone(&offset).date_naive();
        self.start <= date && date <= self.end
    }
}

/// Which projects a fetch covers
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectFilter {
    /// Every project
    #[default]
    All,
    /// A single project alias
    Project(String),
}

impl ProjectFilter {
    /// Parse a filter; `*` or an empty string select every project
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "*" => Self::All,
            project => Self::Project(project.to_string()),
        }
    }

    /// Whether a project alias passes the filter
    pub fn matches(&self, project: &str) -> bool {
        match self {
            Self::All => true,
            Self::Project(name) => name.trim() == project.trim(),
        }
    }
}

impl fmt::Display for ProjectFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Project(name) => f.write_str(name),
        }
    }
}
