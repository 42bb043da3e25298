//! # Gatewatch
//!
//! Error-rate monitoring for access-control and digital-parking gate logs.
//!
//! Gatewatch pulls pre-summed reading counts from a metrics source, computes
//! per-project error rates, ranks projects by successful opens, and sends a
//! single alert per cooldown window when any project crosses the error
//! threshold.
//!
//! ## Architecture
//!
//! - **Engine**: aggregation into per-project metrics, pivot and top-N ranking
//! - **Alerting**: cooldown gate, notifier channels, periodic monitor
//! - **Source**: HTTP and file-backed metrics sources
//! - **API**: read-only REST view of the latest cycle
//!
//! ## Quick Start
//!
//! ```bash
//! # Evaluate every scope once, logging instead of notifying
//! gatewatch check --dry-run
//!
//! # Run the monitor loop and API
//! gatewatch watch
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod report;
pub mod source;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{AlertGate, Monitor, MonitorSettings, Notifier};
    pub use crate::config::Config;
    pub use crate::engine::{Aggregator, Ranker};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::source::{FetchRequest, MetricsSource};
}
