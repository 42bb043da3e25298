//! Engine module - pure metric aggregation and ranking
//!
//! Raw rows from a [`MetricsSource`](crate::source::MetricsSource) are folded
//! into per-project error metrics by the [`Aggregator`] and pivoted into a
//! project × reading-type matrix that the [`Ranker`] orders by successful
//! opens. Nothing in here performs I/O or keeps state between calls.

mod aggregator;
mod ranker;

pub use aggregator::{breakdown, projects, reading_types, Aggregator};
pub use ranker::{matrix, pivot, top_n, Ranker, DEFAULT_OPEN_MARKER};
