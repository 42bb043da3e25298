//! Data models for Gatewatch

mod alert;
mod event;
mod metrics;
mod ranking;

pub use alert::*;
pub use event::*;
pub use metrics::*;
pub use ranking::*;
