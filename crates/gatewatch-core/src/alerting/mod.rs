//! Alerting for Gatewatch
//!
//! Threshold gating with cooldown, notification delivery, and the periodic
//! monitor that ties a metrics source to both.

mod gate;
mod monitor;
mod notifier;

pub use gate::{compose_message, AlertGate, DEFAULT_THRESHOLD_PCT};
pub use monitor::{CycleOutcome, Monitor, MonitorSettings, ScopeSnapshot};
pub use notifier::{
    build_notifier, LogNotifier, NotificationResult, Notifier, TelegramNotifier, WebhookNotifier,
};
