//! Alert data models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::ServiceType;
use super::metrics::ProjectMetrics;

/// Default minimum time between two deliveries
pub const DEFAULT_COOLDOWN_SECONDS: i64 = 3600;

/// Phase of an alert gate at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum AlertPhase {
    /// Nothing sent within the cooldown window
    Idle,
    /// An alert went out recently; further ones are suppressed until `until`
    Cooldown {
        /// End of the cooldown window
        until: DateTime<Utc>,
    },
}

/// Delivery bookkeeping for one monitored scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertState {
    /// When the last alert fired
    pub last_sent_at: Option<DateTime<Utc>>,

    /// Minimum time between two fires
    pub cooldown: Duration,
}

impl Default for AlertState {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_COOLDOWN_SECONDS))
    }
}

impl AlertState {
    /// Fresh state with nothing sent yet
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_sent_at: None,
            cooldown,
        }
    }

    /// Phase as of `now`. Recomputed on every call; there is no timer.
    ///
    /// A cooldown ending past the representable range reports
    /// `DateTime::<Utc>::MAX_UTC` as its end.
    pub fn phase(&self, now: DateTime<Utc>) -> AlertPhase {
        match self.last_sent_at {
            Some(sent) if now - sent < self.cooldown => AlertPhase::Cooldown {
                until: sent
                    .checked_add_signed(self.cooldown)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
            _ => AlertPhase::Idle,
        }
    }
}

/// A composed alert, ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Unique identifier
    pub id: Uuid,

    /// Scope the alert was raised for
    pub service: ServiceType,

    /// When the gate fired
    pub triggered_at: DateTime<Utc>,

    /// Threshold in effect
    pub threshold_pct: f64,

    /// Metrics that crossed the threshold
    pub violations: Vec<ProjectMetrics>,

    /// Human-readable message
    pub message: String,
}

/// Outcome of one gate evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    /// No project above the threshold
    NoAlert,
    /// Violations present but the gate is cooling down
    Suppressed(Vec<ProjectMetrics>),
    /// Deliver this alert; the gate has already entered cooldown
    Fire(Alert),
}

impl AlertDecision {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoAlert => "no_alert",
            Self::Suppressed(_) => "suppressed",
            Self::Fire(_) => "fire",
        }
    }

    /// Violating metrics carried by the decision
    pub fn violations(&self) -> &[ProjectMetrics] {
        match self {
            Self::NoAlert => &[],
            Self::Suppressed(violations) => violations,
            Self::Fire(alert) => &alert.violations,
        }
    }
}

/// Read-only view of a gate for the API and CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateStatus {
    /// Scope the gate guards
    pub service: ServiceType,
    /// Phase as of the time the status was taken
    #[serde(flatten)]
    pub phase: AlertPhase,
    /// When the last alert fired
    pub last_sent_at: Option<DateTime<Utc>>,
    /// Configured cooldown
    pub cooldown_seconds: i64,
}

/// Record of a delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    /// Channel type
    pub channel_type: String,

    /// When it was sent
    pub sent_at: DateTime<Utc>,

    /// Whether it succeeded
    pub success: bool,

    /// Error message if failed
    pub error: Option<String>,
}
