//! Threshold alert gate with cooldown-based deduplication

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertDecision, AlertPhase, AlertState, GateStatus, ProjectMetrics, ServiceType,
};

/// Default error percentage a project must exceed
pub const DEFAULT_THRESHOLD_PCT: f64 = 5.0;

/// Decides whether a new alert fires for one monitored scope.
///
/// The gate is `Idle` until it fires, then stays in `Cooldown` until
/// `now - last_sent_at >= cooldown`. The phase is recomputed from the
/// caller-supplied `now` on every call; a clock that jumps forward can end a
/// cooldown early and is not guarded against.
///
/// The gate never delivers anything itself. On [`AlertDecision::Fire`] the
/// state has already moved to `Cooldown`, whether or not the caller's
/// delivery later succeeds.
#[derive(Debug, Clone)]
pub struct AlertGate {
    service: ServiceType,
    state: AlertState,
}

impl AlertGate {
    /// Create an idle gate
    pub fn new(service: ServiceType, cooldown: Duration) -> Self {
        Self {
            service,
            state: AlertState::new(cooldown),
        }
    }

    /// Scope this gate guards
    pub fn service(&self) -> ServiceType {
        self.service
    }

    /// Current bookkeeping
    pub fn state(&self) -> &AlertState {
        &self.state
    }

    /// Read-only view as of `now`
    pub fn status(&self, now: DateTime<Utc>) -> GateStatus {
        GateStatus {
            service: self.service,
            phase: self.state.phase(now),
            last_sent_at: self.state.last_sent_at,
            cooldown_seconds: self.state.cooldown.num_seconds(),
        }
    }

    /// Compare `metrics` against `threshold_pct` and decide what to do.
    ///
    /// Only a `Fire` decision mutates the gate.
    pub fn evaluate(
        &mut self,
        metrics: &[ProjectMetrics],
        threshold_pct: f64,
        now: DateTime<Utc>,
    ) -> Result<AlertDecision> {
        if !threshold_pct.is_finite() || threshold_pct < 0.0 {
            return Err(Error::invalid_argument(format!(
                "threshold must be a non-negative number, got {threshold_pct}"
            )));
        }

        let violations: Vec<ProjectMetrics> = metrics
            .iter()
            .filter(|m| m.exceeds(threshold_pct))
            .cloned()
            .collect();

        if violations.is_empty() {
            return Ok(AlertDecision::NoAlert);
        }

        if let AlertPhase::Cooldown { until } = self.state.phase(now) {
            debug!(
                service = %self.service,
                violations = violations.len(),
                until = %until,
                "Alert suppressed during cooldown"
            );
            return Ok(AlertDecision::Suppressed(violations));
        }

        self.state.last_sent_at = Some(now);

        let alert = Alert {
            id: Uuid::new_v4(),
            service: self.service,
            triggered_at: now,
            threshold_pct,
            message: compose_message(&violations, threshold_pct),
            violations,
        };

        info!(
            service = %self.service,
            alert_id = %alert.id,
            violations = alert.violations.len(),
            "Alert triggered"
        );

        Ok(AlertDecision::Fire(alert))
    }
}

/// Format the alert text: a banner line, then one line per violation
pub fn compose_message(violations: &[ProjectMetrics], threshold_pct: f64) -> String {
    let noun = if violations.len() == 1 {
        "project"
    } else {
        "projects"
    };
    let mut message = format!(
        "{} {} exceeded the error threshold of {}%:\n",
        violations.len(),
        noun,
        threshold_pct
    );

    let lines: Vec<String> = violations
        .iter()
        .map(|m| format!("{}: {}% error", m.project, m.error_pct))
        .collect();
    message.push('\n');
    message.push_str(&lines.join("\n"));
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bucket, Granularity};
    use chrono::{FixedOffset, TimeZone};
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap()
    }

    fn metrics(project: &str, error_pct: i64) -> ProjectMetrics {
        let total = 100;
        ProjectMetrics {
            project: project.to_string(),
            bucket: Bucket::containing(t0(), Granularity::Day, FixedOffset::east_opt(0).unwrap()),
            total,
            correct: total - error_pct,
            error: error_pct,
            error_pct,
            disconnect: error_pct,
            presence_error: 0,
            other_error: 0,
        }
    }

    fn gate() -> AlertGate {
        AlertGate::new(ServiceType::AccessControl, Duration::seconds(3600))
    }

    #[test]
    fn test_fire_then_suppress_then_fire_after_cooldown() {
        let mut gate = gate();
        let current = vec![metrics("A", 10)];

        let first = gate.evaluate(&current, 5.0, t0()).unwrap();
        assert!(matches!(first, AlertDecision::Fire(_)));
        assert_eq!(gate.state().last_sent_at, Some(t0()));

        let worse = vec![metrics("A", 30), metrics("B", 9)];
        let second = gate.evaluate(&worse, 5.0, t0() + Duration::seconds(1)).unwrap();
        assert_eq!(second.label(), "suppressed");
        assert_eq!(second.violations().len(), 2);
        assert_eq!(gate.state().last_sent_at, Some(t0()));

        let third = gate.evaluate(&current, 5.0, t0() + Duration::seconds(3601)).unwrap();
        assert!(matches!(third, AlertDecision::Fire(_)));
        assert_eq!(gate.state().last_sent_at, Some(t0() + Duration::seconds(3601)));
    }

    #[test]
    fn test_cooldown_ends_exactly_at_boundary() {
        let mut gate = gate();
        let current = vec![metrics("A", 10)];
        gate.evaluate(&current, 5.0, t0()).unwrap();

        let at_boundary = gate.evaluate(&current, 5.0, t0() + Duration::seconds(3600)).unwrap();

        assert_eq!(at_boundary.label(), "fire");
    }

    #[test]
    fn test_no_violation_never_mutates_state() {
        let mut gate = gate();
        gate.evaluate(&[metrics("A", 10)], 5.0, t0()).unwrap();

        let calm = gate.evaluate(&[metrics("A", 2)], 5.0, t0() + Duration::seconds(10)).unwrap();
        assert_eq!(calm, AlertDecision::NoAlert);
        assert_eq!(gate.state().last_sent_at, Some(t0()));

        let mut idle = self::gate();
        let empty = idle.evaluate(&[], 5.0, t0()).unwrap();
        assert_eq!(empty, AlertDecision::NoAlert);
        assert_eq!(idle.state().last_sent_at, None);
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut gate = gate();

        let at_threshold = gate.evaluate(&[metrics("X", 5)], 5.0, t0()).unwrap();
        assert_eq!(at_threshold, AlertDecision::NoAlert);

        let above = gate.evaluate(&[metrics("X", 6)], 5.0, t0()).unwrap();
        assert_eq!(above.label(), "fire");
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut gate = gate();
        for threshold in [f64::NAN, f64::INFINITY, -1.0] {
            let err = gate.evaluate(&[metrics("A", 50)], threshold, t0()).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)));
        }
        assert_eq!(gate.state().last_sent_at, None);
    }

    #[test]
    fn test_status_reports_phase() {
        let mut gate = gate();
        assert_eq!(gate.status(t0()).phase, AlertPhase::Idle);

        gate.evaluate(&[metrics("A", 10)], 5.0, t0()).unwrap();

        let status = gate.status(t0() + Duration::seconds(60));
        assert_eq!(
            status.phase,
            AlertPhase::Cooldown {
                until: t0() + Duration::seconds(3600)
            }
        );
        assert_eq!(status.cooldown_seconds, 3600);
    }

    #[test]
    fn test_compose_message() {
        let message = compose_message(&[metrics("Plaza Sur", 12), metrics("Torre", 7)], 5.0);

        assert_eq!(
            message,
            "2 projects exceeded the error threshold of 5%:\n\nPlaza Sur: 12% error\nTorre: 7% error"
        );
    }

    #[test]
    fn test_fired_alert_carries_message() {
        let mut gate = gate();

        let AlertDecision::Fire(alert) = gate.evaluate(&[metrics("Norte", 40)], 5.0, t0()).unwrap() else {
            panic!("expected the gate to fire");
        };

        assert_eq!(alert.service, ServiceType::AccessControl);
        assert_eq!(alert.triggered_at, t0());
        assert!(alert.message.starts_with("1 project exceeded the error threshold"));
        assert!(alert.message.ends_with("Norte: 40% error"));
    }
}
