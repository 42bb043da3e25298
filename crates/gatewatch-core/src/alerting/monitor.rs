//! Periodic evaluation loop
//!
//! Every tick, each configured service scope runs one cycle:
//! fetch → aggregate → rank → gate → (on fire) notify. Source and notifier
//! calls carry a deadline. A failed or panicking cycle is logged and the loop
//! carries on at the next tick; nothing is retried in between.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::{Aggregator, Ranker};
use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertDecision, DateRange, GateStatus, Granularity, NotificationRecord, ProjectFilter,
    ProjectMetrics, RankMatrix, ServiceType,
};
use crate::source::{FetchRequest, MetricsSource};

use super::gate::AlertGate;
use super::notifier::{NotificationResult, Notifier};

/// Monitor tuning, resolved from [`Config`]
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Error percentage a project must strictly exceed
    pub threshold_pct: f64,
    /// Minimum time between two alerts of one scope
    pub cooldown: Duration,
    /// Time between ticks
    pub interval: StdDuration,
    /// Deadline for each source fetch and notifier send
    pub upstream_timeout: StdDuration,
    /// Scopes evaluated each tick
    pub services: Vec<ServiceType>,
    /// Bucket width for alerting
    pub granularity: Granularity,
    /// Reporting timezone
    pub offset: FixedOffset,
    /// Top-N ranking applied to each cycle's rows
    pub ranker: Ranker,
}

impl MonitorSettings {
    /// Resolve settings from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let cooldown = i64::try_from(config.alerting.cooldown_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| Error::config("alerting.cooldown_seconds is too large"))?;

        Ok(Self {
            threshold_pct: config.alerting.threshold_pct,
            cooldown,
            interval: StdDuration::from_secs(config.monitor.interval_seconds),
            upstream_timeout: StdDuration::from_secs(config.monitor.upstream_timeout_seconds),
            services: config.monitor.services.clone(),
            granularity: config.monitor.granularity,
            offset: config.monitor.utc_offset()?,
            ranker: Ranker::new(config.ranking.open_marker.clone(), config.ranking.top_n)?,
        })
    }
}

/// What the last cycle of a scope produced
#[derive(Debug, Clone, Serialize)]
pub struct ScopeSnapshot {
    /// Scope evaluated
    pub service: ServiceType,
    /// `now` of the cycle
    pub evaluated_at: DateTime<Utc>,
    /// Per-project metrics of today's window
    pub metrics: Vec<ProjectMetrics>,
    /// Rows dropped as malformed
    pub rejected: usize,
    /// Top-N matrix of the same rows
    pub ranking: RankMatrix,
    /// Gate decision label
    pub decision: &'static str,
    /// Projects above the threshold
    pub violations: usize,
    /// Most recent delivery attempt, from this or an earlier cycle
    pub last_notification: Option<NotificationRecord>,
}

/// Result of one cycle
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Scope evaluated
    pub service: ServiceType,
    /// What the gate decided
    pub decision: AlertDecision,
    /// Rows dropped as malformed
    pub rejected: usize,
    /// Delivery attempt, present only when the gate fired
    pub notification: Option<NotificationRecord>,
}

/// Owns one alert gate per scope and drives the evaluation cycles
pub struct Monitor {
    source: Arc<dyn MetricsSource>,
    notifier: Arc<dyn Notifier>,
    settings: MonitorSettings,
    /// One gate per scope; the map entry lock serializes evaluations
    gates: DashMap<ServiceType, AlertGate>,
    snapshots: RwLock<HashMap<ServiceType, ScopeSnapshot>>,
}

impl Monitor {
    /// Create a new monitor
    pub fn new(
        source: Arc<dyn MetricsSource>,
        notifier: Arc<dyn Notifier>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            settings,
            gates: DashMap::new(),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// Resolved settings
    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Run cycles on a fixed interval, forever
    pub async fn start(&self) {
        info!(
            interval = %humantime::format_duration(self.settings.interval),
            services = ?self.settings.services,
            threshold_pct = self.settings.threshold_pct,
            "Starting monitor"
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick(Utc::now()).await;
        }
    }

    /// Run one cycle for every scope, containing any failure
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<CycleOutcome> {
        let mut outcomes = Vec::with_capacity(self.settings.services.len());

        for &service in &self.settings.services {
            metrics::counter!("gatewatch_cycles_total", "service" => service.as_str()).increment(1);

            match AssertUnwindSafe(self.run_cycle(service, now)).catch_unwind().await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    metrics::counter!("gatewatch_cycle_failures_total", "service" => service.as_str())
                        .increment(1);
                    if e.is_transient() {
                        warn!(service = %service, error = %e, "Cycle skipped, will retry next tick");
                    } else {
                        error!(service = %service, error = %e, "Cycle failed");
                    }
                }
                Err(_) => {
                    metrics::counter!("gatewatch_cycle_failures_total", "service" => service.as_str())
                        .increment(1);
                    error!(service = %service, "Cycle panicked");
                }
            }
        }

        outcomes
    }

    /// Evaluate a single scope as of `now`
    pub async fn run_cycle(&self, service: ServiceType, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let request = FetchRequest {
            service,
            project: ProjectFilter::All,
            range: DateRange::today(now, self.settings.offset),
            group_by: self.settings.granularity,
        };

        let rows = with_timeout(
            "metrics source",
            self.settings.upstream_timeout,
            self.source.fetch(&request),
        )
        .await?;

        let report = Aggregator::new(self.settings.granularity, self.settings.offset).aggregate(&rows);
        let ranking = self.settings.ranker.rank(&rows)?;

        let decision = {
            let mut gate = self
                .gates
                .entry(service)
                .or_insert_with(|| AlertGate::new(service, self.settings.cooldown));
            gate.evaluate(&report.metrics, self.settings.threshold_pct, now)?
        };

        debug!(
            service = %service,
            source = self.source.name(),
            rows = rows.len(),
            projects = report.metrics.len(),
            decision = decision.label(),
            "Cycle evaluated"
        );
        metrics::counter!(
            "gatewatch_alert_decisions_total",
            "service" => service.as_str(),
            "decision" => decision.label()
        )
        .increment(1);

        let notification = match &decision {
            AlertDecision::Fire(alert) => Some(self.deliver(alert).await),
            AlertDecision::NoAlert | AlertDecision::Suppressed(_) => None,
        };

        let mut snapshots = self.snapshots.write().await;
        let last_notification = notification
            .clone()
            .or_else(|| snapshots.get(&service).and_then(|s| s.last_notification.clone()));
        snapshots.insert(
            service,
            ScopeSnapshot {
                service,
                evaluated_at: now,
                metrics: report.metrics,
                rejected: report.rejected,
                ranking,
                decision: decision.label(),
                violations: decision.violations().len(),
                last_notification,
            },
        );
        drop(snapshots);

        Ok(CycleOutcome {
            service,
            decision,
            rejected: report.rejected,
            notification,
        })
    }

    /// Send a fired alert. Failure is logged and recorded; the gate stays in cooldown.
    async fn deliver(&self, alert: &Alert) -> NotificationRecord {
        let sent_at = Utc::now();
        let result = with_timeout(
            "notifier",
            self.settings.upstream_timeout,
            self.notifier.send(&alert.message),
        )
        .await;

        match &result {
            Ok(()) => info!(
                service = %alert.service,
                alert_id = %alert.id,
                channel = self.notifier.channel(),
                "Alert delivered"
            ),
            Err(e) => {
                metrics::counter!("gatewatch_notifier_failures_total", "channel" => self.notifier.channel())
                    .increment(1);
                error!(
                    service = %alert.service,
                    alert_id = %alert.id,
                    channel = self.notifier.channel(),
                    error = %e,
                    "Alert delivery failed"
                );
            }
        }

        NotificationResult {
            channel_type: self.notifier.channel().to_string(),
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            sent_at,
        }
        .into()
    }

    /// Gate status for every configured scope
    pub fn gate_status(&self, now: DateTime<Utc>) -> Vec<GateStatus> {
        self.settings
            .services
            .iter()
            .map(|&service| match self.gates.get(&service) {
                Some(gate) => gate.status(now),
                None => AlertGate::new(service, self.settings.cooldown).status(now),
            })
            .collect()
    }

    /// Latest snapshot per scope, optionally filtered, in configured order
    pub async fn snapshots(&self, service: Option<ServiceType>) -> Vec<ScopeSnapshot> {
        let snapshots = self.snapshots.read().await;
        self.settings
            .services
            .iter()
            .filter(|s| service.map_or(true, |wanted| wanted == **s))
            .filter_map(|s| snapshots.get(s).cloned())
            .collect()
    }
}

async fn with_timeout<T>(
    component: &str,
    after: StdDuration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, call)
        .await
        .map_err(|_| Error::timeout(component, after))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawEvent;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Source returning whatever rows the test last set
    #[derive(Default)]
    struct StaticSource {
        rows: Mutex<Vec<RawEvent>>,
        fail: Mutex<bool>,
    }

    impl StaticSource {
        fn set(&self, rows: Vec<RawEvent>) {
            *self.rows.lock().unwrap() = rows;
        }
    }

    #[async_trait]
    impl MetricsSource for StaticSource {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn fetch(&self, _request: &FetchRequest) -> Result<Vec<RawEvent>> {
            if *self.fail.lock().unwrap() {
                return Err(Error::upstream("metrics source", "offline"));
            }
            Ok(self.rows.lock().unwrap().clone())
        }
    }

    struct SlowSource;

    #[async_trait]
    impl MetricsSource for SlowSource {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn fetch(&self, _request: &FetchRequest) -> Result<Vec<RawEvent>> {
            tokio::time::sleep(StdDuration::from_secs(3600)).await;
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        fn channel(&self) -> &'static str {
            "counting"
        }

        async fn send(&self, _text: &str) -> Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::upstream("notifier", "chat unreachable"));
            }
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 18, 0, 0).unwrap()
    }

    fn settings(services: Vec<ServiceType>) -> MonitorSettings {
        let mut config = Config::default();
        config.monitor.services = services;
        config.monitor.utc_offset_hours = 0;
        MonitorSettings::from_config(&config).unwrap()
    }

    fn readings(open: i64, failed: i64) -> Vec<RawEvent> {
        vec![
            RawEvent::new("X", "open", t0(), open),
            RawEvent::new("X", "open_error_500", t0(), failed),
        ]
    }

    #[tokio::test]
    async fn test_fires_once_per_cooldown() {
        let source = Arc::new(StaticSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let monitor = Monitor::new(
            source.clone(),
            notifier.clone(),
            settings(vec![ServiceType::AccessControl]),
        );
        source.set(readings(90, 10));

        let first = monitor.run_cycle(ServiceType::AccessControl, t0()).await.unwrap();
        let second = monitor
            .run_cycle(ServiceType::AccessControl, t0() + Duration::seconds(60))
            .await
            .unwrap();
        let third = monitor
            .run_cycle(ServiceType::AccessControl, t0() + Duration::seconds(3601))
            .await
            .unwrap();

        assert_eq!(first.decision.label(), "fire");
        assert!(first.notification.as_ref().unwrap().success);
        assert_eq!(second.decision.label(), "suppressed");
        assert!(second.notification.is_none());
        assert_eq!(third.decision.label(), "fire");
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_delivery_still_starts_cooldown() {
        let source = Arc::new(StaticSource::default());
        let notifier = Arc::new(CountingNotifier {
            fail: true,
            ..CountingNotifier::default()
        });
        let monitor = Monitor::new(
            source.clone(),
            notifier.clone(),
            settings(vec![ServiceType::AccessControl]),
        );
        source.set(readings(50, 50));

        let first = monitor.run_cycle(ServiceType::AccessControl, t0()).await.unwrap();
        let record = first.notification.unwrap();
        assert!(!record.success);
        assert!(record.error.unwrap().contains("chat unreachable"));

        let second = monitor
            .run_cycle(ServiceType::AccessControl, t0() + Duration::seconds(5))
            .await
            .unwrap();
        assert_eq!(second.decision.label(), "suppressed");
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scopes_have_independent_gates() {
        let source = Arc::new(StaticSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let monitor = Monitor::new(
            source.clone(),
            notifier.clone(),
            settings(ServiceType::ALL.to_vec()),
        );
        source.set(readings(80, 20));

        let outcomes = monitor.tick(t0()).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.decision.label() == "fire"));
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 2);

        let status = monitor.gate_status(t0());
        assert!(status.iter().all(|s| s.last_sent_at == Some(t0())));
    }

    #[tokio::test]
    async fn test_upstream_failure_skips_cycle() {
        let source = Arc::new(StaticSource::default());
        *source.fail.lock().unwrap() = true;
        let notifier = Arc::new(CountingNotifier::default());
        let monitor = Monitor::new(
            source.clone(),
            notifier.clone(),
            settings(vec![ServiceType::DigitalParking]),
        );

        let outcomes = monitor.tick(t0()).await;
        assert!(outcomes.is_empty());
        assert!(monitor.snapshots(None).await.is_empty());

        *source.fail.lock().unwrap() = false;
        source.set(readings(99, 1));
        let outcomes = monitor.tick(t0() + Duration::seconds(60)).await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].decision, AlertDecision::NoAlert);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_times_out() {
        let notifier = Arc::new(CountingNotifier::default());
        let monitor = Monitor::new(
            Arc::new(SlowSource),
            notifier,
            settings(vec![ServiceType::AccessControl]),
        );

        let err = monitor
            .run_cycle(ServiceType::AccessControl, t0())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cycles_fire_once() {
        let source = Arc::new(StaticSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let monitor = Arc::new(Monitor::new(
            source.clone(),
            notifier.clone(),
            settings(vec![ServiceType::AccessControl]),
        ));
        source.set(readings(70, 30));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let monitor = monitor.clone();
                tokio::spawn(async move {
                    monitor
                        .run_cycle(ServiceType::AccessControl, t0() + Duration::seconds(i))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut fires = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            match outcome.decision.label() {
                "fire" => fires += 1,
                label => assert_eq!(label, "suppressed"),
            }
        }

        assert_eq!(fires, 1);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_snapshot_records_cycle() {
        let source = Arc::new(StaticSource::default());
        let notifier = Arc::new(CountingNotifier::default());
        let monitor = Monitor::new(
            source.clone(),
            notifier,
            settings(vec![ServiceType::AccessControl]),
        );
        let mut rows = readings(90, 10);
        rows.push(RawEvent::new("", "open", t0(), 4));
        source.set(rows);

        monitor.run_cycle(ServiceType::AccessControl, t0()).await.unwrap();
        monitor
            .run_cycle(ServiceType::AccessControl, t0() + Duration::seconds(30))
            .await
            .unwrap();

        let snapshots = monitor.snapshots(Some(ServiceType::AccessControl)).await;
        assert_eq!(snapshots.len(), 1);
        let snapshot = &snapshots[0];
        assert_eq!(snapshot.decision, "suppressed");
        assert_eq!(snapshot.rejected, 1);
        assert_eq!(snapshot.metrics[0].error_pct, 10);
        assert_eq!(snapshot.ranking.rows[0].ranked.project, "X");
        assert!(snapshot.last_notification.as_ref().unwrap().success);
    }
}
