//! API handlers for the HTTP REST API

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerting::Monitor;
use crate::models::{GateStatus, NotificationRecord, ProjectMetrics, RankMatrix, ServiceType};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Monitor whose snapshots the routes read
    pub monitor: Arc<Monitor>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always "ok" while the server answers
    pub status: String,
    /// Crate version
    pub version: String,
    /// Scopes with at least one completed cycle
    pub scopes_evaluated: usize,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        scopes_evaluated: state.monitor.snapshots(None).await.len(),
    })
}

/// Optional scope filter shared by every endpoint
#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    /// Restrict the response to one scope
    pub service: Option<ServiceType>,
}

/// Per-project metrics of one scope's last cycle
#[derive(Serialize)]
pub struct ScopeMetrics {
    /// Scope
    pub service: ServiceType,
    /// When the cycle ran
    pub evaluated_at: DateTime<Utc>,
    /// Rows dropped during aggregation
    pub rejected: usize,
    /// Per-project metrics for the evaluation window
    pub metrics: Vec<ProjectMetrics>,
}

/// Latest per-project metrics
pub async fn get_metrics(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Json<Vec<ScopeMetrics>> {
    let scopes = state
        .monitor
        .snapshots(query.service)
        .await
        .into_iter()
        .map(|s| ScopeMetrics {
            service: s.service,
            evaluated_at: s.evaluated_at,
            rejected: s.rejected,
            metrics: s.metrics,
        })
        .collect();

    Json(scopes)
}

/// Top-N matrix of one scope's last cycle
#[derive(Serialize)]
pub struct ScopeRanking {
    /// Scope
    pub service: ServiceType,
    /// When the cycle ran
    pub evaluated_at: DateTime<Utc>,
    /// Top projects by successful opens
    pub ranking: RankMatrix,
}

/// Latest ranking
pub async fn get_ranking(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Json<Vec<ScopeRanking>> {
    let scopes = state
        .monitor
        .snapshots(query.service)
        .await
        .into_iter()
        .map(|s| ScopeRanking {
            service: s.service,
            evaluated_at: s.evaluated_at,
            ranking: s.ranking,
        })
        .collect();

    Json(scopes)
}

/// Gate state plus what the last cycle decided
#[derive(Serialize)]
pub struct ScopeAlertState {
    /// Gate phase and last fire time
    #[serde(flatten)]
    pub gate: GateStatus,
    /// Label of the last decision, if any cycle ran
    pub last_decision: Option<&'static str>,
    /// Projects over the threshold in the last cycle
    pub violations: usize,
    /// Outcome of the last delivery attempt
    pub last_notification: Option<NotificationRecord>,
}

/// Alert gate state per scope
pub async fn get_alert_state(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
) -> Json<Vec<ScopeAlertState>> {
    let snapshots = state.monitor.snapshots(query.service).await;

    let states = state
        .monitor
        .gate_status(Utc::now())
        .into_iter()
        .filter(|g| query.service.map_or(true, |wanted| wanted == g.service))
        .map(|gate| {
            let snapshot = snapshots.iter().find(|s| s.service == gate.service);
            ScopeAlertState {
                last_decision: snapshot.map(|s| s.decision),
                violations: snapshot.map_or(0, |s| s.violations),
                last_notification: snapshot.and_then(|s| s.last_notification.clone()),
                gate,
            }
        })
        .collect();

    Json(states)
}
