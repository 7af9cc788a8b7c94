//! Metrics collection using Prometheus
//!
//! Counters for the lobby, registration, balancing and persistence paths.

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Main metrics collector for the lobby service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    lobby_metrics: LobbyMetrics,

    registration_metrics: RegistrationMetrics,

    storage_metrics: StorageMetrics,
}

/// Lobby-related metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    pub lobbies_created_total: IntCounter,
    pub lobbies_closed_total: IntCounter,
    /// Roster changes by action (join, leave, kick)
    pub roster_changes_total: IntCounterVec,
    /// Balance requests by outcome
    pub balance_requests_total: IntCounterVec,
    /// Requests refused, by error code
    pub lobby_errors_total: IntCounterVec,
}

/// Registration conversation metrics
#[derive(Clone)]
pub struct RegistrationMetrics {
    pub registrations_started_total: IntCounter,
    pub registrations_completed_total: IntCounter,
    pub registrations_expired_total: IntCounter,
    /// Rejected replies by step
    pub registration_rejections_total: IntCounterVec,
    /// Failed best-effort grant reconciliations
    pub grant_failures_total: IntCounter,
    pub registrations_in_progress: IntGauge,
}

/// Persistence metrics
#[derive(Clone)]
pub struct StorageMetrics {
    /// Document writes by document kind and outcome
    pub document_writes_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let lobby_metrics = LobbyMetrics {
            lobbies_created_total: IntCounter::new(
                "pug_lobbies_created_total",
                "Total lobbies created",
            )?,
            lobbies_closed_total: IntCounter::new(
                "pug_lobbies_closed_total",
                "Total lobbies closed",
            )?,
            roster_changes_total: IntCounterVec::new(
                Opts::new("pug_roster_changes_total", "Roster changes by action"),
                &["action"],
            )?,
            balance_requests_total: IntCounterVec::new(
                Opts::new("pug_balance_requests_total", "Balance requests by outcome"),
                &["outcome"],
            )?,
            lobby_errors_total: IntCounterVec::new(
                Opts::new("pug_lobby_errors_total", "Refused lobby requests by error"),
                &["code"],
            )?,
        };

        let registration_metrics = RegistrationMetrics {
            registrations_started_total: IntCounter::new(
                "pug_registrations_started_total",
                "Registration conversations started",
            )?,
            registrations_completed_total: IntCounter::new(
                "pug_registrations_completed_total",
                "Registration conversations completed",
            )?,
            registrations_expired_total: IntCounter::new(
                "pug_registrations_expired_total",
                "Registration conversations dropped after idling",
            )?,
            registration_rejections_total: IntCounterVec::new(
                Opts::new(
                    "pug_registration_rejections_total",
                    "Rejected registration replies by step",
                ),
                &["step"],
            )?,
            grant_failures_total: IntCounter::new(
                "pug_grant_failures_total",
                "Failed member grant reconciliations",
            )?,
            registrations_in_progress: IntGauge::new(
                "pug_registrations_in_progress",
                "Registration conversations currently open",
            )?,
        };

        let storage_metrics = StorageMetrics {
            document_writes_total: IntCounterVec::new(
                Opts::new("pug_document_writes_total", "Document writes by outcome"),
                &["document", "outcome"],
            )?,
        };

        registry.register(Box::new(lobby_metrics.lobbies_created_total.clone()))?;
        registry.register(Box::new(lobby_metrics.lobbies_closed_total.clone()))?;
        registry.register(Box::new(lobby_metrics.roster_changes_total.clone()))?;
        registry.register(Box::new(lobby_metrics.balance_requests_total.clone()))?;
        registry.register(Box::new(lobby_metrics.lobby_errors_total.clone()))?;
        registry.register(Box::new(
            registration_metrics.registrations_started_total.clone(),
        ))?;
        registry.register(Box::new(
            registration_metrics.registrations_completed_total.clone(),
        ))?;
        registry.register(Box::new(
            registration_metrics.registrations_expired_total.clone(),
        ))?;
        registry.register(Box::new(
            registration_metrics.registration_rejections_total.clone(),
        ))?;
        registry.register(Box::new(registration_metrics.grant_failures_total.clone()))?;
        registry.register(Box::new(
            registration_metrics.registrations_in_progress.clone(),
        ))?;
        registry.register(Box::new(storage_metrics.document_writes_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            lobby_metrics,
            registration_metrics,
            storage_metrics,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    pub fn registration(&self) -> &RegistrationMetrics {
        &self.registration_metrics
    }

    pub fn storage(&self) -> &StorageMetrics {
        &self.storage_metrics
    }

    pub fn record_roster_change(&self, action: &str) {
        self.lobby_metrics
            .roster_changes_total
            .with_label_values(&[action])
            .inc();
    }

    pub fn record_balance(&self, outcome: &str) {
        self.lobby_metrics
            .balance_requests_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_lobby_error(&self, code: &str) {
        self.lobby_metrics
            .lobby_errors_total
            .with_label_values(&[code])
            .inc();
    }

    pub fn record_rejection(&self, step: &str) {
        self.registration_metrics
            .registration_rejections_total
            .with_label_values(&[step])
            .inc();
    }

    pub fn record_document_write(&self, document: &str, ok: bool) {
        self.storage_metrics
            .document_writes_total
            .with_label_values(&[document, if ok { "ok" } else { "error" }])
            .inc();
    }

    pub fn set_registrations_in_progress(&self, count: usize) {
        self.registration_metrics
            .registrations_in_progress
            .set(count as i64);
    }
}
