//! Health-Check-Endpunkt fuer Sprechfunk
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Broker-Verbindungsstatus

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    /// Name des konfigurierten Brokers (`none` wenn rein lokal)
    pub broker: String,
    pub broker_connected: bool,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    broker: &'static str,
    broker_verbunden: Arc<AtomicBool>,
}

impl HealthState {
    /// Health-Zustand ohne Broker
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            broker: "none",
            broker_verbunden: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Haengt den Verbindungsstatus eines Brokers an
    ///
    /// Das Flag wird von der Relay-Bruecke gepflegt.
    pub fn mit_broker(mut self, name: &'static str, verbunden: Arc<AtomicBool>) -> Self {
        self.broker = name;
        self.broker_verbunden = verbunden;
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn broker_verbunden(&self) -> bool {
        self.broker_verbunden.load(Ordering::Relaxed)
    }

    /// Baut die aktuelle Health-Antwort
    pub fn bericht(&self) -> HealthResponse {
        let ohne_broker = self.broker == "none";
        let verbunden = !ohne_broker && self.broker_verbunden();
        // Ohne Broker laeuft der Server bewusst lokal; das ist gesund
        let status = if ohne_broker || verbunden {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };

        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            broker: self.broker.to_string(),
            broker_connected: verbunden,
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.bericht();

    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK, // 200 auch bei degraded (Probe soll nicht failen)
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}
