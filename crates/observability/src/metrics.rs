//! Prometheus-kompatible Metriken fuer Sprechfunk
//!
//! Registrierte Metriken:
//! - `sprechfunk_connected_clients` – Gauge: Aktuell authentifizierte Verbindungen
//! - `sprechfunk_channels_active` – Gauge: Kanaele mit lokaler Anwesenheit
//! - `sprechfunk_audio_frames_total` – Counter: Lokal weitergeleitete Audio-Frames
//! - `sprechfunk_join_rejected_total` – Counter: Abgelehnte Beitritte (grund)
//! - `sprechfunk_relay_published_total` – Counter: An den Broker veroeffentlichte Ereignisse
//! - `sprechfunk_relay_failures_total` – Counter: Fehlgeschlagene Veroeffentlichungen
//! - `sprechfunk_relay_replayed_total` – Counter: Lokal abgespielte Fremd-Ereignisse
//!
//! Jede Server-Instanz besitzt eine eigene Registry, damit mehrere Instanzen
//! im selben Prozess (Tests) sich nicht in die Quere kommen.

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Sprechfunk-Prometheus-Metriken
#[derive(Clone)]
pub struct SprechfunkMetriken {
    pub registry: Arc<Registry>,

    pub connected_clients: IntGauge,
    pub channels_active: IntGauge,
    pub audio_frames_total: IntCounter,
    pub join_rejected_total: IntCounterVec,

    // Relay-Metriken
    pub relay_published_total: IntCounter,
    pub relay_failures_total: IntCounter,
    pub relay_replayed_total: IntCounter,
}

impl SprechfunkMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = IntGauge::with_opts(Opts::new(
            "sprechfunk_connected_clients",
            "Anzahl aktuell authentifizierter Verbindungen",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let channels_active = IntGauge::with_opts(Opts::new(
            "sprechfunk_channels_active",
            "Anzahl Kanaele mit mindestens einem lokalen Teilnehmer",
        ))?;
        registry.register(Box::new(channels_active.clone()))?;

        let audio_frames_total = IntCounter::with_opts(Opts::new(
            "sprechfunk_audio_frames_total",
            "Gesamtanzahl weitergeleiteter Audio-Frames",
        ))?;
        registry.register(Box::new(audio_frames_total.clone()))?;

        let join_rejected_total = IntCounterVec::new(
            Opts::new(
                "sprechfunk_join_rejected_total",
                "Abgelehnte Kanal-Beitritte nach Grund",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(join_rejected_total.clone()))?;

        // --- Relay ---
        let relay_published_total = IntCounter::with_opts(Opts::new(
            "sprechfunk_relay_published_total",
            "An den Broker veroeffentlichte Kanal-Ereignisse",
        ))?;
        registry.register(Box::new(relay_published_total.clone()))?;

        let relay_failures_total = IntCounter::with_opts(Opts::new(
            "sprechfunk_relay_failures_total",
            "Fehlgeschlagene oder abgelaufene Broker-Veroeffentlichungen",
        ))?;
        registry.register(Box::new(relay_failures_total.clone()))?;

        let relay_replayed_total = IntCounter::with_opts(Opts::new(
            "sprechfunk_relay_replayed_total",
            "Von anderen Instanzen empfangene und lokal verteilte Ereignisse",
        ))?;
        registry.register(Box::new(relay_replayed_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            channels_active,
            audio_frames_total,
            join_rejected_total,
            relay_published_total,
            relay_failures_total,
            relay_replayed_total,
        })
    }

    /// Zaehlt einen abgelehnten Beitritt
    pub fn beitritt_abgelehnt(&self, grund: &str) {
        self.join_rejected_total.with_label_values(&[grund]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: SprechfunkMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<SprechfunkMetriken>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(fehler = %err, "Metriken-Export fehlgeschlagen");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
