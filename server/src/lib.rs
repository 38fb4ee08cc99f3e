//! sprechfunk-server – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Kollaborateure und Signaling-Kern und stellt
//! den oeffentlichen Einstiegspunkt fuer Integrationstests bereit.

pub mod aufbau;
pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use sprechfunk_core::types::UserId;
use sprechfunk_observability::{observability_server_starten, HealthState, SprechfunkMetriken};
use sprechfunk_signaling::{Dienste, SignalingServer, SignalingState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Maximale Wartezeit auf die Hintergrund-Tasks beim Herunterfahren
const SHUTDOWN_FRIST: Duration = Duration::from_secs(5);

/// Haelt den Server-Zustand vor dem Start zusammen
pub struct Server {
    pub config: ServerConfig,
}

/// Ein gestarteter Server mit allen Hintergrund-Tasks
pub struct LaufenderServer {
    state: Arc<SignalingState>,
    signaling_adresse: SocketAddr,
    entwicklungs_tokens: Vec<(UserId, String)>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let laufend = self.hochfahren().await?;

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        laufend.herunterfahren().await;
        Ok(())
    }

    /// Baut alle Kollaborateure auf und startet die Listener
    ///
    /// Reihenfolge:
    /// 1. Kanal-Register und Aktivitaetslog oeffnen
    /// 2. Token-Pruefung aufbauen
    /// 3. Broker verbinden (Ausfall = nur lokaler Betrieb)
    /// 4. Relay-Abonnement starten
    /// 5. Observability-Server starten
    /// 6. TCP-Listener binden
    pub async fn hochfahren(self) -> Result<LaufenderServer> {
        let config = self.config;
        config.validieren()?;
        tracing::info!(
            server_name = %config.server.name,
            datenbank = ?config.datenbank.backend,
            auth = ?config.auth.modus,
            broker = ?config.broker.modus,
            "Server startet"
        );

        let metriken = SprechfunkMetriken::neu().context("Metriken nicht registriert")?;
        let speicher = aufbau::speicher_oeffnen(&config.datenbank).await?;
        let auth = aufbau::authentifizierung_aufbauen(&config.auth).await?;

        let mut dienste = Dienste::neu(
            auth.validator,
            speicher.register,
            speicher.aktivitaet,
            metriken.clone(),
        );
        if let Some(broker) = aufbau::broker_verbinden(&config.broker).await {
            dienste = dienste.mit_broker(broker);
        }

        let signaling_config = config.signaling_config();
        tracing::info!(server_id = %signaling_config.server_id, "Instanz-ID vergeben");
        let state = SignalingState::neu(signaling_config, dienste);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let relay = state.lifecycle.relay();
        if let Some(handle) = relay.abonnieren_starten(shutdown_rx.clone()) {
            tasks.push(handle);
        }

        if config.observability.aktiviert {
            let addr = config.observability_bind_adresse()?;
            let health = HealthState::neu().mit_broker(relay.broker_name(), relay.broker_verbunden());
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(addr, metriken, health, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }));
        }

        let bind_addr = config.tcp_bind_adresse()?;
        let signaling = SignalingServer::binden(Arc::clone(&state), bind_addr)
            .await
            .with_context(|| format!("TCP-Listener auf {bind_addr} nicht gebunden"))?;
        let signaling_adresse = signaling.lokale_adresse()?;
        tasks.push(tokio::spawn(async move {
            if let Err(e) = signaling.starten(shutdown_rx).await {
                tracing::error!(fehler = %e, "Signaling-Server beendet");
            }
        }));

        Ok(LaufenderServer {
            state,
            signaling_adresse,
            entwicklungs_tokens: auth.entwicklungs_tokens,
            shutdown_tx,
            tasks,
        })
    }
}

impl LaufenderServer {
    /// Tatsaechlich gebundene Adresse (Port 0 in der Konfiguration)
    pub fn signaling_adresse(&self) -> SocketAddr {
        self.signaling_adresse
    }

    pub fn state(&self) -> &Arc<SignalingState> {
        &self.state
    }

    /// Beim Start ausgestellte Tokens (`auth.modus = "memory"`)
    pub fn entwicklungs_tokens(&self) -> &[(UserId, String)] {
        &self.entwicklungs_tokens
    }

    /// Signalisiert den Shutdown und wartet auf die Hintergrund-Tasks
    pub async fn herunterfahren(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if tokio::time::timeout(SHUTDOWN_FRIST, task).await.is_err() {
                tracing::warn!("Hintergrund-Task nicht rechtzeitig beendet");
            }
        }
        tracing::info!(
            verbindungen = self.state.offene_verbindungen(),
            "Server heruntergefahren"
        );
    }
}
