//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt Konfiguration und Lifecycle-Controller als Arc-Referenz, die
//! sicher zwischen tokio-Tasks geteilt werden kann.

use sprechfunk_core::types::ServerId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::broadcast::STANDARD_SEND_QUEUE_GROESSE;
use crate::lifecycle::{Dienste, LifecycleController};
use crate::relay::{RelayEinstellungen, STANDARD_WIEDERVERBINDUNG};

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Instanz-ID (unveraenderlich nach dem Start, Herkunft im Relay)
    pub server_id: ServerId,
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Verbindungen
    pub max_clients: u32,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
    /// Zeit fuer die `connect`-Nachricht nach dem TCP-Aufbau
    pub auth_timeout_ms: u64,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Zeitlimit fuer Broker-Veroeffentlichungen
    pub publish_timeout_ms: u64,
    /// Topic-Praefix auf dem Broker
    pub broker_praefix: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_id: ServerId::new(),
            server_name: "Sprechfunk Server".to_string(),
            max_clients: 512,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            auth_timeout_ms: 10_000,
            send_queue_groesse: STANDARD_SEND_QUEUE_GROESSE,
            publish_timeout_ms: 500,
            broker_praefix: "sprechfunk".to_string(),
        }
    }
}

impl SignalingConfig {
    pub fn relay_einstellungen(&self) -> RelayEinstellungen {
        RelayEinstellungen {
            praefix: self.broker_praefix.clone(),
            publish_timeout: Duration::from_millis(self.publish_timeout_ms),
            wiederverbindung: STANDARD_WIEDERVERBINDUNG,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Sitzungen, Presence, Router und Relay
    pub lifecycle: LifecycleController,
    /// Offene TCP-Verbindungen (auch noch nicht authentifizierte)
    offene_verbindungen: AtomicUsize,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    ///
    /// Muss innerhalb einer Tokio-Runtime aufgerufen werden.
    pub fn neu(config: SignalingConfig, dienste: Dienste) -> Arc<Self> {
        let lifecycle = LifecycleController::neu(
            config.server_id,
            dienste,
            config.send_queue_groesse,
            config.relay_einstellungen(),
        );
        Arc::new(Self {
            config: Arc::new(config),
            lifecycle,
            offene_verbindungen: AtomicUsize::new(0),
            start_time: Instant::now(),
        })
    }

    /// Reserviert einen Verbindungsplatz
    ///
    /// Gibt `None` zurueck wenn `max_clients` erreicht ist. Der Platz wird
    /// freigegeben wenn der zurueckgegebene Guard gedroppt wird.
    pub fn platz_reservieren(self: &Arc<Self>) -> Option<VerbindungsPlatz> {
        let max = self.config.max_clients as usize;
        self.offene_verbindungen
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(VerbindungsPlatz {
            state: Arc::clone(self),
        })
    }

    pub fn offene_verbindungen(&self) -> usize {
        self.offene_verbindungen.load(Ordering::Acquire)
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Belegter Verbindungsplatz, gibt sich beim Drop frei
pub struct VerbindungsPlatz {
    state: Arc<SignalingState>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.state.offene_verbindungen.fetch_sub(1, Ordering::AcqRel);
    }
}
