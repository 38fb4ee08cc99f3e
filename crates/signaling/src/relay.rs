//! Relay-Bruecke – Kanal-Ereignisse zwischen Server-Instanzen
//!
//! Lokal ausgeloeste Ereignisse gehen ueber eine Queue an einen einzelnen
//! Publish-Task, der sie in Reihenfolge auf dem Kanal-Topic veroeffentlicht.
//! Ein Hintergrund-Task abonniert alle Kanal-Topics und spielt Ereignisse
//! anderer Instanzen ueber den [`RoomRouter`] lokal ab. Eigene Ereignisse
//! (gleiche `origin`) werden verworfen, abgespielte Ereignisse nie erneut
//! veroeffentlicht.
//!
//! Broker-Fehler verlassen diese Datei nicht: sie werden geloggt, gezaehlt
//! und im Health-Status sichtbar gemacht.

use sprechfunk_core::event::{Broker, BrokerFehler, BrokerNachricht};
use sprechfunk_core::types::{ChannelId, ServerId};
use sprechfunk_observability::SprechfunkMetriken;
use sprechfunk_protocol::control::{ControlMessage, ControlPayload};
use sprechfunk_protocol::relay::{abo_muster, RelayArt, RelayUmschlag};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::broadcast::RoomRouter;

/// Wartezeit vor einem erneuten Abonnement nach Verbindungsverlust
pub const STANDARD_WIEDERVERBINDUNG: Duration = Duration::from_secs(2);

/// Standard-Zeitlimit fuer eine Veroeffentlichung
pub const STANDARD_PUBLISH_TIMEOUT: Duration = Duration::from_millis(500);

/// Kapazitaet der Publish-Queue pro Instanz
const PUBLISH_QUEUE_GROESSE: usize = 1024;

/// Einstellungen der Relay-Bruecke
#[derive(Debug, Clone)]
pub struct RelayEinstellungen {
    pub praefix: String,
    pub publish_timeout: Duration,
    pub wiederverbindung: Duration,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            praefix: "sprechfunk".into(),
            publish_timeout: STANDARD_PUBLISH_TIMEOUT,
            wiederverbindung: STANDARD_WIEDERVERBINDUNG,
        }
    }
}

/// Uebersetzer zwischen lokalen Ereignissen und dem Broker
///
/// Ohne Broker ist jede Operation ein No-op. Mit Broker startet `neu` den
/// Publish-Task und braucht dafuer eine laufende Tokio-Runtime. Clone teilt
/// den inneren Zustand.
#[derive(Clone)]
pub struct RelayBridge {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    server_id: ServerId,
    broker: Option<Arc<dyn Broker>>,
    router: RoomRouter,
    einstellungen: RelayEinstellungen,
    metriken: SprechfunkMetriken,
    /// Geteilt mit dem Health-Endpunkt
    broker_verbunden: Arc<AtomicBool>,
    /// `None` ohne Broker
    publish_tx: Option<mpsc::Sender<Auftrag>>,
    queue_voll: AtomicBool,
}

/// Ein kodiertes Ereignis auf dem Weg zum Broker
struct Auftrag {
    channel_id: ChannelId,
    art: RelayArt,
    topic: String,
    payload: Vec<u8>,
}

impl RelayBridge {
    pub fn neu(
        server_id: ServerId,
        broker: Option<Arc<dyn Broker>>,
        router: RoomRouter,
        einstellungen: RelayEinstellungen,
        metriken: SprechfunkMetriken,
    ) -> Self {
        let broker_verbunden = Arc::new(AtomicBool::new(broker.is_some()));
        let publish_tx = broker.as_ref().map(|broker| {
            let (tx, rx) = mpsc::channel(PUBLISH_QUEUE_GROESSE);
            tokio::spawn(publisher(
                Arc::clone(broker),
                rx,
                einstellungen.publish_timeout,
                metriken.clone(),
                Arc::clone(&broker_verbunden),
            ));
            tx
        });
        Self {
            inner: Arc::new(RelayInner {
                server_id,
                broker,
                router,
                einstellungen,
                metriken,
                broker_verbunden,
                publish_tx,
                queue_voll: AtomicBool::new(false),
            }),
        }
    }

    pub fn server_id(&self) -> ServerId {
        self.inner.server_id
    }

    pub fn ist_aktiv(&self) -> bool {
        self.inner.broker.is_some()
    }

    /// Name des Brokers fuer die Health-Ausgabe (`"none"` ohne Broker)
    pub fn broker_name(&self) -> &'static str {
        self.inner.broker.as_ref().map_or("none", |b| b.name())
    }

    /// Verbindungs-Flag fuer den Health-Endpunkt
    pub fn broker_verbunden(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.broker_verbunden)
    }

    /// Veroeffentlicht ein lokal ausgeloestes Kanal-Ereignis
    ///
    /// Stellt das Ereignis nur in die Publish-Queue und wartet nie auf den
    /// Broker. Ist die Queue voll, wird das Ereignis verworfen und gezaehlt.
    pub fn veroeffentlichen(&self, channel_id: ChannelId, art: RelayArt, event: ControlPayload) {
        let Some(tx) = self.inner.publish_tx.as_ref() else {
            return;
        };

        let umschlag = RelayUmschlag {
            channel_id,
            art,
            origin: self.inner.server_id,
            event,
        };
        let topic = umschlag.topic(&self.inner.einstellungen.praefix);
        let payload = match umschlag.zu_bytes() {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(kanal_id = %channel_id, fehler = %e, "Relay-Umschlag nicht kodierbar");
                return;
            }
        };

        match tx.try_send(Auftrag {
            channel_id,
            art,
            topic,
            payload,
        }) {
            Ok(()) => {
                if self.inner.queue_voll.swap(false, Ordering::Relaxed) {
                    tracing::info!("Publish-Queue nimmt wieder Ereignisse an");
                }
            }
            Err(e) => {
                self.inner.metriken.relay_failures_total.inc();
                if !self.inner.queue_voll.swap(true, Ordering::Relaxed) {
                    tracing::warn!(
                        kanal_id = %channel_id,
                        art = art.als_str(),
                        fehler = %e,
                        "Publish-Queue voll – Ereignisse werden nur lokal zugestellt"
                    );
                }
            }
        }
    }

    /// Spielt eine Broker-Nachricht lokal ab
    ///
    /// Gibt `true` zurueck wenn das Ereignis an lokale Anwesende ging.
    pub fn verarbeiten(&self, nachricht: &BrokerNachricht) -> bool {
        let umschlag = match RelayUmschlag::aus_bytes(&nachricht.payload) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(topic = %nachricht.topic, fehler = %e, "Ungueltige Relay-Nachricht verworfen");
                return false;
            }
        };

        if umschlag.origin == self.inner.server_id {
            return false;
        }

        let empfaenger = self.inner.router.an_kanal_senden(
            &umschlag.channel_id,
            ControlMessage::ereignis(umschlag.event),
            None,
        );
        self.inner.metriken.relay_replayed_total.inc();
        tracing::trace!(
            kanal_id = %umschlag.channel_id,
            origin = %umschlag.origin,
            art = umschlag.art.als_str(),
            empfaenger,
            "Fremd-Ereignis abgespielt"
        );
        true
    }

    /// Startet den Abonnement-Task
    ///
    /// Ohne Broker wird kein Task gestartet. Geht das Abonnement verloren,
    /// wird es nach `wiederverbindung` erneut aufgebaut bis `shutdown_rx`
    /// ausloest.
    pub fn abonnieren_starten(&self, mut shutdown_rx: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let broker = Arc::clone(self.inner.broker.as_ref()?);
        let bruecke = self.clone();
        let muster = abo_muster(&bruecke.inner.einstellungen.praefix);

        Some(tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                match broker.abonnieren(&muster).await {
                    Ok(mut strom) => {
                        bruecke.inner.broker_verbunden.store(true, Ordering::Relaxed);
                        tracing::info!(broker = broker.name(), muster = %muster, "Relay-Abonnement aktiv");

                        loop {
                            tokio::select! {
                                nachricht = strom.next() => match nachricht {
                                    Some(n) => {
                                        bruecke.verarbeiten(&n);
                                    }
                                    None => {
                                        tracing::warn!(broker = broker.name(), "Relay-Abonnement beendet");
                                        break;
                                    }
                                },
                                _ = shutdown_rx.changed() => return,
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(broker = broker.name(), fehler = %e, "Relay-Abonnement fehlgeschlagen");
                    }
                }

                bruecke.inner.broker_verbunden.store(false, Ordering::Relaxed);
                tokio::select! {
                    _ = tokio::time::sleep(bruecke.inner.einstellungen.wiederverbindung) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::debug!("Relay-Abonnement gestoppt");
        }))
    }
}

/// Arbeitet die Publish-Queue in Reihenfolge ab
///
/// Endet wenn alle Handles der Bruecke gedroppt sind.
async fn publisher(
    broker: Arc<dyn Broker>,
    mut rx: mpsc::Receiver<Auftrag>,
    publish_timeout: Duration,
    metriken: SprechfunkMetriken,
    broker_verbunden: Arc<AtomicBool>,
) {
    while let Some(auftrag) = rx.recv().await {
        let ergebnis = tokio::time::timeout(
            publish_timeout,
            broker.veroeffentlichen(&auftrag.topic, auftrag.payload),
        )
        .await
        .unwrap_or(Err(BrokerFehler::Zeitlimit));

        match ergebnis {
            Ok(()) => {
                metriken.relay_published_total.inc();
                if !broker_verbunden.swap(true, Ordering::Relaxed) {
                    tracing::info!(broker = broker.name(), "Broker wieder erreichbar");
                }
                tracing::trace!(topic = %auftrag.topic, "Ereignis veroeffentlicht");
            }
            Err(e) => {
                metriken.relay_failures_total.inc();
                broker_verbunden.store(false, Ordering::Relaxed);
                tracing::warn!(
                    kanal_id = %auftrag.channel_id,
                    art = auftrag.art.als_str(),
                    fehler = %e,
                    "Veroeffentlichung fehlgeschlagen – nur lokale Zustellung"
                );
            }
        }
    }
    tracing::debug!(broker = broker.name(), "Publish-Task beendet");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
