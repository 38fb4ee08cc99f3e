//! In-Process-Broker
//!
//! Alle Abonnenten erhalten jede Nachricht ueber einen gemeinsamen
//! Broadcast-Kanal und filtern selbst nach ihrem Muster. Ueberholte
//! Empfaenger (Lagged) verlieren Nachrichten, das entspricht dem
//! Best-Effort-Verhalten von Redis Pub/Sub.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use sprechfunk_core::event::{muster_passt, Broker, BrokerFehler, BrokerNachricht, BrokerStream};
use tokio::sync::broadcast;

/// Standard-Puffergroesse pro Abonnent
pub const STANDARD_KAPAZITAET: usize = 1024;

/// Broker im Arbeitsspeicher
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SpeicherBroker {
    inner: Arc<Inner>,
}

struct Inner {
    sender: broadcast::Sender<BrokerNachricht>,
    verfuegbar: AtomicBool,
}

impl SpeicherBroker {
    pub fn neu() -> Self {
        Self::mit_kapazitaet(STANDARD_KAPAZITAET)
    }

    pub fn mit_kapazitaet(kapazitaet: usize) -> Self {
        let (sender, _) = broadcast::channel(kapazitaet);
        Self {
            inner: Arc::new(Inner {
                sender,
                verfuegbar: AtomicBool::new(true),
            }),
        }
    }

    /// Simuliert einen Broker-Ausfall (bzw. dessen Ende)
    ///
    /// Waehrend der Ausfall anhaelt schlagen `veroeffentlichen` und
    /// `abonnieren` mit `NichtVerfuegbar` fehl.
    pub fn verfuegbarkeit_setzen(&self, verfuegbar: bool) {
        self.inner.verfuegbar.store(verfuegbar, Ordering::SeqCst);
    }

    /// Anzahl aktiver Abonnements
    pub fn anzahl_abonnenten(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    fn pruefe_verfuegbar(&self) -> Result<(), BrokerFehler> {
        if self.inner.verfuegbar.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerFehler::NichtVerfuegbar("Speicher-Broker getrennt".into()))
        }
    }
}

impl Default for SpeicherBroker {
    fn default() -> Self {
        Self::neu()
    }
}

#[async_trait]
impl Broker for SpeicherBroker {
    async fn veroeffentlichen(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerFehler> {
        self.pruefe_verfuegbar()?;
        // Ohne Abonnenten liefert send() einen Fehler; das ist kein Broker-Problem
        let _ = self.inner.sender.send(BrokerNachricht {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn abonnieren(&self, muster: &str) -> Result<BrokerStream, BrokerFehler> {
        self.pruefe_verfuegbar()?;
        let empfaenger = self.inner.sender.subscribe();
        let muster = muster.to_string();

        let strom = stream::unfold(empfaenger, move |mut empfaenger| {
            let muster = muster.clone();
            async move {
                loop {
                    match empfaenger.recv().await {
                        Ok(nachricht) if muster_passt(&muster, &nachricht.topic) => {
                            return Some((nachricht, empfaenger));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(verpasst = n, "Broker-Abonnent ueberholt");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(strom.boxed())
    }

    fn name(&self) -> &'static str {
        "speicher"
    }
}
