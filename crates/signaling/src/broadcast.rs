//! Raum-Router – Multicast an alle Anwesenden eines Kanals
//!
//! Der Router verwaltet die Send-Queues aller authentifizierten Verbindungen.
//! Die Kanal-Zugehoerigkeit liest er bei jedem Versand als Momentaufnahme aus
//! der [`PresenceTable`]; er fuehrt keine eigene Mitgliederliste.
//!
//! Zustellung ist best-effort: volle oder geschlossene Queues verwerfen nur
//! die eine Nachricht, der Versand an alle anderen laeuft weiter.

use dashmap::DashMap;
use sprechfunk_core::types::{ChannelId, ConnectionId};
use sprechfunk_protocol::control::ControlMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::presence::PresenceTable;

/// Standard-Groesse der Send-Queue pro Verbindung
pub const STANDARD_SEND_QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub connection_id: ConnectionId,
    pub tx: mpsc::Sender<ControlMessage>,
}

impl ClientSender {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: ControlMessage) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %self.connection_id, "Send-Queue voll – Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(connection_id = %self.connection_id, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RoomRouter
// ---------------------------------------------------------------------------

/// Multicast-Primitive ueber die Send-Queues der Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct RoomRouter {
    inner: Arc<RoomRouterInner>,
}

struct RoomRouterInner {
    clients: DashMap<ConnectionId, ClientSender>,
    presence: PresenceTable,
    queue_groesse: usize,
}

impl RoomRouter {
    pub fn neu(presence: PresenceTable, queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(RoomRouterInner {
                clients: DashMap::new(),
                presence,
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Registriert eine Verbindung und gibt ihre Empfangs-Queue zurueck
    ///
    /// Die `ClientConnection` liest aus dieser Queue und schreibt auf den Socket.
    pub fn client_registrieren(&self, connection_id: ConnectionId) -> mpsc::Receiver<ControlMessage> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        self.inner
            .clients
            .insert(connection_id, ClientSender { connection_id, tx });
        tracing::debug!(connection_id = %connection_id, "Client im Router registriert");
        rx
    }

    pub fn client_entfernen(&self, connection_id: &ConnectionId) {
        if self.inner.clients.remove(connection_id).is_some() {
            tracing::debug!(connection_id = %connection_id, "Client aus Router entfernt");
        }
    }

    /// Sendet an alle Anwesenden des Kanals, optional ohne den Ausloeser
    ///
    /// Gibt die Anzahl der erfolgreich eingereihten Nachrichten zurueck.
    pub fn an_kanal_senden(
        &self,
        channel_id: &ChannelId,
        nachricht: ControlMessage,
        ausgenommen: Option<&ConnectionId>,
    ) -> usize {
        let empfaenger: Vec<ClientSender> = self
            .inner
            .presence
            .verbindungen(channel_id)
            .into_iter()
            .filter(|conn| Some(conn) != ausgenommen)
            .filter_map(|conn| self.inner.clients.get(&conn).map(|s| s.clone()))
            .collect();

        let gesendet = empfaenger
            .iter()
            .filter(|sender| sender.senden(nachricht.clone()))
            .count();

        tracing::trace!(
            kanal_id = %channel_id,
            art = nachricht.payload.art(),
            gesendet,
            "Kanal-Multicast"
        );
        gesendet
    }

    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    pub fn ist_registriert(&self, connection_id: &ConnectionId) -> bool {
        self.inner.clients.contains_key(connection_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
