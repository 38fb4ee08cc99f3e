//! Sitzungs-Register – genau ein Eintrag pro authentifizierter Verbindung
//!
//! Einziger Eigentuemer der Sitzungsdaten. Presence-Tabelle und Router
//! halten nur Verbindungs-IDs. Die Sperren sind pro Eintrag (DashMap-Shard),
//! Verbindungen blockieren sich also nicht gegenseitig.

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use sprechfunk_core::types::{ChannelId, ConnectionId, UserId};
use std::sync::Arc;

use crate::error::{SignalingError, SignalingResult};

/// Zustand einer authentifizierten Verbindung
#[derive(Debug, Clone, PartialEq)]
pub struct Sitzung {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub channel_id: Option<ChannelId>,
    pub spricht: bool,
    /// Nur gesetzt solange `spricht == true`
    pub sprech_start: Option<DateTime<Utc>>,
    pub verbunden_am: DateTime<Utc>,
}

/// Register aller lebenden Sitzungen
///
/// Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sitzungen: Arc<DashMap<ConnectionId, Sitzung>>,
}

impl SessionRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt eine neue Sitzung an (kein Kanal, spricht nicht)
    pub fn oeffnen(
        &self,
        connection_id: ConnectionId,
        user_id: UserId,
        jetzt: DateTime<Utc>,
    ) -> SignalingResult<Sitzung> {
        match self.sitzungen.entry(connection_id) {
            Entry::Occupied(_) => Err(SignalingError::BereitsOffen),
            Entry::Vacant(frei) => {
                let sitzung = Sitzung {
                    connection_id,
                    user_id,
                    channel_id: None,
                    spricht: false,
                    sprech_start: None,
                    verbunden_am: jetzt,
                };
                frei.insert(sitzung.clone());
                tracing::debug!(connection_id = %connection_id, user_id = %user_id, "Sitzung geoeffnet");
                Ok(sitzung)
            }
        }
    }

    /// Entfernt die Sitzung und gibt sie zurueck
    pub fn schliessen(&self, connection_id: &ConnectionId) -> SignalingResult<Sitzung> {
        let (_, sitzung) = self
            .sitzungen
            .remove(connection_id)
            .ok_or_else(|| SignalingError::nicht_gefunden(format!("Sitzung {connection_id}")))?;
        tracing::debug!(connection_id = %connection_id, "Sitzung geschlossen");
        Ok(sitzung)
    }

    pub fn abrufen(&self, connection_id: &ConnectionId) -> Option<Sitzung> {
        self.sitzungen.get(connection_id).map(|s| s.clone())
    }

    /// Setzt oder loescht den aktuellen Kanal
    ///
    /// Ein Kanalwechsel beendet immer auch den Sprechzustand, damit
    /// `spricht` nie ohne Kanal stehen bleibt.
    pub fn kanal_setzen(
        &self,
        connection_id: &ConnectionId,
        channel_id: Option<ChannelId>,
    ) -> SignalingResult<()> {
        let mut sitzung = self
            .sitzungen
            .get_mut(connection_id)
            .ok_or_else(|| SignalingError::nicht_gefunden(format!("Sitzung {connection_id}")))?;
        if sitzung.channel_id != channel_id {
            sitzung.spricht = false;
            sitzung.sprech_start = None;
        }
        sitzung.channel_id = channel_id;
        Ok(())
    }

    /// Setzt den Sprechzustand und gibt den bisherigen Startzeitpunkt zurueck
    ///
    /// - `true`: erfordert einen Kanal; ein bereits laufender Start bleibt erhalten
    /// - `false`: loescht Flag und Startzeitpunkt
    pub fn sprechen_setzen(
        &self,
        connection_id: &ConnectionId,
        spricht: bool,
        zeitpunkt: DateTime<Utc>,
    ) -> SignalingResult<Option<DateTime<Utc>>> {
        let mut sitzung = self
            .sitzungen
            .get_mut(connection_id)
            .ok_or_else(|| SignalingError::nicht_gefunden(format!("Sitzung {connection_id}")))?;

        let bisher = sitzung.sprech_start;
        if spricht {
            if sitzung.channel_id.is_none() {
                return Err(SignalingError::NichtAnwesend);
            }
            sitzung.spricht = true;
            sitzung.sprech_start = Some(bisher.unwrap_or(zeitpunkt));
        } else {
            sitzung.spricht = false;
            sitzung.sprech_start = None;
        }
        Ok(bisher)
    }

    pub fn anzahl(&self) -> usize {
        self.sitzungen.len()
    }
}
