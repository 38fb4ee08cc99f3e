//! In-Memory-Implementierungen der Datenbank-Ports
//!
//! Fuer Tests und Einzelinstanz-Betrieb ohne SQLite. Das Register wird
//! beim Start aus der Konfiguration befuellt.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sprechfunk_core::types::{ChannelId, UserId};
use tokio::sync::RwLock;

use crate::error::DbError;
use crate::models::{Aktion, AktivitaetsEintrag, KanalRecord, NeuerKanal};
use crate::repository::{ActivityLog, ChannelRegistry, DbResult};

// ---------------------------------------------------------------------------
// SpeicherRegister
// ---------------------------------------------------------------------------

/// Kanal-Register im Arbeitsspeicher
#[derive(Debug, Default)]
pub struct SpeicherRegister {
    kanaele: RwLock<HashMap<ChannelId, KanalRecord>>,
    /// (user, channel)-Paare
    mitglieder: RwLock<HashSet<(UserId, ChannelId)>>,
}

impl SpeicherRegister {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt einen Kanal an; Namen sind eindeutig
    pub async fn kanal_anlegen(&self, data: NeuerKanal<'_>) -> DbResult<KanalRecord> {
        let mut kanaele = self.kanaele.write().await;
        if kanaele.values().any(|k| k.name == data.name) {
            return Err(DbError::Eindeutigkeit(format!(
                "Kanalname '{}' existiert bereits",
                data.name
            )));
        }

        let record = KanalRecord {
            id: data.id.unwrap_or_default(),
            name: data.name.to_string(),
            beschreibung: data.beschreibung.map(str::to_string),
            max_users: data.max_users,
            aktiv: data.aktiv,
            erstellt_am: Utc::now(),
        };
        kanaele.insert(record.id, record.clone());
        Ok(record)
    }

    pub async fn kanal_aktiv_setzen(&self, id: ChannelId, aktiv: bool) -> DbResult<()> {
        let mut kanaele = self.kanaele.write().await;
        let kanal = kanaele
            .get_mut(&id)
            .ok_or_else(|| DbError::nicht_gefunden(format!("Kanal {id}")))?;
        kanal.aktiv = aktiv;
        Ok(())
    }

    pub async fn mitglied_hinzufuegen(&self, user_id: UserId, channel_id: ChannelId) {
        self.mitglieder.write().await.insert((user_id, channel_id));
    }

    pub async fn mitglied_entfernen(&self, user_id: UserId, channel_id: ChannelId) -> bool {
        self.mitglieder.write().await.remove(&(user_id, channel_id))
    }
}

#[async_trait]
impl ChannelRegistry for SpeicherRegister {
    async fn kanal(&self, id: ChannelId) -> DbResult<Option<KanalRecord>> {
        Ok(self.kanaele.read().await.get(&id).cloned())
    }

    async fn ist_mitglied(&self, user_id: UserId, channel_id: ChannelId) -> DbResult<bool> {
        Ok(self.mitglieder.read().await.contains(&(user_id, channel_id)))
    }
}

// ---------------------------------------------------------------------------
// SpeicherAktivitaetsLog
// ---------------------------------------------------------------------------

/// Aktivitaetsprotokoll im Arbeitsspeicher (chronologisch)
#[derive(Debug, Default)]
pub struct SpeicherAktivitaetsLog {
    eintraege: RwLock<Vec<AktivitaetsEintrag>>,
}

impl SpeicherAktivitaetsLog {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Kopie aller Eintraege in Aufzeichnungsreihenfolge
    pub async fn eintraege(&self) -> Vec<AktivitaetsEintrag> {
        self.eintraege.read().await.clone()
    }

    /// Eintraege einer bestimmten Aktion
    pub async fn mit_aktion(&self, aktion: Aktion) -> Vec<AktivitaetsEintrag> {
        self.eintraege
            .read()
            .await
            .iter()
            .filter(|e| e.aktion == aktion)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ActivityLog for SpeicherAktivitaetsLog {
    async fn aufzeichnen(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        aktion: Aktion,
        dauer_sek: Option<f64>,
    ) -> DbResult<()> {
        self.eintraege.write().await.push(AktivitaetsEintrag {
            user_id,
            channel_id,
            aktion,
            dauer_sek,
            zeitpunkt: Utc::now(),
        });
        Ok(())
    }
}
