//! Ports zum Kanal-Register und Aktivitaetsprotokoll
//!
//! Der Signaling-Kern haelt beide als Trait-Objekte (`Arc<dyn …>`), damit
//! SQLite und die In-Memory-Varianten austauschbar sind.

use async_trait::async_trait;
use sprechfunk_core::types::{ChannelId, UserId};

use crate::error::DbError;
use crate::models::{Aktion, KanalRecord};

/// Result-Alias fuer Datenbankoperationen
pub type DbResult<T> = Result<T, DbError>;

/// Konfiguration fuer die SQLite-Verbindung
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Verbindungs-URL (z.B. "sqlite://sprechfunk.db")
    pub url: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen im Pool
    pub max_verbindungen: u32,
    /// Ob WAL-Modus aktiviert werden soll
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sprechfunk.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

/// Lesender Zugriff auf Kanaele und Mitgliedschaften
#[async_trait]
pub trait ChannelRegistry: Send + Sync + 'static {
    /// Laedt einen Kanal anhand seiner ID
    async fn kanal(&self, id: ChannelId) -> DbResult<Option<KanalRecord>>;

    /// Prueft ob der Benutzer eine persistente Mitgliedschaft im Kanal hat
    async fn ist_mitglied(&self, user_id: UserId, channel_id: ChannelId) -> DbResult<bool>;

    /// Kapazitaet des Kanals
    async fn kapazitaet(&self, channel_id: ChannelId) -> DbResult<u32> {
        self.kanal(channel_id)
            .await?
            .map(|k| k.max_users)
            .ok_or_else(|| DbError::nicht_gefunden(format!("Kanal {channel_id}")))
    }

    /// Ob der Kanal existiert und aktiv ist
    async fn ist_aktiv(&self, channel_id: ChannelId) -> DbResult<bool> {
        Ok(self.kanal(channel_id).await?.is_some_and(|k| k.aktiv))
    }
}

/// Schreibender Zugriff auf das Aktivitaetsprotokoll
#[async_trait]
pub trait ActivityLog: Send + Sync + 'static {
    async fn aufzeichnen(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        aktion: Aktion,
        dauer_sek: Option<f64>,
    ) -> DbResult<()>;
}
