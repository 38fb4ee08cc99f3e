//! SQLite-Implementierung des ChannelRegistry
//!
//! Neben dem lesenden Port bietet `SqliteDb` einfache Verwaltungsfunktionen
//! (Kanal anlegen, Mitglieder pflegen) fuer Seeding und Tests.

use async_trait::async_trait;
use chrono::Utc;
use sprechfunk_core::types::{ChannelId, UserId};

use crate::error::DbError;
use crate::models::{KanalRecord, NeuerKanal};
use crate::repository::{ChannelRegistry, DbResult};
use crate::sqlite::{parse_uuid, parse_zeit, SqliteDb};

#[async_trait]
impl ChannelRegistry for SqliteDb {
    async fn kanal(&self, id: ChannelId) -> DbResult<Option<KanalRecord>> {
        let row = sqlx::query(
            "SELECT id, name, description, max_users, is_active, created_at
             FROM channels WHERE id = ?",
        )
        .bind(id.inner().to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_kanal(&r)).transpose()
    }

    async fn ist_mitglied(&self, user_id: UserId, channel_id: ChannelId) -> DbResult<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM channel_members WHERE user_id = ? AND channel_id = ?",
        )
        .bind(user_id.inner().to_string())
        .bind(channel_id.inner().to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }
}

impl SqliteDb {
    /// Legt einen neuen Kanal an
    pub async fn kanal_anlegen(&self, data: NeuerKanal<'_>) -> DbResult<KanalRecord> {
        let id = data.id.unwrap_or_default();
        let jetzt = Utc::now();

        sqlx::query(
            "INSERT INTO channels (id, name, description, max_users, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.inner().to_string())
        .bind(data.name)
        .bind(data.beschreibung)
        .bind(data.max_users as i64)
        .bind(data.aktiv as i64)
        .bind(jetzt.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let fehler = DbError::from(e);
            if fehler.ist_eindeutigkeit() {
                DbError::Eindeutigkeit(format!("Kanalname '{}' existiert bereits", data.name))
            } else {
                fehler
            }
        })?;

        tracing::debug!(kanal_id = %id, name = data.name, "Kanal angelegt");

        Ok(KanalRecord {
            id,
            name: data.name.to_string(),
            beschreibung: data.beschreibung.map(str::to_string),
            max_users: data.max_users,
            aktiv: data.aktiv,
            erstellt_am: jetzt,
        })
    }

    /// Setzt das Aktiv-Flag eines Kanals
    pub async fn kanal_aktiv_setzen(&self, id: ChannelId, aktiv: bool) -> DbResult<()> {
        let ergebnis = sqlx::query("UPDATE channels SET is_active = ? WHERE id = ?")
            .bind(aktiv as i64)
            .bind(id.inner().to_string())
            .execute(&self.pool)
            .await?;

        if ergebnis.rows_affected() == 0 {
            return Err(DbError::nicht_gefunden(format!("Kanal {id}")));
        }
        Ok(())
    }

    /// Alle Kanaele, sortiert nach Name
    pub async fn kanaele(&self) -> DbResult<Vec<KanalRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, description, max_users, is_active, created_at
             FROM channels ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_kanal).collect()
    }

    /// Fuegt eine Mitgliedschaft hinzu (idempotent)
    pub async fn mitglied_hinzufuegen(&self, user_id: UserId, channel_id: ChannelId) -> DbResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO channel_members (user_id, channel_id, joined_at)
             VALUES (?, ?, ?)",
        )
        .bind(user_id.inner().to_string())
        .bind(channel_id.inner().to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Entfernt eine Mitgliedschaft; gibt zurueck ob eine existierte
    pub async fn mitglied_entfernen(&self, user_id: UserId, channel_id: ChannelId) -> DbResult<bool> {
        let ergebnis =
            sqlx::query("DELETE FROM channel_members WHERE user_id = ? AND channel_id = ?")
                .bind(user_id.inner().to_string())
                .bind(channel_id.inner().to_string())
                .execute(&self.pool)
                .await?;
        Ok(ergebnis.rows_affected() > 0)
    }
}

fn row_to_kanal(row: &sqlx::sqlite::SqliteRow) -> DbResult<KanalRecord> {
    use sqlx::Row as _;

    let max_users: i64 = row.try_get("max_users")?;
    let is_active: i64 = row.try_get("is_active")?;

    Ok(KanalRecord {
        id: ChannelId(parse_uuid(row, "id")?),
        name: row.try_get("name")?,
        beschreibung: row.try_get("description")?,
        max_users: u32::try_from(max_users)
            .map_err(|_| DbError::intern(format!("Ungueltige max_users: {max_users}")))?,
        aktiv: is_active != 0,
        erstellt_am: parse_zeit(row, "created_at")?,
    })
}
