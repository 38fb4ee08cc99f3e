//! SQLite-Implementierung des ActivityLog

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sprechfunk_core::types::{ChannelId, UserId};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{Aktion, AktivitaetsEintrag};
use crate::repository::{ActivityLog, DbResult};
use crate::sqlite::{parse_uuid, parse_zeit, SqliteDb};

#[async_trait]
impl ActivityLog for SqliteDb {
    async fn aufzeichnen(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        aktion: Aktion,
        dauer_sek: Option<f64>,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO activity_log (id, user_id, channel_id, action, duration, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.inner().to_string())
        .bind(channel_id.inner().to_string())
        .bind(aktion.als_str())
        .bind(dauer_sek)
        .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl SqliteDb {
    /// Aktivitaeten eines Kanals, neueste zuerst
    pub async fn aktivitaeten(
        &self,
        channel_id: ChannelId,
        limit: u32,
    ) -> DbResult<Vec<AktivitaetsEintrag>> {
        let rows = sqlx::query(
            "SELECT user_id, channel_id, action, duration, timestamp
             FROM activity_log
             WHERE channel_id = ?
             ORDER BY timestamp DESC
             LIMIT ?",
        )
        .bind(channel_id.inner().to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_eintrag).collect()
    }
}

fn row_to_eintrag(row: &sqlx::sqlite::SqliteRow) -> DbResult<AktivitaetsEintrag> {
    use sqlx::Row as _;

    let aktion_str: String = row.try_get("action")?;
    Ok(AktivitaetsEintrag {
        user_id: UserId(parse_uuid(row, "user_id")?),
        channel_id: ChannelId(parse_uuid(row, "channel_id")?),
        aktion: aktion_str.parse::<Aktion>().map_err(DbError::intern)?,
        dauer_sek: row.try_get("duration")?,
        zeitpunkt: parse_zeit(row, "timestamp")?,
    })
}
