//! Fire-and-forget Schreiber fuer das Aktivitaetsprotokoll
//!
//! Eintraege werden in eine Queue gestellt und von einem einzelnen Task in
//! Reihenfolge geschrieben. Fehler und eine volle Queue werden nur geloggt;
//! der Aufrufer wartet nie auf die Datenbank.

use sprechfunk_core::types::{ChannelId, UserId};
use sprechfunk_db::{ActivityLog, Aktion};
use std::sync::Arc;
use tokio::sync::mpsc;

const QUEUE_GROESSE: usize = 1024;

#[derive(Debug)]
struct Auftrag {
    user_id: UserId,
    channel_id: ChannelId,
    aktion: Aktion,
    dauer_sek: Option<f64>,
}

/// Handle auf die Schreib-Queue
#[derive(Clone)]
pub struct AktivitaetsSchreiber {
    tx: mpsc::Sender<Auftrag>,
}

impl AktivitaetsSchreiber {
    /// Startet den Schreib-Task (benoetigt eine laufende Tokio-Runtime)
    ///
    /// Der Task endet wenn alle Handles gedroppt sind.
    pub fn starten(log: Arc<dyn ActivityLog>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Auftrag>(QUEUE_GROESSE);
        tokio::spawn(async move {
            while let Some(auftrag) = rx.recv().await {
                if let Err(e) = log
                    .aufzeichnen(
                        auftrag.user_id,
                        auftrag.channel_id,
                        auftrag.aktion,
                        auftrag.dauer_sek,
                    )
                    .await
                {
                    tracing::warn!(
                        user_id = %auftrag.user_id,
                        kanal_id = %auftrag.channel_id,
                        aktion = auftrag.aktion.als_str(),
                        fehler = %e,
                        "Aktivitaet konnte nicht gespeichert werden"
                    );
                }
            }
        });
        Self { tx }
    }

    pub fn aufzeichnen(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        aktion: Aktion,
        dauer_sek: Option<f64>,
    ) {
        let auftrag = Auftrag {
            user_id,
            channel_id,
            aktion,
            dauer_sek,
        };
        if let Err(e) = self.tx.try_send(auftrag) {
            tracing::warn!(fehler = %e, "Aktivitaets-Queue voll – Eintrag verworfen");
        }
    }
}
