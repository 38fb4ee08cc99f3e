//! Gemeinsame Test-Hilfen: Instanzen mit In-Memory-Kollaborateuren

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use sprechfunk_auth::TokenStore;
use sprechfunk_core::event::Broker;
use sprechfunk_core::types::{ChannelId, ConnectionId, ServerId, UserId};
use sprechfunk_db::{Aktion, AktivitaetsEintrag, NeuerKanal, SpeicherAktivitaetsLog, SpeicherRegister};
use sprechfunk_observability::SprechfunkMetriken;
use sprechfunk_protocol::control::{ControlMessage, ControlPayload};
use sprechfunk_signaling::{Dienste, SignalingConfig, SignalingState, Uhr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Von Hand gestellte Uhr
#[derive(Clone)]
pub struct TestUhr {
    zeit: Arc<Mutex<DateTime<Utc>>>,
}

impl TestUhr {
    pub fn neu() -> Self {
        Self {
            zeit: Arc::new(Mutex::new(Utc::now())),
        }
    }

    pub fn vorstellen_ms(&self, ms: i64) {
        *self.zeit.lock() += ChronoDuration::milliseconds(ms);
    }

    pub fn als_uhr(&self) -> Uhr {
        let zeit = Arc::clone(&self.zeit);
        Arc::new(move || *zeit.lock())
    }
}

/// Von allen Instanzen geteilte Kollaborateure (Token-Aussteller, Register)
#[derive(Clone)]
pub struct Geteilt {
    pub tokens: Arc<TokenStore>,
    pub register: Arc<SpeicherRegister>,
}

impl Geteilt {
    pub fn neu() -> Self {
        Self {
            tokens: TokenStore::neu(Duration::from_secs(3600)),
            register: Arc::new(SpeicherRegister::neu()),
        }
    }

    /// Legt einen Kanal an und traegt die Benutzer als Mitglieder ein
    pub async fn kanal(&self, name: &str, max_users: u32, mitglieder: &[UserId]) -> ChannelId {
        let kanal = self
            .register
            .kanal_anlegen(NeuerKanal {
                name,
                max_users,
                ..Default::default()
            })
            .await
            .unwrap();
        for user in mitglieder {
            self.register.mitglied_hinzufuegen(*user, kanal.id).await;
        }
        kanal.id
    }

    pub async fn token(&self, user: UserId) -> String {
        self.tokens.ausstellen(user).await.token
    }
}

/// Eine Server-Instanz mit eigenem Aktivitaetslog und eigener Uhr
pub struct Instanz {
    pub state: Arc<SignalingState>,
    pub log: Arc<SpeicherAktivitaetsLog>,
    pub metriken: SprechfunkMetriken,
    pub uhr: TestUhr,
    pub geteilt: Geteilt,
}

impl Instanz {
    pub async fn neu(geteilt: &Geteilt, broker: Option<Arc<dyn Broker>>) -> Self {
        Self::mit_config(geteilt, broker, SignalingConfig::default()).await
    }

    pub async fn mit_config(
        geteilt: &Geteilt,
        broker: Option<Arc<dyn Broker>>,
        mut config: SignalingConfig,
    ) -> Self {
        let log = Arc::new(SpeicherAktivitaetsLog::neu());
        let metriken = SprechfunkMetriken::neu().unwrap();
        let uhr = TestUhr::neu();

        let mut dienste = Dienste::neu(
            geteilt.tokens.clone(),
            geteilt.register.clone(),
            log.clone(),
            metriken.clone(),
        )
        .mit_uhr(uhr.als_uhr());
        if let Some(broker) = broker {
            dienste = dienste.mit_broker(broker);
        }

        config.server_id = ServerId::new();
        config.publish_timeout_ms = 200;
        Self {
            state: SignalingState::neu(config, dienste),
            log,
            metriken,
            uhr,
            geteilt: geteilt.clone(),
        }
    }

    /// Authentifiziert eine neue Verbindung fuer den Benutzer
    pub async fn verbinden(&self, user: UserId) -> Client {
        let token = self.geteilt.token(user).await;
        let conn = ConnectionId::new();
        let (_, rx) = self.state.lifecycle.verbinden(conn, &token).await.unwrap();
        Client { conn, user, rx }
    }

    /// Wartet bis das Aktivitaetslog mindestens `anzahl` Eintraege hat
    pub async fn log_abwarten(&self, anzahl: usize) -> Vec<AktivitaetsEintrag> {
        for _ in 0..200 {
            let eintraege = self.log.eintraege().await;
            if eintraege.len() >= anzahl {
                return eintraege;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.log.eintraege().await
    }

    pub async fn aktionen(&self, anzahl: usize) -> Vec<Aktion> {
        self.log_abwarten(anzahl)
            .await
            .into_iter()
            .map(|e| e.aktion)
            .collect()
    }
}

/// Wartet bis die Bedingung gilt (hoechstens eine Sekunde)
pub async fn abwarten(bedingung: impl Fn() -> bool) {
    for _ in 0..200 {
        if bedingung() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Bedingung nicht rechtzeitig erfuellt");
}

/// Eine authentifizierte Verbindung ohne Transport
pub struct Client {
    pub conn: ConnectionId,
    pub user: UserId,
    pub rx: mpsc::Receiver<ControlMessage>,
}

impl Client {
    /// Naechstes Ereignis (wartet hoechstens eine Sekunde)
    pub async fn empfangen(&mut self) -> ControlPayload {
        tokio::time::timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("kein Ereignis innerhalb einer Sekunde")
            .expect("Send-Queue geschlossen")
            .payload
    }

    /// Prueft dass gerade nichts in der Queue liegt
    pub fn nichts_erhalten(&mut self) -> bool {
        self.rx.try_recv().is_err()
    }

    /// Leert die Queue
    pub fn leeren(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}
