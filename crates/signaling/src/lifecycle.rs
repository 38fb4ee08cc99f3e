//! Lifecycle-Controller – Zustandsuebergaenge einer Verbindung
//!
//! ```text
//! Verbunden --join--> ImKanal --start--> Spricht
//!     ^                 |  ^               |
//!     +-----leave-------+  +-----stop------+
//! ```
//!
//! Jeder Uebergang aktualisiert zuerst Sitzung und Presence (kurze Sperren),
//! verteilt danach lokal ueber den Router und veroeffentlicht zuletzt ueber
//! die Relay-Bruecke. Aktivitaeten werden fire-and-forget protokolliert.
//!
//! `trennen` laeuft immer vollstaendig durch: eine sprechende Verbindung
//! beendet zuerst ihre Uebertragung, verlaesst dann den Kanal und wird
//! zuletzt aus Register und Router entfernt.

use chrono::{DateTime, Utc};
use sprechfunk_auth::TokenValidator;
use sprechfunk_core::event::Broker;
use sprechfunk_core::types::{ChannelId, ConnectionId, ServerId, UserId};
use sprechfunk_db::{ActivityLog, Aktion, ChannelRegistry, KanalRecord};
use sprechfunk_observability::SprechfunkMetriken;
use sprechfunk_protocol::control::{
    AudioDataMessage, ChannelInfo, ChannelStateResponse, ControlMessage, ControlPayload,
    MemberInfo, UserPresenceEvent, UserSpeakingEvent,
};
use sprechfunk_protocol::relay::RelayArt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::aktivitaet::AktivitaetsSchreiber;
use crate::broadcast::RoomRouter;
use crate::error::{SignalingError, SignalingResult};
use crate::presence::{KanalZugang, PresenceTable};
use crate::relay::{RelayBridge, RelayEinstellungen};
use crate::session::{SessionRegistry, Sitzung};

/// Zeitquelle, austauschbar fuer Tests
pub type Uhr = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Systemuhr
pub fn system_uhr() -> Uhr {
    Arc::new(Utc::now)
}

// ---------------------------------------------------------------------------
// Dienste
// ---------------------------------------------------------------------------

/// Externe Kollaborateure des Signaling-Kerns
#[derive(Clone)]
pub struct Dienste {
    pub validator: Arc<dyn TokenValidator>,
    pub register: Arc<dyn ChannelRegistry>,
    pub aktivitaet: Arc<dyn ActivityLog>,
    /// `None` = rein lokaler Betrieb
    pub broker: Option<Arc<dyn Broker>>,
    pub metriken: SprechfunkMetriken,
    pub uhr: Uhr,
}

impl Dienste {
    pub fn neu(
        validator: Arc<dyn TokenValidator>,
        register: Arc<dyn ChannelRegistry>,
        aktivitaet: Arc<dyn ActivityLog>,
        metriken: SprechfunkMetriken,
    ) -> Self {
        Self {
            validator,
            register,
            aktivitaet,
            broker: None,
            metriken,
            uhr: system_uhr(),
        }
    }

    pub fn mit_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn mit_uhr(mut self, uhr: Uhr) -> Self {
        self.uhr = uhr;
        self
    }
}

// ---------------------------------------------------------------------------
// LifecycleController
// ---------------------------------------------------------------------------

/// Besitzt alle Kern-Bausteine einer Server-Instanz
pub struct LifecycleController {
    server_id: ServerId,
    sitzungen: SessionRegistry,
    presence: PresenceTable,
    router: RoomRouter,
    relay: RelayBridge,
    validator: Arc<dyn TokenValidator>,
    register: Arc<dyn ChannelRegistry>,
    aktivitaet: AktivitaetsSchreiber,
    metriken: SprechfunkMetriken,
    uhr: Uhr,
}

impl LifecycleController {
    /// Baut den Controller samt Register, Presence, Router und Relay
    ///
    /// Muss innerhalb einer Tokio-Runtime aufgerufen werden (startet den
    /// Aktivitaets-Schreiber).
    pub fn neu(
        server_id: ServerId,
        dienste: Dienste,
        send_queue_groesse: usize,
        relay_einstellungen: RelayEinstellungen,
    ) -> Self {
        let sitzungen = SessionRegistry::neu();
        let presence = PresenceTable::neu();
        let router = RoomRouter::neu(presence.clone(), send_queue_groesse);
        let relay = RelayBridge::neu(
            server_id,
            dienste.broker,
            router.clone(),
            relay_einstellungen,
            dienste.metriken.clone(),
        );

        Self {
            server_id,
            sitzungen,
            presence,
            router,
            relay,
            validator: dienste.validator,
            register: dienste.register,
            aktivitaet: AktivitaetsSchreiber::starten(dienste.aktivitaet),
            metriken: dienste.metriken,
            uhr: dienste.uhr,
        }
    }

    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    pub fn sitzungen(&self) -> &SessionRegistry {
        &self.sitzungen
    }

    pub fn presence(&self) -> &PresenceTable {
        &self.presence
    }

    pub fn router(&self) -> &RoomRouter {
        &self.router
    }

    pub fn relay(&self) -> &RelayBridge {
        &self.relay
    }

    fn jetzt(&self) -> DateTime<Utc> {
        (self.uhr)()
    }

    fn sitzung(&self, connection_id: &ConnectionId) -> SignalingResult<Sitzung> {
        self.sitzungen
            .abrufen(connection_id)
            .ok_or_else(|| SignalingError::nicht_gefunden(format!("Sitzung {connection_id}")))
    }

    fn kanaele_aktualisieren(&self) {
        self.metriken
            .channels_active
            .set(self.presence.aktive_kanaele() as i64);
    }

    // -----------------------------------------------------------------------
    // Verbinden
    // -----------------------------------------------------------------------

    /// Authentifiziert eine Verbindung und registriert sie
    ///
    /// Gibt die Sitzung und die Send-Queue der Verbindung zurueck.
    pub async fn verbinden(
        &self,
        connection_id: ConnectionId,
        token: &str,
    ) -> SignalingResult<(Sitzung, mpsc::Receiver<ControlMessage>)> {
        let info = self.validator.validieren(token).await?;
        let jetzt = self.jetzt();
        if !info.ist_gueltig_um(jetzt) {
            return Err(SignalingError::Unauthorized("Token abgelaufen".into()));
        }

        let sitzung = self.sitzungen.oeffnen(connection_id, info.user_id, jetzt)?;
        let rx = self.router.client_registrieren(connection_id);
        self.metriken.connected_clients.inc();

        tracing::info!(
            connection_id = %connection_id,
            user_id = %info.user_id,
            "Verbindung authentifiziert"
        );
        Ok((sitzung, rx))
    }

    // -----------------------------------------------------------------------
    // Kanal beitreten / verlassen
    // -----------------------------------------------------------------------

    /// Tritt einem Kanal bei und liefert dessen aktuellen Zustand
    ///
    /// Ein Beitritt zum aktuellen Kanal ist idempotent. Ein Wechsel zieht die
    /// Verbindung unter beiden Kanal-Sperren um; scheitert er, bleibt sie im
    /// bisherigen Kanal. Eine laufende Uebertragung endet mit dem Versuch.
    pub async fn kanal_beitreten(
        &self,
        connection_id: ConnectionId,
        channel_id: ChannelId,
    ) -> SignalingResult<ChannelStateResponse> {
        let sitzung = self.sitzung(&connection_id)?;

        let kanal = match self.register.kanal(channel_id).await? {
            Some(kanal) if kanal.aktiv => kanal,
            _ => {
                self.metriken.beitritt_abgelehnt("unbekannt");
                return Err(SignalingError::nicht_gefunden(format!("Kanal {channel_id}")));
            }
        };

        if sitzung.channel_id == Some(channel_id) {
            return Ok(self.kanal_zustand(&kanal));
        }

        if !self.register.ist_mitglied(sitzung.user_id, channel_id).await? {
            self.metriken.beitritt_abgelehnt("kein_mitglied");
            tracing::debug!(
                connection_id = %connection_id,
                kanal_id = %channel_id,
                "Beitritt ohne Mitgliedschaft abgelehnt"
            );
            return Err(SignalingError::KeinMitglied);
        }

        // Voller Kanal: Ablehnung ohne Nebenwirkung
        if self.presence.anzahl(&channel_id) >= kanal.max_users as usize {
            self.metriken.beitritt_abgelehnt("voll");
            return Err(SignalingError::KanalVoll);
        }

        let zugang = KanalZugang {
            ist_mitglied: true,
            kapazitaet: kanal.max_users,
        };
        let eingetragen = match sitzung.channel_id {
            Some(alt) => {
                if let Err(e) = self.sprechen_beenden(connection_id).await {
                    tracing::debug!(connection_id = %connection_id, fehler = %e, "Sprechende beim Wechsel nicht moeglich");
                }
                self.presence
                    .wechseln(alt, channel_id, connection_id, sitzung.user_id, &zugang)
            }
            None => self
                .presence
                .beitreten(channel_id, connection_id, sitzung.user_id, &zugang),
        };
        if let Err(e) = eingetragen {
            if matches!(e, SignalingError::KanalVoll) {
                self.metriken.beitritt_abgelehnt("voll");
            }
            return Err(e);
        }
        if let Some(alt) = sitzung.channel_id {
            self.austritt_melden(connection_id, sitzung.user_id, alt);
        }
        self.sitzungen.kanal_setzen(&connection_id, Some(channel_id))?;
        self.kanaele_aktualisieren();

        self.aktivitaet
            .aufzeichnen(sitzung.user_id, channel_id, Aktion::Join, None);

        let ereignis = ControlPayload::UserJoined(UserPresenceEvent {
            user_id: sitzung.user_id,
            connection_id,
            channel_id,
        });
        self.router.an_kanal_senden(
            &channel_id,
            ControlMessage::ereignis(ereignis.clone()),
            Some(&connection_id),
        );
        self.relay
            .veroeffentlichen(channel_id, RelayArt::Join, ereignis);

        tracing::info!(
            connection_id = %connection_id,
            user_id = %sitzung.user_id,
            kanal_id = %channel_id,
            "Kanal beigetreten"
        );
        Ok(self.kanal_zustand(&kanal))
    }

    fn kanal_zustand(&self, kanal: &KanalRecord) -> ChannelStateResponse {
        let members = self
            .presence
            .mitglieder(&kanal.id)
            .into_iter()
            .map(|a| MemberInfo {
                connection_id: a.connection_id,
                user_id: a.user_id,
                is_speaking: a.spricht,
            })
            .collect();

        ChannelStateResponse {
            channel: ChannelInfo {
                channel_id: kanal.id,
                name: kanal.name.clone(),
                max_users: kanal.max_users,
            },
            members,
        }
    }

    /// Verlaesst den aktuellen Kanal
    pub async fn kanal_verlassen(&self, connection_id: ConnectionId) -> SignalingResult<ChannelId> {
        let sitzung = self.sitzung(&connection_id)?;
        let channel_id = sitzung.channel_id.ok_or(SignalingError::NichtAnwesend)?;
        self.austreten(connection_id, sitzung.user_id, channel_id).await;
        Ok(channel_id)
    }

    /// Gemeinsamer Austritt fuer leave, Kanalwechsel und Trennung
    async fn austreten(&self, connection_id: ConnectionId, user_id: UserId, channel_id: ChannelId) {
        if let Err(e) = self.sprechen_beenden(connection_id).await {
            tracing::debug!(connection_id = %connection_id, fehler = %e, "Sprechende beim Austritt nicht moeglich");
        }

        let war_anwesend = self.presence.verlassen(channel_id, &connection_id);
        if let Err(e) = self.sitzungen.kanal_setzen(&connection_id, None) {
            tracing::debug!(connection_id = %connection_id, fehler = %e, "Sitzung beim Austritt nicht mehr vorhanden");
        }
        self.kanaele_aktualisieren();

        if war_anwesend {
            self.austritt_melden(connection_id, user_id, channel_id);
        }
    }

    /// Protokolliert und verteilt `user_left` fuer einen verlassenen Kanal
    fn austritt_melden(&self, connection_id: ConnectionId, user_id: UserId, channel_id: ChannelId) {
        self.aktivitaet
            .aufzeichnen(user_id, channel_id, Aktion::Leave, None);

        let ereignis = ControlPayload::UserLeft(UserPresenceEvent {
            user_id,
            connection_id,
            channel_id,
        });
        self.router
            .an_kanal_senden(&channel_id, ControlMessage::ereignis(ereignis.clone()), None);
        self.relay
            .veroeffentlichen(channel_id, RelayArt::Leave, ereignis);

        tracing::info!(
            connection_id = %connection_id,
            user_id = %user_id,
            kanal_id = %channel_id,
            "Kanal verlassen"
        );
    }

    // -----------------------------------------------------------------------
    // Sprechen
    // -----------------------------------------------------------------------

    /// Beginnt eine Uebertragung
    ///
    /// Gibt `false` zurueck wenn die Verbindung bereits spricht (kein
    /// erneutes Ereignis).
    pub async fn sprechen_starten(&self, connection_id: ConnectionId) -> SignalingResult<bool> {
        let sitzung = self.sitzung(&connection_id)?;
        let channel_id = sitzung.channel_id.ok_or(SignalingError::NichtAnwesend)?;
        if sitzung.spricht {
            return Ok(false);
        }

        let jetzt = self.jetzt();
        self.sitzungen.sprechen_setzen(&connection_id, true, jetzt)?;
        if let Err(e) = self.presence.sprechen_setzen(channel_id, &connection_id, true) {
            // Sitzung und Presence duerfen nicht auseinanderlaufen
            self.sitzungen.sprechen_setzen(&connection_id, false, jetzt)?;
            return Err(e);
        }

        self.aktivitaet
            .aufzeichnen(sitzung.user_id, channel_id, Aktion::SpeakStart, None);

        let ereignis = ControlPayload::UserSpeaking(UserSpeakingEvent {
            user_id: sitzung.user_id,
            connection_id,
            channel_id,
            is_speaking: true,
            duration_secs: None,
        });
        self.router
            .an_kanal_senden(&channel_id, ControlMessage::ereignis(ereignis.clone()), None);
        self.relay
            .veroeffentlichen(channel_id, RelayArt::Speaking, ereignis);

        tracing::debug!(connection_id = %connection_id, kanal_id = %channel_id, "Sprechen gestartet");
        Ok(true)
    }

    /// Beendet eine Uebertragung und gibt ihre Dauer in Sekunden zurueck
    ///
    /// Ohne laufende Uebertragung ein No-op (`Ok(None)`).
    pub async fn sprechen_beenden(&self, connection_id: ConnectionId) -> SignalingResult<Option<f64>> {
        let sitzung = self.sitzung(&connection_id)?;
        let (Some(channel_id), true) = (sitzung.channel_id, sitzung.spricht) else {
            return Ok(None);
        };

        let jetzt = self.jetzt();
        let start = self.sitzungen.sprechen_setzen(&connection_id, false, jetzt)?;
        if let Err(e) = self.presence.sprechen_setzen(channel_id, &connection_id, false) {
            tracing::debug!(connection_id = %connection_id, fehler = %e, "Sprech-Flag in Presence fehlte");
        }

        let dauer = start
            .map(|s| (jetzt - s).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);

        self.aktivitaet
            .aufzeichnen(sitzung.user_id, channel_id, Aktion::SpeakEnd, Some(dauer));

        let ereignis = ControlPayload::UserSpeaking(UserSpeakingEvent {
            user_id: sitzung.user_id,
            connection_id,
            channel_id,
            is_speaking: false,
            duration_secs: Some(dauer),
        });
        self.router
            .an_kanal_senden(&channel_id, ControlMessage::ereignis(ereignis.clone()), None);
        self.relay
            .veroeffentlichen(channel_id, RelayArt::Speaking, ereignis);

        tracing::debug!(
            connection_id = %connection_id,
            kanal_id = %channel_id,
            dauer_sek = dauer,
            "Sprechen beendet"
        );
        Ok(Some(dauer))
    }

    /// Leitet einen Audio-Frame an alle anderen Anwesenden weiter
    ///
    /// Frames ausserhalb einer Uebertragung und leere Frames werden still
    /// verworfen. Gibt zurueck ob der Frame weitergeleitet wurde.
    pub async fn audio_weiterleiten(&self, connection_id: ConnectionId, audio: AudioDataMessage) -> bool {
        let Some(sitzung) = self.sitzungen.abrufen(&connection_id) else {
            return false;
        };
        let (Some(channel_id), true) = (sitzung.channel_id, sitzung.spricht) else {
            tracing::trace!(connection_id = %connection_id, "Audio-Frame ausserhalb einer Uebertragung verworfen");
            return false;
        };
        if audio.payload.is_empty() {
            return false;
        }

        let frame = ControlPayload::AudioData(AudioDataMessage {
            payload: audio.payload,
            user_id: Some(sitzung.user_id),
            channel_id: Some(channel_id),
            timestamp: Some(self.jetzt()),
        });
        self.router.an_kanal_senden(
            &channel_id,
            ControlMessage::ereignis(frame.clone()),
            Some(&connection_id),
        );
        self.metriken.audio_frames_total.inc();
        self.relay
            .veroeffentlichen(channel_id, RelayArt::Audio, frame);
        true
    }

    // -----------------------------------------------------------------------
    // Trennen
    // -----------------------------------------------------------------------

    /// Raeumt eine Verbindung vollstaendig ab
    ///
    /// Laeuft immer durch, auch wenn einzelne Schritte fehlschlagen oder
    /// eine vorherige Anfrage nur teilweise angewendet wurde.
    pub async fn trennen(&self, connection_id: ConnectionId) {
        if let Some(sitzung) = self.sitzungen.abrufen(&connection_id) {
            let kanal = sitzung
                .channel_id
                .or_else(|| self.presence.kanal_von(&connection_id));
            if let Some(channel_id) = kanal {
                self.austreten(connection_id, sitzung.user_id, channel_id).await;
            }
        }

        // Reste ohne Sitzung (abgebrochener Beitritt)
        if let Some(channel_id) = self.presence.kanal_von(&connection_id) {
            self.presence.verlassen(channel_id, &connection_id);
            self.kanaele_aktualisieren();
        }

        match self.sitzungen.schliessen(&connection_id) {
            Ok(sitzung) => {
                self.metriken.connected_clients.dec();
                tracing::info!(
                    connection_id = %connection_id,
                    user_id = %sitzung.user_id,
                    "Verbindung getrennt"
                );
            }
            Err(_) => {
                tracing::debug!(connection_id = %connection_id, "Trennung ohne Sitzung");
            }
        }
        self.router.client_entfernen(&connection_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sprechfunk_auth::TokenStore;
    use sprechfunk_db::{NeuerKanal, SpeicherAktivitaetsLog, SpeicherRegister};

    struct Aufbau {
        controller: LifecycleController,
        tokens: Arc<TokenStore>,
        register: Arc<SpeicherRegister>,
    }

    async fn aufbau() -> Aufbau {
        let tokens = TokenStore::neu(sprechfunk_auth::token_store::STANDARD_TTL);
        let register = Arc::new(SpeicherRegister::neu());
        let dienste = Dienste::neu(
            tokens.clone(),
            register.clone(),
            Arc::new(SpeicherAktivitaetsLog::neu()),
            SprechfunkMetriken::neu().unwrap(),
        );
        Aufbau {
            controller: LifecycleController::neu(
                ServerId::new(),
                dienste,
                16,
                RelayEinstellungen::default(),
            ),
            tokens,
            register,
        }
    }

    async fn kanal(register: &SpeicherRegister, name: &str, max_users: u32) -> ChannelId {
        register
            .kanal_anlegen(NeuerKanal {
                name,
                max_users,
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    async fn verbinden(a: &Aufbau, user: UserId) -> (ConnectionId, mpsc::Receiver<ControlMessage>) {
        let token = a.tokens.ausstellen(user).await.token;
        let conn = ConnectionId::new();
        let (_, rx) = a.controller.verbinden(conn, &token).await.unwrap();
        (conn, rx)
    }

    #[tokio::test]
    async fn ungueltiges_token_wird_abgelehnt() {
        let a = aufbau().await;
        let ergebnis = a.controller.verbinden(ConnectionId::new(), "falsch").await;
        assert!(matches!(ergebnis, Err(SignalingError::Auth(_))));
        assert_eq!(a.controller.sitzungen().anzahl(), 0);
    }

    #[tokio::test]
    async fn beitritt_liefert_zustand_und_ist_idempotent() {
        let a = aufbau().await;
        let user = UserId::new();
        let lobby = kanal(&a.register, "Lobby", 5).await;
        a.register.mitglied_hinzufuegen(user, lobby).await;
        let (conn, _rx) = verbinden(&a, user).await;

        let zustand = a.controller.kanal_beitreten(conn, lobby).await.unwrap();
        assert_eq!(zustand.channel.name, "Lobby");
        assert_eq!(zustand.members.len(), 1);

        let nochmal = a.controller.kanal_beitreten(conn, lobby).await.unwrap();
        assert_eq!(nochmal.members.len(), 1);
        assert_eq!(a.controller.presence().anzahl(&lobby), 1);
    }

    #[tokio::test]
    async fn unbekannter_oder_inaktiver_kanal() {
        let a = aufbau().await;
        let user = UserId::new();
        let (conn, _rx) = verbinden(&a, user).await;

        assert!(matches!(
            a.controller.kanal_beitreten(conn, ChannelId::new()).await,
            Err(SignalingError::NichtGefunden(_))
        ));

        let archiv = kanal(&a.register, "Archiv", 5).await;
        a.register.mitglied_hinzufuegen(user, archiv).await;
        a.register.kanal_aktiv_setzen(archiv, false).await.unwrap();
        assert!(matches!(
            a.controller.kanal_beitreten(conn, archiv).await,
            Err(SignalingError::NichtGefunden(_))
        ));
    }

    #[tokio::test]
    async fn abgelehnter_wechsel_behaelt_alten_kanal() {
        let a = aufbau().await;
        let user = UserId::new();
        let lobby = kanal(&a.register, "Lobby", 5).await;
        let geheim = kanal(&a.register, "Geheim", 5).await;
        a.register.mitglied_hinzufuegen(user, lobby).await;
        let (conn, _rx) = verbinden(&a, user).await;

        a.controller.kanal_beitreten(conn, lobby).await.unwrap();
        assert!(matches!(
            a.controller.kanal_beitreten(conn, geheim).await,
            Err(SignalingError::KeinMitglied)
        ));
        assert_eq!(a.controller.presence().kanal_von(&conn), Some(lobby));
    }

    #[tokio::test]
    async fn voller_zielkanal_behaelt_alten_kanal() {
        let a = aufbau().await;
        let (user, hoerer, besetzer) = (UserId::new(), UserId::new(), UserId::new());
        let lobby = kanal(&a.register, "Lobby", 5).await;
        let eng = kanal(&a.register, "Eng", 1).await;
        for (u, k) in [(user, lobby), (user, eng), (hoerer, lobby), (besetzer, eng)] {
            a.register.mitglied_hinzufuegen(u, k).await;
        }

        let (conn, _rx) = verbinden(&a, user).await;
        let (hoerer_conn, mut hoerer_rx) = verbinden(&a, hoerer).await;
        let (besetzer_conn, _besetzer_rx) = verbinden(&a, besetzer).await;
        a.controller.kanal_beitreten(hoerer_conn, lobby).await.unwrap();
        a.controller.kanal_beitreten(conn, lobby).await.unwrap();
        a.controller.kanal_beitreten(besetzer_conn, eng).await.unwrap();
        while hoerer_rx.try_recv().is_ok() {}

        assert!(matches!(
            a.controller.kanal_beitreten(conn, eng).await,
            Err(SignalingError::KanalVoll)
        ));
        assert_eq!(a.controller.presence().kanal_von(&conn), Some(lobby));
        assert_eq!(a.controller.presence().anzahl(&lobby), 2);
        assert_eq!(a.controller.presence().anzahl(&eng), 1);
        let sitzung = a.controller.sitzungen().abrufen(&conn).unwrap();
        assert_eq!(sitzung.channel_id, Some(lobby));
        // Kein user_left im alten Kanal
        assert!(hoerer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn kanalwechsel_verlaesst_alten_kanal() {
        let a = aufbau().await;
        let user = UserId::new();
        let lobby = kanal(&a.register, "Lobby", 5).await;
        let team = kanal(&a.register, "Team", 5).await;
        a.register.mitglied_hinzufuegen(user, lobby).await;
        a.register.mitglied_hinzufuegen(user, team).await;
        let (conn, _rx) = verbinden(&a, user).await;

        a.controller.kanal_beitreten(conn, lobby).await.unwrap();
        a.controller.sprechen_starten(conn).await.unwrap();
        a.controller.kanal_beitreten(conn, team).await.unwrap();

        assert_eq!(a.controller.presence().anzahl(&lobby), 0);
        assert_eq!(a.controller.presence().kanal_von(&conn), Some(team));
        let sitzung = a.controller.sitzungen().abrufen(&conn).unwrap();
        assert_eq!(sitzung.channel_id, Some(team));
        assert!(!sitzung.spricht);
    }

    #[tokio::test]
    async fn sprechen_ausserhalb_eines_kanals() {
        let a = aufbau().await;
        let (conn, _rx) = verbinden(&a, UserId::new()).await;
        assert!(matches!(
            a.controller.sprechen_starten(conn).await,
            Err(SignalingError::NichtAnwesend)
        ));
        assert_eq!(a.controller.sprechen_beenden(conn).await.unwrap(), None);
        assert!(matches!(
            a.controller.kanal_verlassen(conn).await,
            Err(SignalingError::NichtAnwesend)
        ));
    }

    #[tokio::test]
    async fn trennen_raeumt_alles_ab() {
        let a = aufbau().await;
        let user = UserId::new();
        let lobby = kanal(&a.register, "Lobby", 5).await;
        a.register.mitglied_hinzufuegen(user, lobby).await;
        let (conn, _rx) = verbinden(&a, user).await;
        a.controller.kanal_beitreten(conn, lobby).await.unwrap();
        a.controller.sprechen_starten(conn).await.unwrap();

        a.controller.trennen(conn).await;
        assert!(a.controller.sitzungen().abrufen(&conn).is_none());
        assert_eq!(a.controller.presence().anzahl(&lobby), 0);
        assert!(!a.controller.router().ist_registriert(&conn));

        // Zweites Trennen ist harmlos
        a.controller.trennen(conn).await;
    }
}
