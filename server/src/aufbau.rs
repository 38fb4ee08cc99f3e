//! Aufbau der Kollaborateure aus der Konfiguration
//!
//! Register, Aktivitaetslog, Token-Pruefung und Broker werden hier als
//! Trait-Objekte erzeugt und an den Signaling-Kern uebergeben.

use anyhow::{Context, Result};
use sprechfunk_auth::{JwtValidator, TokenStore, TokenValidator};
use sprechfunk_broker::{RedisBroker, SpeicherBroker};
use sprechfunk_core::event::Broker;
use sprechfunk_core::types::{ChannelId, UserId};
use sprechfunk_db::{
    ActivityLog, ChannelRegistry, DatabaseConfig, NeuerKanal, SpeicherAktivitaetsLog,
    SpeicherRegister, SqliteDb,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{
    AuthEinstellungen, AuthModus, BrokerEinstellungen, BrokerModus, DatenbankBackend,
    DatenbankEinstellungen, KanalVorgabe,
};

/// Register und Aktivitaetslog eines Backends
pub struct Speicher {
    pub register: Arc<dyn ChannelRegistry>,
    pub aktivitaet: Arc<dyn ActivityLog>,
}

/// Oeffnet das konfigurierte Backend und legt die vorgegebenen Kanaele an
pub async fn speicher_oeffnen(einstellungen: &DatenbankEinstellungen) -> Result<Speicher> {
    match einstellungen.backend {
        DatenbankBackend::Memory => {
            let register = Arc::new(SpeicherRegister::neu());
            for vorgabe in &einstellungen.kanaele {
                let kanal = register
                    .kanal_anlegen(neuer_kanal(vorgabe))
                    .await
                    .with_context(|| format!("Kanal '{}' nicht angelegt", vorgabe.name))?;
                for user in &vorgabe.mitglieder {
                    register.mitglied_hinzufuegen(*user, kanal.id).await;
                }
                tracing::debug!(kanal_id = %kanal.id, name = %kanal.name, "Kanal vorbelegt");
            }
            tracing::info!(kanaele = einstellungen.kanaele.len(), "In-Memory-Register bereit");
            Ok(Speicher {
                register,
                aktivitaet: Arc::new(SpeicherAktivitaetsLog::neu()),
            })
        }
        DatenbankBackend::Sqlite => {
            let db = SqliteDb::oeffnen(&DatabaseConfig {
                url: einstellungen.url.clone(),
                max_verbindungen: einstellungen.max_verbindungen,
                sqlite_wal: true,
            })
            .await
            .with_context(|| format!("Datenbank '{}' nicht geoeffnet", einstellungen.url))?;

            // Vorhandene Kanaele bleiben unveraendert, fehlende werden angelegt
            let vorhanden: HashMap<String, ChannelId> = db
                .kanaele()
                .await
                .context("Kanaele nicht lesbar")?
                .into_iter()
                .map(|k| (k.name, k.id))
                .collect();
            for vorgabe in &einstellungen.kanaele {
                let kanal_id = match vorhanden.get(&vorgabe.name) {
                    Some(id) => *id,
                    None => {
                        db.kanal_anlegen(neuer_kanal(vorgabe))
                            .await
                            .with_context(|| format!("Kanal '{}' nicht angelegt", vorgabe.name))?
                            .id
                    }
                };
                for user in &vorgabe.mitglieder {
                    db.mitglied_hinzufuegen(*user, kanal_id)
                        .await
                        .with_context(|| format!("Mitgliedschaft in '{}' nicht gespeichert", vorgabe.name))?;
                }
            }
            tracing::info!(url = %einstellungen.url, "SQLite-Register bereit");

            let db = Arc::new(db);
            Ok(Speicher {
                register: db.clone(),
                aktivitaet: db,
            })
        }
    }
}

fn neuer_kanal(vorgabe: &KanalVorgabe) -> NeuerKanal<'_> {
    NeuerKanal {
        id: vorgabe.id,
        name: &vorgabe.name,
        beschreibung: vorgabe.beschreibung.as_deref(),
        max_users: vorgabe.max_users,
        aktiv: true,
    }
}

/// Token-Pruefung samt der beim Start ausgestellten Entwicklungs-Tokens
pub struct Authentifizierung {
    pub validator: Arc<dyn TokenValidator>,
    pub entwicklungs_tokens: Vec<(UserId, String)>,
}

pub async fn authentifizierung_aufbauen(einstellungen: &AuthEinstellungen) -> Result<Authentifizierung> {
    match einstellungen.modus {
        AuthModus::Jwt => {
            let secret = einstellungen
                .jwt_secret
                .as_deref()
                .context("auth.jwt_secret fehlt")?;
            tracing::info!("Token-Pruefung: JWT (HS256)");
            Ok(Authentifizierung {
                validator: Arc::new(JwtValidator::neu(secret.as_bytes())),
                entwicklungs_tokens: Vec::new(),
            })
        }
        AuthModus::Memory => {
            let store = TokenStore::mit_cleanup(TokenStore::neu(Duration::from_secs(
                einstellungen.token_ttl_sek,
            )));
            let mut entwicklungs_tokens = Vec::with_capacity(einstellungen.entwicklungs_benutzer.len());
            for user in &einstellungen.entwicklungs_benutzer {
                let ausgestellt = store.ausstellen(*user).await;
                tracing::info!(
                    user_id = %user,
                    token = %ausgestellt.token,
                    laeuft_ab_am = %ausgestellt.info.laeuft_ab_am,
                    "Entwicklungs-Token ausgestellt"
                );
                entwicklungs_tokens.push((*user, ausgestellt.token));
            }
            tracing::warn!("Token-Pruefung: lokale Tokens, nur fuer Entwicklung geeignet");
            Ok(Authentifizierung {
                validator: store,
                entwicklungs_tokens,
            })
        }
    }
}

/// Verbindet den konfigurierten Broker
///
/// Ein nicht erreichbarer Broker ist kein Startfehler: die Instanz laeuft
/// dann ohne Verbund weiter.
pub async fn broker_verbinden(einstellungen: &BrokerEinstellungen) -> Option<Arc<dyn Broker>> {
    match einstellungen.modus {
        BrokerModus::None => {
            tracing::info!("Kein Broker konfiguriert, nur lokale Verteilung");
            None
        }
        BrokerModus::Memory => {
            tracing::info!("In-Process-Broker aktiv");
            Some(Arc::new(SpeicherBroker::neu()))
        }
        BrokerModus::Redis => match RedisBroker::verbinden(&einstellungen.url).await {
            Ok(broker) => Some(Arc::new(broker)),
            Err(e) => {
                tracing::warn!(
                    url = %einstellungen.url,
                    fehler = %e,
                    "Redis nicht erreichbar, Betrieb ohne Verbund"
                );
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vorgabe(name: &str, mitglieder: Vec<UserId>) -> KanalVorgabe {
        KanalVorgabe {
            id: Some(ChannelId::new()),
            name: name.into(),
            beschreibung: None,
            max_users: 3,
            mitglieder,
        }
    }

    #[tokio::test]
    async fn memory_register_wird_vorbelegt() {
        let user = UserId::new();
        let lobby = vorgabe("Lobby", vec![user]);
        let kanal_id = lobby.id.unwrap();
        let einstellungen = DatenbankEinstellungen {
            kanaele: vec![lobby],
            ..Default::default()
        };

        let speicher = speicher_oeffnen(&einstellungen).await.unwrap();
        let kanal = speicher.register.kanal(kanal_id).await.unwrap().unwrap();
        assert_eq!(kanal.name, "Lobby");
        assert_eq!(kanal.max_users, 3);
        assert!(speicher.register.ist_mitglied(user, kanal_id).await.unwrap());
        assert!(!speicher
            .register
            .ist_mitglied(UserId::new(), kanal_id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn doppelte_kanalnamen_sind_ein_fehler() {
        let einstellungen = DatenbankEinstellungen {
            kanaele: vec![vorgabe("Lobby", vec![]), vorgabe("Lobby", vec![])],
            ..Default::default()
        };
        assert!(speicher_oeffnen(&einstellungen).await.is_err());
    }

    #[tokio::test]
    async fn entwicklungs_tokens_sind_gueltig() {
        let user = UserId::new();
        let einstellungen = AuthEinstellungen {
            entwicklungs_benutzer: vec![user],
            ..Default::default()
        };
        let auth = authentifizierung_aufbauen(&einstellungen).await.unwrap();
        assert_eq!(auth.entwicklungs_tokens.len(), 1);
        let (token_user, token) = &auth.entwicklungs_tokens[0];
        assert_eq!(*token_user, user);
        assert_eq!(auth.validator.validieren(token).await.unwrap().user_id, user);
    }

    #[tokio::test]
    async fn jwt_modus_prueft_signierte_tokens() {
        let einstellungen = AuthEinstellungen {
            modus: AuthModus::Jwt,
            jwt_secret: Some("geheim".into()),
            ..Default::default()
        };
        let auth = authentifizierung_aufbauen(&einstellungen).await.unwrap();
        let user = UserId::new();
        let token = JwtValidator::neu(b"geheim")
            .signieren(user, chrono::Utc::now() + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(auth.validator.validieren(&token).await.unwrap().user_id, user);
        assert!(auth.validator.validieren("kein.jwt.token").await.is_err());
    }

    #[tokio::test]
    async fn unerreichbarer_redis_faellt_auf_lokal_zurueck() {
        let einstellungen = BrokerEinstellungen {
            modus: BrokerModus::Redis,
            url: "redis://127.0.0.1:1".into(),
            ..Default::default()
        };
        assert!(broker_verbinden(&einstellungen).await.is_none());
    }

    #[tokio::test]
    async fn ohne_broker_kein_verbund() {
        assert!(broker_verbinden(&BrokerEinstellungen::default()).await.is_none());
        let memory = BrokerEinstellungen {
            modus: BrokerModus::Memory,
            ..Default::default()
        };
        assert_eq!(broker_verbinden(&memory).await.unwrap().name(), "speicher");
    }
}
