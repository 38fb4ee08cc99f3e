//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist (In-Memory-Register, kein Broker).
//!
//! Geheimnisse koennen per Umgebung ueberschrieben werden:
//! - `SPRECHFUNK_JWT_SECRET` → `[auth] jwt_secret`
//! - `SPRECHFUNK_REDIS_URL`  → `[broker] url`

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};
use sprechfunk_core::types::{ChannelId, ServerId, UserId};
use sprechfunk_core::{Result as SfResult, SprechfunkError};
use sprechfunk_db::models::STANDARD_MAX_USERS;
use sprechfunk_observability::logging::{log_format_gueltig, log_level_gueltig};
use sprechfunk_signaling::SignalingConfig;
use std::net::SocketAddr;

pub const ENV_JWT_SECRET: &str = "SPRECHFUNK_JWT_SECRET";
pub const ENV_REDIS_URL: &str = "SPRECHFUNK_REDIS_URL";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Zeitlimits und Queues der Verbindungen
    pub signaling: SignalingEinstellungen,
    /// Kanal-Register und Aktivitaetsprotokoll
    pub datenbank: DatenbankEinstellungen,
    /// Token-Pruefung
    pub auth: AuthEinstellungen,
    /// Pub/Sub-Broker fuer den Verbund mehrerer Instanzen
    pub broker: BrokerEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: u32,
    /// Feste Instanz-ID; ohne Angabe wird bei jedem Start eine erzeugt
    pub server_id: Option<ServerId>,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Sprechfunk Server".into(),
            max_clients: 512,
            server_id: None,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port fuer die TCP-Verbindungen der Clients
    pub tcp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 9987,
        }
    }
}

/// Zeitlimits und Queues pro Verbindung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Zeit fuer die `connect`-Nachricht nach dem TCP-Aufbau
    pub auth_timeout_ms: u64,
    /// Keepalive-Ping-Intervall
    pub keepalive_sek: u64,
    /// Trennung ohne eingehenden Frame nach dieser Zeit
    pub verbindungs_timeout_sek: u64,
    /// Ausgehende Nachrichten pro Verbindung bevor verworfen wird
    pub send_queue_groesse: usize,
    /// Zeitlimit fuer Broker-Veroeffentlichungen
    pub publish_timeout_ms: u64,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        let standard = SignalingConfig::default();
        Self {
            auth_timeout_ms: standard.auth_timeout_ms,
            keepalive_sek: standard.keepalive_sek,
            verbindungs_timeout_sek: standard.verbindungs_timeout_sek,
            send_queue_groesse: standard.send_queue_groesse,
            publish_timeout_ms: standard.publish_timeout_ms,
        }
    }
}

/// Speicher fuer Kanaele, Mitgliedschaften und Aktivitaeten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatenbankBackend {
    Memory,
    Sqlite,
}

/// Datenbank-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatenbankEinstellungen {
    pub backend: DatenbankBackend,
    /// Verbindungs-URL (nur SQLite)
    pub url: String,
    /// Maximale Verbindungspool-Groesse
    pub max_verbindungen: u32,
    /// Kanaele die beim Start angelegt werden, falls sie fehlen
    pub kanaele: Vec<KanalVorgabe>,
}

impl Default for DatenbankEinstellungen {
    fn default() -> Self {
        Self {
            backend: DatenbankBackend::Memory,
            url: "sqlite://sprechfunk.db".into(),
            max_verbindungen: 5,
            kanaele: Vec::new(),
        }
    }
}

/// Ein vorkonfigurierter Kanal (`[[datenbank.kanaele]]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KanalVorgabe {
    #[serde(default)]
    pub id: Option<ChannelId>,
    pub name: String,
    #[serde(default)]
    pub beschreibung: Option<String>,
    #[serde(default = "standard_max_users")]
    pub max_users: u32,
    /// Benutzer mit Mitgliedschaft
    #[serde(default, deserialize_with = "benutzer_ids")]
    pub mitglieder: Vec<UserId>,
}

fn standard_max_users() -> u32 {
    STANDARD_MAX_USERS
}

/// Benutzer-IDs als UUID oder als numerische ID des Token-Ausstellers
///
/// Numerische IDs werden wie das `sub` eines JWT abgebildet.
fn benutzer_ids<'de, D>(deserializer: D) -> Result<Vec<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Angabe {
        Zahl(u64),
        Text(String),
    }

    Vec::<Angabe>::deserialize(deserializer)?
        .into_iter()
        .map(|angabe| match angabe {
            Angabe::Zahl(n) => Ok(UserId::aus_numerischer_id(n)),
            Angabe::Text(s) => UserId::aus_text(&s).ok_or_else(|| {
                <D::Error as serde::de::Error>::custom(format!("ungueltige Benutzer-ID: {s}"))
            }),
        })
        .collect()
}

/// Art der Token-Pruefung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthModus {
    /// HS256-JWTs des externen Token-Ausstellers
    Jwt,
    /// Prozess-lokale Tokens (Entwicklung)
    Memory,
}

/// Auth-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEinstellungen {
    pub modus: AuthModus,
    /// Gemeinsames Geheimnis fuer `modus = "jwt"`
    pub jwt_secret: Option<String>,
    /// Lebensdauer der lokal ausgestellten Tokens
    pub token_ttl_sek: u64,
    /// Benutzer fuer die beim Start lokale Tokens ausgestellt werden
    #[serde(deserialize_with = "benutzer_ids")]
    pub entwicklungs_benutzer: Vec<UserId>,
}

impl Default for AuthEinstellungen {
    fn default() -> Self {
        Self {
            modus: AuthModus::Memory,
            jwt_secret: None,
            token_ttl_sek: 24 * 3600,
            entwicklungs_benutzer: Vec::new(),
        }
    }
}

/// Broker-Betriebsart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerModus {
    /// Nur lokale Verteilung
    None,
    /// In-Process-Broker (eine Instanz, Tests)
    Memory,
    Redis,
}

/// Broker-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerEinstellungen {
    pub modus: BrokerModus,
    /// Redis-URL
    pub url: String,
    /// Topic-Praefix, muss bei allen Instanzen eines Verbunds gleich sein
    pub praefix: String,
}

impl Default for BrokerEinstellungen {
    fn default() -> Self {
        Self {
            modus: BrokerModus::None,
            url: "redis://127.0.0.1:6379".into(),
            praefix: "sprechfunk".into(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei und wendet die
    /// Umgebungsvariablen an.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"))
            }
        };
        config.umgebung_anwenden(|name| std::env::var(name).ok());
        config.validieren()?;
        Ok(config)
    }

    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Ueberschreibt Geheimnisse aus der Umgebung
    pub fn umgebung_anwenden(&mut self, lesen: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lesen(ENV_JWT_SECRET).filter(|s| !s.is_empty()) {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(url) = lesen(ENV_REDIS_URL).filter(|s| !s.is_empty()) {
            self.broker.url = url;
        }
    }

    /// Prueft Kombinationen die sich nicht per Typ ausdruecken lassen
    pub fn validieren(&self) -> SfResult<()> {
        let fehler = |msg: String| Err(SprechfunkError::konfiguration(msg));

        if self.auth.modus == AuthModus::Jwt
            && self.auth.jwt_secret.as_deref().map_or(true, str::is_empty)
        {
            return fehler(format!(
                "auth.modus = \"jwt\" benoetigt auth.jwt_secret oder {ENV_JWT_SECRET}"
            ));
        }
        if self.server.max_clients == 0 {
            return fehler("server.max_clients muss groesser als 0 sein".into());
        }
        if self.signaling.send_queue_groesse == 0 {
            return fehler("signaling.send_queue_groesse muss groesser als 0 sein".into());
        }
        if self.signaling.verbindungs_timeout_sek <= self.signaling.keepalive_sek {
            return fehler("signaling.verbindungs_timeout_sek muss groesser als keepalive_sek sein".into());
        }
        if !log_level_gueltig(&self.logging.level) {
            return fehler(format!("Unbekanntes Log-Level '{}'", self.logging.level));
        }
        if !log_format_gueltig(&self.logging.format) {
            return fehler(format!("Unbekanntes Log-Format '{}'", self.logging.format));
        }
        for kanal in &self.datenbank.kanaele {
            if kanal.name.trim().is_empty() {
                return fehler("Kanal ohne Namen in datenbank.kanaele".into());
            }
            if kanal.max_users == 0 {
                return fehler(format!("Kanal '{}': max_users muss groesser als 0 sein", kanal.name));
            }
        }
        Ok(())
    }

    /// Konfiguration des Signaling-Kerns
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            server_id: self.server.server_id.unwrap_or_default(),
            server_name: self.server.name.clone(),
            max_clients: self.server.max_clients,
            keepalive_sek: self.signaling.keepalive_sek,
            verbindungs_timeout_sek: self.signaling.verbindungs_timeout_sek,
            auth_timeout_ms: self.signaling.auth_timeout_ms,
            send_queue_groesse: self.signaling.send_queue_groesse,
            publish_timeout_ms: self.signaling.publish_timeout_ms,
            broker_praefix: self.broker.praefix.clone(),
        }
    }

    /// Bind-Adresse fuer die Client-Verbindungen
    pub fn tcp_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        adresse(&self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Bind-Adresse fuer den Observability-Server
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        adresse(&self.netzwerk.bind_adresse, self.observability.port)
    }
}

fn adresse(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Ungueltige Bind-Adresse '{host}:{port}'"))
}
