//! Control-Protokoll (TCP)
//!
//! Definiert alle Nachrichten die ueber die TCP-Verbindung zwischen Client
//! und Server ausgetauscht werden.
//!
//! ## Design
//! - Jede Nachricht hat eine `request_id: u32`; Antworten kopieren sie,
//!   unaufgeforderte Ereignisse (Broadcasts) tragen `0`
//! - JSON-Serialisierung via serde
//! - Ein Tagged Enum fuer beide Richtungen

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprechfunk_core::types::{ChannelId, ConnectionId, ServerId, UserId};

/// Request-ID fuer unaufgeforderte Server-Ereignisse
pub const EREIGNIS_REQUEST_ID: u32 = 0;

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Nachrichten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Allgemein
    InternalError,
    InvalidRequest,
    NotFound,
    // Auth
    Unauthorized,
    AlreadyAuthenticated,
    // Channel
    ChannelFull,
    NotMember,
    NotInChannel,
    // Server
    ServerFull,
}

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// Erste Nachricht jeder Verbindung: Token vorlegen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Vom Token-Aussteller erhaltenes Zugangstoken
    pub token: String,
    /// Client-Version (nur fuer Logs)
    #[serde(default)]
    pub client_version: Option<String>,
}

/// Kanal beitreten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinChannelRequest {
    pub channel_id: ChannelId,
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// Bestaetigung einer erfolgreichen Authentifizierung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedResponse {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub server_id: ServerId,
    pub message: String,
}

/// Kanal-Informationen aus dem Kanal-Register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: ChannelId,
    pub name: String,
    pub max_users: u32,
}

/// Ein anwesendes Kanal-Mitglied im Zustands-Snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub is_speaking: bool,
}

/// Vollstaendiger Kanal-Zustand, nur an den Beitretenden
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStateResponse {
    pub channel: ChannelInfo,
    pub members: Vec<MemberInfo>,
}

/// Join- oder Leave-Ereignis eines Mitglieds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPresenceEvent {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub channel_id: ChannelId,
}

/// Bestaetigung eines expliziten Kanal-Austritts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeftChannelResponse {
    pub channel_id: ChannelId,
}

/// Sprech-Status eines Mitglieds hat sich geaendert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSpeakingEvent {
    pub user_id: UserId,
    pub connection_id: ConnectionId,
    pub channel_id: ChannelId,
    pub is_speaking: bool,
    /// Sprechdauer in Sekunden, nur beim Ende einer Uebertragung
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Audio-Frame
///
/// Vom Client kommt nur `payload`; der Server ergaenzt Absender, Kanal und
/// Zeitstempel bevor er den Frame weiterleitet. Der Payload wird nicht
/// interpretiert (ueblicherweise Base64-kodiertes Opus).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDataMessage {
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AudioDataMessage {
    /// Audio-Frame wie ihn ein Client sendet
    pub fn vom_client(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            user_id: None,
            channel_id: None,
            timestamp: None,
        }
    }
}

/// Standardisierte Fehler-Antwort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Keepalive
// ---------------------------------------------------------------------------

/// Ping (Client -> Server oder Server -> Client)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden fuer RTT-Messung
    pub timestamp_ms: u64,
}

/// Pong-Antwort (spiegelt Timestamp zurueck)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongMessage {
    pub echo_timestamp_ms: u64,
    pub server_timestamp_ms: u64,
}

// ---------------------------------------------------------------------------
// Haupt-Enum
// ---------------------------------------------------------------------------

/// Alle moeglichen Nachrichten (typsicher via Tagged Enum)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlPayload {
    // Client -> Server
    Connect(ConnectRequest),
    JoinChannel(JoinChannelRequest),
    LeaveChannel,
    StartSpeaking,
    StopSpeaking,

    // Server -> Client
    Connected(ConnectedResponse),
    ChannelState(ChannelStateResponse),
    UserJoined(UserPresenceEvent),
    UserLeft(UserPresenceEvent),
    LeftChannel(LeftChannelResponse),
    UserSpeaking(UserSpeakingEvent),

    // Beide Richtungen
    AudioData(AudioDataMessage),
    Ping(PingMessage),
    Pong(PongMessage),

    // Error
    Error(ErrorResponse),
}

impl ControlPayload {
    /// Kurzname fuer Logs (entspricht dem serde-Tag)
    pub fn art(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::JoinChannel(_) => "join_channel",
            Self::LeaveChannel => "leave_channel",
            Self::StartSpeaking => "start_speaking",
            Self::StopSpeaking => "stop_speaking",
            Self::Connected(_) => "connected",
            Self::ChannelState(_) => "channel_state",
            Self::UserJoined(_) => "user_joined",
            Self::UserLeft(_) => "user_left",
            Self::LeftChannel(_) => "left_channel",
            Self::UserSpeaking(_) => "user_speaking",
            Self::AudioData(_) => "audio_data",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Error(_) => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Umschlag
// ---------------------------------------------------------------------------

/// Protokoll-Nachricht mit Request/Response-Zuordnung
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Vom Client vergebene ID, `0` fuer Server-Ereignisse
    pub request_id: u32,
    /// Inhalt der Nachricht
    pub payload: ControlPayload,
}

impl ControlMessage {
    /// Erstellt eine neue Nachricht
    pub fn new(request_id: u32, payload: ControlPayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Erstellt ein unaufgefordertes Server-Ereignis
    pub fn ereignis(payload: ControlPayload) -> Self {
        Self::new(EREIGNIS_REQUEST_ID, payload)
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(request_id: u32, timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ControlPayload::Ping(PingMessage { timestamp_ms }),
        )
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(request_id: u32, echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ControlPayload::Pong(PongMessage {
                echo_timestamp_ms,
                server_timestamp_ms,
            }),
        )
    }

    /// Erstellt eine Fehler-Antwort
    pub fn error(request_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ControlPayload::Error(ErrorResponse {
                code,
                message: message.into(),
            }),
        )
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_namen_entsprechen_dem_vokabular() {
        let msg = ControlMessage::new(3, ControlPayload::StartSpeaking);
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"start_speaking\""), "{json}");

        let join = ControlMessage::new(
            4,
            ControlPayload::JoinChannel(JoinChannelRequest {
                channel_id: ChannelId::new(),
            }),
        );
        assert!(join.to_json().unwrap().contains("\"type\":\"join_channel\""));
    }

    #[test]
    fn client_audio_frame_ohne_absender() {
        let json = r#"{"request_id":9,"payload":{"type":"audio_data","payload":"x"}}"#;
        let msg = ControlMessage::from_json(json).unwrap();
        match msg.payload {
            ControlPayload::AudioData(a) => {
                assert_eq!(a.payload, "x");
                assert!(a.user_id.is_none());
                assert!(a.timestamp.is_none());
            }
            andere => panic!("Erwartet AudioData, erhalten {andere:?}"),
        }
    }

    #[test]
    fn connect_ohne_client_version() {
        let json = r#"{"request_id":1,"payload":{"type":"connect","token":"abc"}}"#;
        let msg = ControlMessage::from_json(json).unwrap();
        assert_eq!(
            msg.payload,
            ControlPayload::Connect(ConnectRequest {
                token: "abc".into(),
                client_version: None,
            })
        );
    }

    #[test]
    fn speaking_dauer_wird_nur_beim_ende_serialisiert() {
        let start = UserSpeakingEvent {
            user_id: UserId::new(),
            connection_id: ConnectionId::new(),
            channel_id: ChannelId::new(),
            is_speaking: true,
            duration_secs: None,
        };
        let json = serde_json::to_string(&start).unwrap();
        assert!(!json.contains("duration_secs"));
    }

    #[test]
    fn error_nachricht() {
        let msg = ControlMessage::error(42, ErrorCode::ChannelFull, "Kanal ist voll");
        let json = msg.to_json().unwrap();
        assert!(json.contains("CHANNEL_FULL"));
        let decoded = ControlMessage::from_json(&json).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn ereignisse_tragen_request_id_null() {
        let msg = ControlMessage::ereignis(ControlPayload::LeaveChannel);
        assert_eq!(msg.request_id, EREIGNIS_REQUEST_ID);
        assert_eq!(msg.payload.art(), "leave_channel");
    }
}
