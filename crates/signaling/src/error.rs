//! Fehlertypen fuer den Signaling-Service

use sprechfunk_auth::AuthError;
use sprechfunk_db::DbError;
use sprechfunk_protocol::control::{ControlMessage, ErrorCode};
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Token ungueltig, abgelaufen oder fehlend
    #[error("Nicht autorisiert: {0}")]
    Auth(#[from] AuthError),

    /// Token formal gueltig, aber zum Pruefzeitpunkt abgelaufen
    #[error("Nicht autorisiert: {0}")]
    Unauthorized(String),

    /// Kanal-Register nicht erreichbar
    #[error("Datenbankfehler: {0}")]
    Db(#[from] DbError),

    /// Unbekannte Sitzung oder unbekannter/inaktiver Kanal
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Kanal ist voll
    #[error("Kanal ist voll")]
    KanalVoll,

    /// Keine persistente Mitgliedschaft im Kanal
    #[error("Keine Mitgliedschaft in diesem Kanal")]
    KeinMitglied,

    /// Verbindung ist in keinem (bzw. nicht in diesem) Kanal anwesend
    #[error("Nicht in einem Kanal")]
    NichtAnwesend,

    /// Uebergang im aktuellen Verbindungszustand nicht erlaubt
    #[error("Ungueltiger Zustand: {0}")]
    UngueltigerZustand(String),

    /// Verbindung ist bereits registriert bzw. authentifiziert
    #[error("Verbindung bereits geoeffnet")]
    BereitsOffen,

    /// Server ist voll, die Verbindung wird abgewiesen
    #[error("Server ist voll")]
    ServerVoll,

    /// Keine Authentifizierung innerhalb des Zeitlimits
    #[error("Authentifizierung Zeitlimit ueberschritten")]
    Timeout,
}

impl SignalingError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    /// Fehlercode fuer die Antwort an den Client
    pub fn fehler_code(&self) -> ErrorCode {
        match self {
            Self::Auth(_) | Self::Unauthorized(_) | Self::Timeout => ErrorCode::Unauthorized,
            Self::NichtGefunden(_) => ErrorCode::NotFound,
            Self::KanalVoll => ErrorCode::ChannelFull,
            Self::KeinMitglied => ErrorCode::NotMember,
            Self::NichtAnwesend => ErrorCode::NotInChannel,
            Self::UngueltigerZustand(_) => ErrorCode::InvalidRequest,
            Self::BereitsOffen => ErrorCode::AlreadyAuthenticated,
            Self::ServerVoll => ErrorCode::ServerFull,
            Self::Db(_) => ErrorCode::InternalError,
        }
    }

    /// Fehler-Nachricht an den Client
    pub fn als_nachricht(&self, request_id: u32) -> ControlMessage {
        ControlMessage::error(request_id, self.fehler_code(), self.to_string())
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
