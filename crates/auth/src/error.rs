//! Fehlertypen fuer die Token-Validierung

use thiserror::Error;

/// Alle moeglichen Fehler der Token-Validierung
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token fehlt")]
    TokenFehlt,

    #[error("Token ungueltig")]
    TokenUngueltig,

    #[error("Token abgelaufen")]
    TokenAbgelaufen,

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Alias fuer die Token-Validierung
pub type AuthResult<T> = Result<T, AuthError>;
