//! Fehlertypen fuer Sprechfunk
//!
//! Zentraler Fehler-Enum fuer crate-uebergreifende Fehlerzustaende.
//! Untermodule definieren eigene Fehler und konvertieren bei Bedarf.

use thiserror::Error;

/// Globaler Result-Alias fuer Sprechfunk
pub type Result<T> = std::result::Result<T, SprechfunkError>;

/// Crate-uebergreifende Fehler im Sprechfunk-System
#[derive(Debug, Error)]
pub enum SprechfunkError {
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl SprechfunkError {
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}
