//! Port zum Token-Validator

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sprechfunk_core::types::UserId;

use crate::error::AuthResult;

/// Ergebnis einer erfolgreichen Token-Pruefung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub user_id: UserId,
    pub laeuft_ab_am: DateTime<Utc>,
}

impl TokenInfo {
    /// Gibt `true` zurueck wenn das Token zum Zeitpunkt `jetzt` noch gilt
    pub fn ist_gueltig_um(&self, jetzt: DateTime<Utc>) -> bool {
        jetzt < self.laeuft_ab_am
    }
}

/// Prueft Zugangstokens beim Verbindungsaufbau
///
/// Wird genau einmal pro Verbindung aufgerufen. Ungueltige und
/// abgelaufene Tokens muessen als Fehler gemeldet werden.
#[async_trait]
pub trait TokenValidator: Send + Sync + 'static {
    async fn validieren(&self, token: &str) -> AuthResult<TokenInfo>;
}
