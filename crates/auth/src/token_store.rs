//! In-Memory Token-Aussteller
//!
//! Stellt opake Zugangstokens (URL-sicheres Base64) mit fester Lebensdauer
//! aus und prueft sie beim Verbindungsaufbau. Gedacht fuer Entwicklung,
//! Tests und Einzelinstanz-Betrieb; im Verbund wird [`crate::JwtValidator`]
//! verwendet, weil alle Instanzen dasselbe Geheimnis kennen.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sprechfunk_core::types::UserId;
use tokio::sync::RwLock;

use crate::error::{AuthError, AuthResult};
use crate::validator::{TokenInfo, TokenValidator};

/// Standard-Lebensdauer: 24 Stunden
pub const STANDARD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const CLEANUP_INTERVALL: Duration = Duration::from_secs(15 * 60);

/// Ein frisch ausgestelltes Token
#[derive(Debug, Clone)]
pub struct AusgestelltesToken {
    pub token: String,
    pub info: TokenInfo,
}

/// In-Memory Token-Store mit TTL
#[derive(Debug)]
pub struct TokenStore {
    /// token -> Info
    tokens: RwLock<HashMap<String, TokenInfo>>,
    ttl: chrono::Duration,
}

impl TokenStore {
    /// Erstellt einen leeren Store mit der angegebenen Token-Lebensdauer
    pub fn neu(ttl: Duration) -> Arc<Self> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        Arc::new(Self {
            tokens: RwLock::new(HashMap::new()),
            ttl,
        })
    }

    /// Startet den periodischen Cleanup-Task fuer abgelaufene Tokens
    pub fn mit_cleanup(store: Arc<Self>) -> Arc<Self> {
        let store_klon = Arc::clone(&store);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CLEANUP_INTERVALL).await;
                let entfernt = store_klon.cleanup_abgelaufene().await;
                if entfernt > 0 {
                    tracing::debug!(anzahl = entfernt, "Abgelaufene Tokens bereinigt");
                }
            }
        });
        store
    }

    /// Stellt ein neues Token fuer den Benutzer aus
    pub async fn ausstellen(&self, user_id: UserId) -> AusgestelltesToken {
        self.ausstellen_mit_ablauf(user_id, Utc::now() + self.ttl).await
    }

    /// Stellt ein Token mit explizitem Ablaufzeitpunkt aus
    pub async fn ausstellen_mit_ablauf(
        &self,
        user_id: UserId,
        laeuft_ab_am: DateTime<Utc>,
    ) -> AusgestelltesToken {
        let token = token_generieren();
        let info = TokenInfo {
            user_id,
            laeuft_ab_am,
        };
        self.tokens.write().await.insert(token.clone(), info.clone());
        tracing::debug!(user_id = %user_id, "Token ausgestellt");
        AusgestelltesToken { token, info }
    }

    /// Widerruft ein Token
    pub async fn widerrufen(&self, token: &str) -> bool {
        self.tokens.write().await.remove(token).is_some()
    }

    /// Entfernt abgelaufene Tokens und gibt deren Anzahl zurueck
    pub async fn cleanup_abgelaufene(&self) -> usize {
        let jetzt = Utc::now();
        let mut tokens = self.tokens.write().await;
        let vorher = tokens.len();
        tokens.retain(|_, info| info.ist_gueltig_um(jetzt));
        vorher - tokens.len()
    }

    /// Anzahl der noch gueltigen Tokens
    pub async fn anzahl_aktive(&self) -> usize {
        let jetzt = Utc::now();
        self.tokens
            .read()
            .await
            .values()
            .filter(|info| info.ist_gueltig_um(jetzt))
            .count()
    }
}

#[async_trait]
impl TokenValidator for TokenStore {
    async fn validieren(&self, token: &str) -> AuthResult<TokenInfo> {
        if token.is_empty() {
            return Err(AuthError::TokenFehlt);
        }
        let tokens = self.tokens.read().await;
        match tokens.get(token) {
            None => Err(AuthError::TokenUngueltig),
            Some(info) if !info.ist_gueltig_um(Utc::now()) => Err(AuthError::TokenAbgelaufen),
            Some(info) => Ok(info.clone()),
        }
    }
}

/// Generiert ein kryptografisch sicheres Token (URL-sicheres Base64)
fn token_generieren() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}
