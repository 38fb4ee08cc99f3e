//! HS256-JWT-Validierung
//!
//! Prueft Zugangstokens die vom externen Aussteller (REST-Backend) signiert
//! wurden. `sub` ist die Benutzer-ID: entweder eine UUID oder die numerische
//! ID des Ausstellers (als Zahl oder Zahl-String), die ueber
//! [`UserId::aus_numerischer_id`] abgebildet wird. `exp` ist ein
//! Unix-Zeitstempel. Weitere Claims des Ausstellers werden ignoriert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Deserializer, Serialize};
use sprechfunk_core::types::UserId;

use crate::error::{AuthError, AuthResult};
use crate::validator::{TokenInfo, TokenValidator};

/// Von uns ausgewertete JWT-Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Benutzer-ID als UUID- oder Zahl-String
    #[serde(deserialize_with = "sub_als_text")]
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Akzeptiert `sub` als String oder als JSON-Zahl
fn sub_als_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Subjekt {
        Zahl(u64),
        Text(String),
    }

    Ok(match Subjekt::deserialize(deserializer)? {
        Subjekt::Zahl(n) => n.to_string(),
        Subjekt::Text(s) => s,
    })
}

/// Validator fuer HS256-signierte JWTs mit gemeinsamem Geheimnis
pub struct JwtValidator {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn neu(geheimnis: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        Self {
            decoding_key: DecodingKey::from_secret(geheimnis),
            encoding_key: EncodingKey::from_secret(geheimnis),
            validation,
        }
    }

    /// Signiert ein Token im Format des Ausstellers
    ///
    /// Fuer lokale Werkzeuge und Tests; der produktive Aussteller ist extern.
    pub fn signieren(&self, user_id: UserId, laeuft_ab_am: DateTime<Utc>) -> AuthResult<String> {
        let claims = Claims {
            sub: user_id.inner().to_string(),
            exp: laeuft_ab_am.timestamp(),
            iat: Some(Utc::now().timestamp()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::intern(format!("JWT-Signatur fehlgeschlagen: {e}")))
    }
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validieren(&self, token: &str) -> AuthResult<TokenInfo> {
        if token.is_empty() {
            return Err(AuthError::TokenFehlt);
        }

        let daten = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenAbgelaufen,
                _ => {
                    tracing::debug!(fehler = %e, "JWT abgelehnt");
                    AuthError::TokenUngueltig
                }
            }
        })?;

        let user_id = UserId::aus_text(&daten.claims.sub).ok_or(AuthError::TokenUngueltig)?;
        let laeuft_ab_am =
            DateTime::<Utc>::from_timestamp(daten.claims.exp, 0).ok_or(AuthError::TokenUngueltig)?;

        Ok(TokenInfo {
            user_id,
            laeuft_ab_am,
        })
    }
}
