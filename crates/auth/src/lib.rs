//! sprechfunk-auth – Token-Validierung
//!
//! Der Signaling-Kern authentifiziert jede Verbindung genau einmal beim
//! Verbindungsaufbau ueber einen [`TokenValidator`]. Dieses Crate liefert:
//! - den Port [`TokenValidator`] mit [`TokenInfo`]
//! - [`TokenStore`]: In-Memory-Aussteller mit TTL (Entwicklung, Tests)
//! - [`JwtValidator`]: HS256-JWTs des externen Token-Ausstellers

pub mod error;
pub mod jwt;
pub mod token_store;
pub mod validator;

// Bequeme Re-Exporte
pub use error::{AuthError, AuthResult};
pub use jwt::JwtValidator;
pub use token_store::{AusgestelltesToken, TokenStore};
pub use validator::{TokenInfo, TokenValidator};
