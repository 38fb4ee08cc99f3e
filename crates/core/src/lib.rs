//! sprechfunk-core – Gemeinsame Typen, Ports und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Sprechfunk-Crates gemeinsam genutzt werden: ID-Newtypes, den
//! globalen Fehler-Enum und den Port zum Publish/Subscribe-Broker.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, SprechfunkError};
pub use event::{muster_passt, Broker, BrokerFehler, BrokerNachricht, BrokerStream};
pub use types::{ChannelId, ConnectionId, ServerId, UserId};
