//! Umschlag fuer Kanal-Ereignisse zwischen Server-Instanzen
//!
//! Jede Instanz veroeffentlicht lokal ausgeloeste Kanal-Ereignisse auf
//! einem pro Kanal geschluesselten Broker-Topic:
//!
//! ```text
//! <praefix>:kanal:<channel-uuid>:<art>
//! ```
//!
//! `origin` traegt die ServerId der ausloesenden Instanz, damit Empfaenger
//! ihre eigenen Nachrichten verwerfen koennen.

use serde::{Deserialize, Serialize};
use sprechfunk_core::types::{ChannelId, ServerId};

use crate::control::ControlPayload;

/// Art eines Kanal-Ereignisses auf dem Broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayArt {
    Join,
    Leave,
    Speaking,
    Audio,
}

impl RelayArt {
    /// Topic-Suffix fuer diese Ereignis-Art
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Speaking => "speaking",
            Self::Audio => "audio",
        }
    }
}

/// Ein ueber den Broker verteiltes Kanal-Ereignis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayUmschlag {
    pub channel_id: ChannelId,
    pub art: RelayArt,
    pub origin: ServerId,
    /// Das Ereignis so wie es lokale Clients empfangen
    pub event: ControlPayload,
}

impl RelayUmschlag {
    /// Serialisiert den Umschlag als JSON-Bytes
    pub fn zu_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialisiert einen Umschlag aus JSON-Bytes
    pub fn aus_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Topic auf dem dieser Umschlag veroeffentlicht wird
    pub fn topic(&self, praefix: &str) -> String {
        kanal_topic(praefix, &self.channel_id, self.art)
    }
}

/// Baut das Broker-Topic fuer einen Kanal und eine Ereignis-Art
pub fn kanal_topic(praefix: &str, channel_id: &ChannelId, art: RelayArt) -> String {
    format!("{praefix}:kanal:{}:{}", channel_id.inner(), art.als_str())
}

/// Abonnement-Muster fuer alle Kanal-Topics eines Praefix
pub fn abo_muster(praefix: &str) -> String {
    format!("{praefix}:kanal:*")
}
