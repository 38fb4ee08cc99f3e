//! sprechfunk-signaling – Sitzungen, Kanaele, Push-to-Talk und Relay
//!
//! Dieser Crate implementiert den Kern des Sprechfunk-Servers: er verwaltet
//! TCP-Verbindungen, authentifiziert sie, fuehrt die Kanal-Anwesenheit,
//! verteilt Sprech-Ereignisse und Audio-Frames an alle Anwesenden eines
//! Kanals und spiegelt sie ueber einen Broker an andere Server-Instanzen.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task + Lese-Task)
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     v
//! LifecycleController
//!     +-- SessionRegistry  – eine Sitzung pro Verbindung
//!     +-- PresenceTable    – wer ist in welchem Kanal (Sperre pro Kanal)
//!     +-- RoomRouter       – Multicast an die Anwesenden eines Kanals
//!     +-- RelayBridge      – Broker-Publish/Subscribe zwischen Instanzen
//! ```

pub mod aktivitaet;
pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod presence;
pub mod relay;
pub mod server_state;
pub mod session;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::RoomRouter;
pub use connection::ClientConnection;
pub use dispatcher::MessageDispatcher;
pub use error::{SignalingError, SignalingResult};
pub use lifecycle::{system_uhr, Dienste, LifecycleController, Uhr};
pub use presence::{Anwesenheit, KanalZugang, PresenceTable};
pub use relay::{RelayBridge, RelayEinstellungen};
pub use server_state::{SignalingConfig, SignalingState};
pub use session::{SessionRegistry, Sitzung};
pub use tcp::SignalingServer;
