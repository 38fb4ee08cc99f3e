//! sprechfunk-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen die zwischen Client und
//! Server ausgetauscht werden, das TCP-Frame-Format und den Umschlag fuer
//! Ereignisse die zwischen Server-Instanzen ueber den Broker laufen.

pub mod control;
pub mod relay;
pub mod wire;

pub use control::{ControlMessage, ControlPayload, ErrorCode};
pub use relay::{RelayArt, RelayUmschlag};
pub use wire::FrameCodec;
