//! sprechfunk-db – Kanal-Register und Aktivitaetsprotokoll
//!
//! Der Signaling-Kern liest Kanaldaten und Mitgliedschaften nur, und
//! schreibt Aktivitaeten fire-and-forget. Beide Ports sind Traits:
//! - [`ChannelRegistry`]: Kanal-Metadaten und Mitgliedschaften
//! - [`ActivityLog`]: join/leave/speak_start/speak_end-Protokoll
//!
//! Implementierungen: [`SqliteDb`] (persistent) sowie [`SpeicherRegister`]
//! und [`SpeicherAktivitaetsLog`] (In-Memory, Tests und Einzelbetrieb).

pub mod error;
pub mod memory;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use error::DbError;
pub use memory::{SpeicherAktivitaetsLog, SpeicherRegister};
pub use models::{Aktion, AktivitaetsEintrag, KanalRecord, NeuerKanal};
pub use repository::{ActivityLog, ChannelRegistry, DatabaseConfig, DbResult};
pub use sqlite::SqliteDb;
