//! sprechfunk-broker – Adapter fuer den Publish/Subscribe-Broker
//!
//! - [`SpeicherBroker`]: In-Process ueber `tokio::sync::broadcast`; mehrere
//!   Server-Instanzen im selben Prozess (Tests) teilen sich einen Broker
//! - [`RedisBroker`]: Redis `PUBLISH` / `PSUBSCRIBE`

pub mod redis_broker;
pub mod speicher;

pub use redis_broker::RedisBroker;
pub use speicher::SpeicherBroker;
