//! Redis-Broker (`PUBLISH` / `PSUBSCRIBE`)
//!
//! Veroeffentlicht ueber eine geteilte `MultiplexedConnection`; jedes
//! Abonnement oeffnet eine eigene Pub/Sub-Verbindung.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use sprechfunk_core::event::{Broker, BrokerFehler, BrokerNachricht, BrokerStream};

pub struct RedisBroker {
    client: Client,
    verbindung: MultiplexedConnection,
}

impl RedisBroker {
    /// Verbindet mit Redis und prueft die Verbindung per `PING`
    pub async fn verbinden(url: &str) -> Result<Self, BrokerFehler> {
        let client = Client::open(url).map_err(nicht_verfuegbar)?;
        let mut verbindung = client
            .get_multiplexed_async_connection()
            .await
            .map_err(nicht_verfuegbar)?;

        let antwort: String = redis::cmd("PING")
            .query_async(&mut verbindung)
            .await
            .map_err(nicht_verfuegbar)?;
        tracing::info!(antwort = %antwort, "Redis-Broker verbunden");

        Ok(Self { client, verbindung })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn veroeffentlichen(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerFehler> {
        let mut verbindung = self.verbindung.clone();
        let _empfaenger: i64 = verbindung
            .publish(topic, payload)
            .await
            .map_err(nicht_verfuegbar)?;
        Ok(())
    }

    async fn abonnieren(&self, muster: &str) -> Result<BrokerStream, BrokerFehler> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(nicht_verfuegbar)?;
        pubsub.psubscribe(muster).await.map_err(nicht_verfuegbar)?;
        tracing::debug!(muster, "Redis-Abonnement aktiv");

        let strom = pubsub.into_on_message().map(|msg| BrokerNachricht {
            topic: msg.get_channel_name().to_string(),
            payload: msg.get_payload_bytes().to_vec(),
        });
        Ok(strom.boxed())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

fn nicht_verfuegbar(e: redis::RedisError) -> BrokerFehler {
    BrokerFehler::NichtVerfuegbar(e.to_string())
}
