//! Broker-Port fuer den Multi-Instance-Betrieb
//!
//! Definiert die Schnittstelle zum externen Publish/Subscribe-Broker.
//! Die Implementierungen (In-Process, Redis) liegen im Crate
//! `sprechfunk-broker`. Fehlt ein Broker, laeuft der Server rein lokal.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Eine ueber den Broker empfangene Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerNachricht {
    /// Topic auf dem die Nachricht veroeffentlicht wurde
    pub topic: String,
    /// Rohe Nutzdaten (JSON)
    pub payload: Vec<u8>,
}

/// Fehler an der Broker-Grenze
///
/// Diese Fehler verlassen niemals die Relay-Bruecke – sie werden dort
/// geloggt und fuehren nur zum Verlust der Cluster-Sichtbarkeit.
#[derive(Debug, Error)]
pub enum BrokerFehler {
    /// Broker nicht erreichbar oder Verbindung verloren
    #[error("Broker nicht verfuegbar: {0}")]
    NichtVerfuegbar(String),

    /// Veroeffentlichung hat das Zeitlimit ueberschritten
    #[error("Broker-Zeitlimit ueberschritten")]
    Zeitlimit,
}

/// Strom empfangener Broker-Nachrichten eines Abonnements
pub type BrokerStream = BoxStream<'static, BrokerNachricht>;

/// Trait fuer den Publish/Subscribe-Broker
///
/// Topics sind pro Kanal geschluesselt. Muster folgen der Glob-Syntax von
/// Redis `PSUBSCRIBE` (`*` und `?`).
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Veroeffentlicht eine Nachricht auf einem Topic
    async fn veroeffentlichen(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerFehler>;

    /// Abonniert alle Topics die auf das Muster passen
    ///
    /// Der Strom endet wenn die Broker-Verbindung verloren geht.
    async fn abonnieren(&self, muster: &str) -> Result<BrokerStream, BrokerFehler>;

    /// Kurzname fuer Logs und Health-Ausgabe
    fn name(&self) -> &'static str;
}

/// Prueft ob ein Topic auf ein Glob-Muster passt
///
/// Unterstuetzt `*` (beliebig viele Zeichen) und `?` (genau ein Zeichen).
pub fn muster_passt(muster: &str, topic: &str) -> bool {
    let m: Vec<char> = muster.chars().collect();
    let t: Vec<char> = topic.chars().collect();
    let (mut mi, mut ti) = (0usize, 0usize);
    let mut stern: Option<usize> = None;
    let mut rueckfall = 0usize;

    while ti < t.len() {
        if mi < m.len() && (m[mi] == '?' || m[mi] == t[ti]) {
            mi += 1;
            ti += 1;
        } else if mi < m.len() && m[mi] == '*' {
            stern = Some(mi);
            rueckfall = ti;
            mi += 1;
        } else if let Some(s) = stern {
            mi = s + 1;
            rueckfall += 1;
            ti = rueckfall;
        } else {
            return false;
        }
    }

    while mi < m.len() && m[mi] == '*' {
        mi += 1;
    }
    mi == m.len()
}
