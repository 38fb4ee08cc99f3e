//! Integration-Tests fuer den Verbund mehrerer Instanzen ueber einen Broker

mod common;

use common::{abwarten, Geteilt, Instanz};
use async_trait::async_trait;
use sprechfunk_broker::SpeicherBroker;
use sprechfunk_core::event::{Broker, BrokerFehler, BrokerStream};
use sprechfunk_core::types::UserId;
use sprechfunk_protocol::control::{AudioDataMessage, ControlPayload};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Wartet bis der Broker die erwartete Anzahl Abonnements hat
async fn abonnements_abwarten(broker: &SpeicherBroker, anzahl: usize) {
    for _ in 0..200 {
        if broker.anzahl_abonnenten() >= anzahl {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Abonnements nicht rechtzeitig aktiv");
}

struct Verbund {
    geteilt: Geteilt,
    broker: SpeicherBroker,
    eins: Instanz,
    zwei: Instanz,
    _shutdown_tx: watch::Sender<bool>,
}

async fn verbund() -> Verbund {
    let geteilt = Geteilt::neu();
    let broker = SpeicherBroker::neu();
    let als_port: Arc<dyn Broker> = Arc::new(broker.clone());

    let eins = Instanz::neu(&geteilt, Some(Arc::clone(&als_port))).await;
    let zwei = Instanz::neu(&geteilt, Some(als_port)).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    eins.state
        .lifecycle
        .relay()
        .abonnieren_starten(shutdown_rx.clone())
        .unwrap();
    zwei.state
        .lifecycle
        .relay()
        .abonnieren_starten(shutdown_rx)
        .unwrap();
    abonnements_abwarten(&broker, 2).await;

    Verbund {
        geteilt,
        broker,
        eins,
        zwei,
        _shutdown_tx: shutdown_tx,
    }
}

#[tokio::test]
async fn sprechstart_erreicht_andere_instanz_ohne_echo() {
    let v = verbund().await;
    let (a, b) = (UserId::new(), UserId::new());
    let kanal = v.geteilt.kanal("verbund", 10, &[a, b]).await;

    let mut client_a = v.eins.verbinden(a).await;
    let mut client_b = v.zwei.verbinden(b).await;
    v.zwei
        .state
        .lifecycle
        .kanal_beitreten(client_b.conn, kanal)
        .await
        .unwrap();
    v.eins
        .state
        .lifecycle
        .kanal_beitreten(client_a.conn, kanal)
        .await
        .unwrap();

    // B sieht den Beitritt von A ueber den Broker
    match client_b.empfangen().await {
        ControlPayload::UserJoined(e) => assert_eq!(e.user_id, a),
        andere => panic!("user_joined erwartet, erhalten: {andere:?}"),
    }
    // Der Beitritt von B kann A noch ueber den Broker erreichen
    tokio::time::sleep(Duration::from_millis(50)).await;
    client_a.leeren();

    v.eins
        .state
        .lifecycle
        .sprechen_starten(client_a.conn)
        .await
        .unwrap();

    match client_b.empfangen().await {
        ControlPayload::UserSpeaking(e) => {
            assert_eq!(e.user_id, a);
            assert!(e.is_speaking);
        }
        andere => panic!("user_speaking erwartet, erhalten: {andere:?}"),
    }

    // A bekommt genau eine lokale Bestaetigung, keine Kopie ueber den Broker
    assert!(matches!(
        client_a.empfangen().await,
        ControlPayload::UserSpeaking(_)
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client_a.nichts_erhalten());

    // Jede Instanz spielt nur die Ereignisse der jeweils anderen ab
    assert_eq!(v.zwei.metriken.relay_replayed_total.get(), 2);
    assert_eq!(v.eins.metriken.relay_replayed_total.get(), 1);
}

#[tokio::test]
async fn audio_erreicht_andere_instanz() {
    let v = verbund().await;
    let (a, b) = (UserId::new(), UserId::new());
    let kanal = v.geteilt.kanal("verbund", 10, &[a, b]).await;

    let client_a = v.eins.verbinden(a).await;
    let mut client_b = v.zwei.verbinden(b).await;
    v.zwei
        .state
        .lifecycle
        .kanal_beitreten(client_b.conn, kanal)
        .await
        .unwrap();
    let lc = &v.eins.state.lifecycle;
    lc.kanal_beitreten(client_a.conn, kanal).await.unwrap();
    lc.sprechen_starten(client_a.conn).await.unwrap();
    lc.audio_weiterleiten(client_a.conn, AudioDataMessage::vom_client("T3B1cw=="))
        .await;

    let mut audio = None;
    for _ in 0..3 {
        if let ControlPayload::AudioData(frame) = client_b.empfangen().await {
            audio = Some(frame);
            break;
        }
    }
    let frame = audio.expect("audio_data erwartet");
    assert_eq!(frame.payload, "T3B1cw==");
    assert_eq!(frame.user_id, Some(a));
}

#[tokio::test]
async fn broker_ausfall_betrifft_nur_den_verbund() {
    let v = verbund().await;
    let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
    let kanal = v.geteilt.kanal("verbund", 10, &[a, b, c]).await;

    let client_a = v.eins.verbinden(a).await;
    let mut client_lokal = v.eins.verbinden(c).await;
    let mut client_fern = v.zwei.verbinden(b).await;
    let lc = &v.eins.state.lifecycle;
    v.zwei
        .state
        .lifecycle
        .kanal_beitreten(client_fern.conn, kanal)
        .await
        .unwrap();
    lc.kanal_beitreten(client_lokal.conn, kanal).await.unwrap();
    lc.kanal_beitreten(client_a.conn, kanal).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client_lokal.leeren();
    client_fern.leeren();

    v.broker.verfuegbarkeit_setzen(false);

    // Lokaler Betrieb laeuft weiter, ohne Fehler an den Aufrufer
    assert!(lc.sprechen_starten(client_a.conn).await.unwrap());
    assert!(matches!(
        client_lokal.empfangen().await,
        ControlPayload::UserSpeaking(_)
    ));
    abwarten(|| v.eins.metriken.relay_failures_total.get() >= 1).await;
    assert!(!lc.relay().broker_verbunden().load(Ordering::Relaxed));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client_fern.nichts_erhalten());

    // Nach dem Ausfall wird wieder veroeffentlicht
    v.broker.verfuegbarkeit_setzen(true);
    lc.sprechen_beenden(client_a.conn).await.unwrap();
    abwarten(|| lc.relay().broker_verbunden().load(Ordering::Relaxed)).await;
    match client_fern.empfangen().await {
        ControlPayload::UserSpeaking(e) => assert!(!e.is_speaking),
        andere => panic!("user_speaking erwartet, erhalten: {andere:?}"),
    }
}

/// Broker der Verbindungen annimmt aber nie antwortet
struct Funkloch;

#[async_trait]
impl Broker for Funkloch {
    async fn veroeffentlichen(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), BrokerFehler> {
        std::future::pending().await
    }

    async fn abonnieren(&self, _muster: &str) -> Result<BrokerStream, BrokerFehler> {
        std::future::pending().await
    }

    fn name(&self) -> &'static str {
        "funkloch"
    }
}

#[tokio::test]
async fn stummer_broker_bremst_lokales_audio_nicht() {
    let geteilt = Geteilt::neu();
    let instanz = Instanz::neu(&geteilt, Some(Arc::new(Funkloch))).await;
    let (a, b) = (UserId::new(), UserId::new());
    let kanal = geteilt.kanal("funkloch", 10, &[a, b]).await;

    let sprecher = instanz.verbinden(a).await;
    let mut hoerer = instanz.verbinden(b).await;
    let lc = &instanz.state.lifecycle;
    lc.kanal_beitreten(hoerer.conn, kanal).await.unwrap();
    lc.kanal_beitreten(sprecher.conn, kanal).await.unwrap();
    lc.sprechen_starten(sprecher.conn).await.unwrap();
    hoerer.leeren();

    let start = Instant::now();
    for _ in 0..10 {
        assert!(
            lc.audio_weiterleiten(sprecher.conn, AudioDataMessage::vom_client("AAAA"))
                .await
        );
    }
    let dauer = start.elapsed();
    let publish_timeout = Duration::from_millis(instanz.state.config.publish_timeout_ms);
    assert!(
        dauer < publish_timeout,
        "zehn Frames brauchten {dauer:?} (Zeitlimit {publish_timeout:?})"
    );

    for _ in 0..10 {
        assert!(matches!(hoerer.empfangen().await, ControlPayload::AudioData(_)));
    }
    assert!(hoerer.nichts_erhalten());
}
