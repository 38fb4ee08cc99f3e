//! Start des vollstaendig verdrahteten Servers aus einer Konfiguration

use futures_util::{SinkExt, StreamExt};
use sprechfunk_core::types::{ChannelId, ConnectionId, UserId};
use sprechfunk_protocol::control::{
    ConnectRequest, ControlMessage, ControlPayload, ErrorCode, JoinChannelRequest,
};
use sprechfunk_protocol::wire::FrameCodec;
use sprechfunk_server::config::{DatenbankBackend, KanalVorgabe, ServerConfig};
use sprechfunk_server::Server;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

fn test_config(kanal: ChannelId, user: UserId) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.netzwerk.bind_adresse = "127.0.0.1".into();
    config.netzwerk.tcp_port = 0;
    config.observability.aktiviert = false;
    config.auth.entwicklungs_benutzer = vec![user];
    config.datenbank.kanaele = vec![KanalVorgabe {
        id: Some(kanal),
        name: "Lobby".into(),
        beschreibung: Some("Treffpunkt".into()),
        max_users: 2,
        mitglieder: vec![user],
    }];
    config
}

async fn lesen(client: &mut Framed<TcpStream, FrameCodec>) -> Option<ControlMessage> {
    tokio::time::timeout(Duration::from_secs(2), client.next())
        .await
        .expect("kein Frame innerhalb von zwei Sekunden")
        .map(|frame| frame.unwrap())
}

#[tokio::test]
async fn client_meldet_sich_an_und_tritt_bei() {
    let (kanal, user) = (ChannelId::new(), UserId::new());
    let laufend = Server::neu(test_config(kanal, user))
        .hochfahren()
        .await
        .unwrap();
    let (token_user, token) = laufend.entwicklungs_tokens()[0].clone();
    assert_eq!(token_user, user);

    let stream = TcpStream::connect(laufend.signaling_adresse()).await.unwrap();
    let mut client = Framed::new(stream, FrameCodec::new());

    client
        .send(ControlMessage::new(
            1,
            ControlPayload::Connect(ConnectRequest {
                token,
                client_version: None,
            }),
        ))
        .await
        .unwrap();
    match lesen(&mut client).await.unwrap().payload {
        ControlPayload::Connected(c) => {
            assert_eq!(c.user_id, user);
            assert_eq!(c.server_id, laufend.state().config.server_id);
        }
        andere => panic!("connected erwartet, erhalten: {andere:?}"),
    }

    client
        .send(ControlMessage::new(
            2,
            ControlPayload::JoinChannel(JoinChannelRequest { channel_id: kanal }),
        ))
        .await
        .unwrap();
    match lesen(&mut client).await.unwrap().payload {
        ControlPayload::ChannelState(s) => {
            assert_eq!(s.channel.name, "Lobby");
            assert_eq!(s.channel.max_users, 2);
            assert_eq!(s.members.len(), 1);
        }
        andere => panic!("channel_state erwartet, erhalten: {andere:?}"),
    }

    laufend.herunterfahren().await;
    match lesen(&mut client).await.map(|m| m.payload) {
        Some(ControlPayload::Error(e)) => assert_eq!(e.code, ErrorCode::InternalError),
        andere => panic!("Abschiedsnachricht erwartet, erhalten: {andere:?}"),
    }
}

#[tokio::test]
async fn sqlite_vorbelegung_ist_wiederholbar() {
    let (kanal, user) = (ChannelId::new(), UserId::new());
    let pfad = std::env::temp_dir().join(format!("sprechfunk-test-{}.db", kanal.inner()));
    let mut config = test_config(kanal, user);
    config.datenbank.backend = DatenbankBackend::Sqlite;
    config.datenbank.url = format!("sqlite://{}", pfad.display());

    // Zweiter Start findet den Kanal vor und legt ihn nicht erneut an
    for _ in 0..2 {
        let laufend = Server::neu(config.clone()).hochfahren().await.unwrap();
        let sitzung_token = laufend.entwicklungs_tokens()[0].1.clone();
        let lifecycle = &laufend.state().lifecycle;
        let conn = ConnectionId::new();
        lifecycle.verbinden(conn, &sitzung_token).await.unwrap();
        let zustand = lifecycle.kanal_beitreten(conn, kanal).await.unwrap();
        assert_eq!(zustand.channel.channel_id, kanal);
        lifecycle.trennen(conn).await;
        laufend.herunterfahren().await;
    }

    for endung in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{endung}", pfad.display()));
    }
}

#[tokio::test]
async fn ungueltige_konfiguration_startet_nicht() {
    let mut config = ServerConfig::default();
    config.netzwerk.bind_adresse = "kein host".into();
    config.observability.aktiviert = false;
    assert!(Server::neu(config).hochfahren().await.is_err());
}
