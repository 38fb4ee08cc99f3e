//! Integration-Tests fuer das ActivityLog (In-Memory SQLite)

use sprechfunk_core::types::{ChannelId, UserId};
use sprechfunk_db::{ActivityLog, Aktion, SqliteDb};

async fn db() -> SqliteDb {
    SqliteDb::in_memory()
        .await
        .expect("In-Memory DB konnte nicht erstellt werden")
}

#[tokio::test]
async fn sprechdauer_wird_gespeichert() {
    let db = db().await;
    let user = UserId::new();
    let kanal = ChannelId::new();

    db.aufzeichnen(user, kanal, Aktion::SpeakEnd, Some(2.0))
        .await
        .unwrap();

    let eintraege = db.aktivitaeten(kanal, 10).await.unwrap();
    assert_eq!(eintraege.len(), 1);
    assert_eq!(eintraege[0].user_id, user);
    assert_eq!(eintraege[0].aktion, Aktion::SpeakEnd);
    assert_eq!(eintraege[0].dauer_sek, Some(2.0));
}

#[tokio::test]
async fn aktivitaeten_nach_kanal_gefiltert() {
    let db = db().await;
    let user = UserId::new();
    let lobby = ChannelId::new();
    let andere = ChannelId::new();

    db.aufzeichnen(user, lobby, Aktion::Join, None).await.unwrap();
    db.aufzeichnen(user, lobby, Aktion::Leave, None).await.unwrap();
    db.aufzeichnen(user, andere, Aktion::Join, None).await.unwrap();

    let eintraege = db.aktivitaeten(lobby, 10).await.unwrap();
    assert_eq!(eintraege.len(), 2);
    assert!(eintraege.iter().all(|e| e.channel_id == lobby));
    assert!(eintraege.iter().all(|e| e.dauer_sek.is_none()));
}

#[tokio::test]
async fn limit_wird_beachtet() {
    let db = db().await;
    let user = UserId::new();
    let kanal = ChannelId::new();

    for _ in 0..5 {
        db.aufzeichnen(user, kanal, Aktion::SpeakStart, None)
            .await
            .unwrap();
    }

    assert_eq!(db.aktivitaeten(kanal, 3).await.unwrap().len(), 3);
}
