//! Presence-Tabelle – Wer ist gerade in welchem Kanal anwesend
//!
//! Pro Kanal eine eigene Sperre (`parking_lot::Mutex`), damit Beitritte und
//! Austritte in verschiedenen Kanaelen parallel laufen. Ein Rueckwaerts-Index
//! Verbindung -> Kanal wird unter derselben Kanal-Sperre gepflegt; daher ist
//! eine Verbindung hoechstens in einem Kanal anwesend.
//!
//! Sperr-Reihenfolge: erst Kanal-Mutex, dann Index-Shard. Nie umgekehrt.
//! Zwei Kanal-Sperren haelt nur [`PresenceTable::wechseln`], und zwar in
//! aufsteigender Kanal-ID.
//!
//! Kanal-Eintraege werden nicht entfernt wenn sie leer werden; ein Task der
//! den `Arc` bereits geklont hat koennte sonst in einen verwaisten Eintrag
//! schreiben. Die Zahl der belegten Kanaele fuehrt ein eigener Zaehler.

use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use sprechfunk_core::types::{ChannelId, ConnectionId, UserId};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::error::{SignalingError, SignalingResult};

// ---------------------------------------------------------------------------
// Typen
// ---------------------------------------------------------------------------

/// Zugangsdaten eines Kanals, vorab aus dem Kanal-Register gelesen
#[derive(Debug, Clone, Copy)]
pub struct KanalZugang {
    pub ist_mitglied: bool,
    pub kapazitaet: u32,
}

/// Eine Anwesenheit in einem Kanal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anwesenheit {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub spricht: bool,
}

/// Anwesende eines Kanals in Beitrittsreihenfolge
#[derive(Debug, Default)]
struct Belegung {
    anwesende: Vec<Anwesenheit>,
}

impl Belegung {
    fn position(&self, connection_id: &ConnectionId) -> Option<usize> {
        self.anwesende
            .iter()
            .position(|a| &a.connection_id == connection_id)
    }
}

// ---------------------------------------------------------------------------
// PresenceTable
// ---------------------------------------------------------------------------

/// Ephemere Kanal-Anwesenheit aller lokalen Verbindungen
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone, Default)]
pub struct PresenceTable {
    inner: Arc<PresenceInner>,
}

#[derive(Default)]
struct PresenceInner {
    kanaele: DashMap<ChannelId, Arc<Mutex<Belegung>>>,
    /// Rueckwaerts-Index Verbindung -> Kanal
    verbindung_kanal: DashMap<ConnectionId, ChannelId>,
    /// Kanaele mit mindestens einer Anwesenheit
    belegte_kanaele: AtomicUsize,
}

impl PresenceTable {
    pub fn neu() -> Self {
        Self::default()
    }

    fn belegung(&self, channel_id: ChannelId) -> Arc<Mutex<Belegung>> {
        // Arc klonen und den Shard sofort wieder freigeben
        Arc::clone(self.inner.kanaele.entry(channel_id).or_default().value())
    }

    /// Fuegt eine Verbindung dem Kanal hinzu und gibt die neue Anzahl zurueck
    ///
    /// Idempotent wenn die Verbindung bereits anwesend ist. Schlaegt fehl mit
    /// `KeinMitglied` ohne Mitgliedschaft, mit `KanalVoll` bei erreichter
    /// Kapazitaet und mit `UngueltigerZustand` wenn die Verbindung noch in
    /// einem anderen Kanal steht.
    pub fn beitreten(
        &self,
        channel_id: ChannelId,
        connection_id: ConnectionId,
        user_id: UserId,
        zugang: &KanalZugang,
    ) -> SignalingResult<usize> {
        if !zugang.ist_mitglied {
            return Err(SignalingError::KeinMitglied);
        }

        let belegung = self.belegung(channel_id);
        let mut belegung = belegung.lock();

        if belegung.position(&connection_id).is_some() {
            return Ok(belegung.anwesende.len());
        }
        if belegung.anwesende.len() >= zugang.kapazitaet as usize {
            return Err(SignalingError::KanalVoll);
        }

        match self.inner.verbindung_kanal.entry(connection_id) {
            Entry::Occupied(besetzt) => {
                return Err(SignalingError::UngueltigerZustand(format!(
                    "Verbindung ist noch in Kanal {}",
                    besetzt.get()
                )));
            }
            Entry::Vacant(frei) => {
                frei.insert(channel_id);
            }
        }

        belegung.anwesende.push(Anwesenheit {
            connection_id,
            user_id,
            spricht: false,
        });
        let anzahl = belegung.anwesende.len();
        if anzahl == 1 {
            self.inner.belegte_kanaele.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            kanal_id = %channel_id,
            connection_id = %connection_id,
            anzahl,
            "Anwesenheit eingetragen"
        );
        Ok(anzahl)
    }

    /// Entfernt eine Verbindung aus dem Kanal
    ///
    /// Kein Fehler wenn sie nicht anwesend war; gibt zurueck ob sie es war.
    pub fn verlassen(&self, channel_id: ChannelId, connection_id: &ConnectionId) -> bool {
        let Some(belegung) = self
            .inner
            .kanaele
            .get(&channel_id)
            .map(|b| Arc::clone(b.value()))
        else {
            return false;
        };
        let mut belegung = belegung.lock();

        let Some(pos) = belegung.position(connection_id) else {
            return false;
        };
        belegung.anwesende.remove(pos);
        if belegung.anwesende.is_empty() {
            self.inner.belegte_kanaele.fetch_sub(1, Ordering::Relaxed);
        }
        self.inner
            .verbindung_kanal
            .remove_if(connection_id, |_, kanal| *kanal == channel_id);

        tracing::debug!(
            kanal_id = %channel_id,
            connection_id = %connection_id,
            "Anwesenheit entfernt"
        );
        true
    }

    /// Verschiebt eine Verbindung von `von` nach `nach`
    ///
    /// Beide Kanaele sind waehrenddessen gesperrt. Ist `nach` voll oder fehlt
    /// die Mitgliedschaft, bleibt die Verbindung unveraendert in `von`. Das
    /// Sprech-Flag beginnt im neuen Kanal mit `false`.
    pub fn wechseln(
        &self,
        von: ChannelId,
        nach: ChannelId,
        connection_id: ConnectionId,
        user_id: UserId,
        zugang: &KanalZugang,
    ) -> SignalingResult<usize> {
        if von == nach {
            return self.beitreten(nach, connection_id, user_id, zugang);
        }
        if !zugang.ist_mitglied {
            return Err(SignalingError::KeinMitglied);
        }

        let (alt_belegung, neu_belegung) = (self.belegung(von), self.belegung(nach));
        let (mut alt, mut neu) = if von.inner() < nach.inner() {
            let alt = alt_belegung.lock();
            (alt, neu_belegung.lock())
        } else {
            let neu = neu_belegung.lock();
            (alt_belegung.lock(), neu)
        };

        if neu.anwesende.len() >= zugang.kapazitaet as usize {
            return Err(SignalingError::KanalVoll);
        }

        if let Some(pos) = alt.position(&connection_id) {
            alt.anwesende.remove(pos);
            if alt.anwesende.is_empty() {
                self.inner.belegte_kanaele.fetch_sub(1, Ordering::Relaxed);
            }
        }
        self.inner.verbindung_kanal.insert(connection_id, nach);
        neu.anwesende.push(Anwesenheit {
            connection_id,
            user_id,
            spricht: false,
        });
        let anzahl = neu.anwesende.len();
        if anzahl == 1 {
            self.inner.belegte_kanaele.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            von = %von,
            nach = %nach,
            connection_id = %connection_id,
            anzahl,
            "Anwesenheit verschoben"
        );
        Ok(anzahl)
    }

    /// Momentaufnahme aller Anwesenden eines Kanals
    pub fn mitglieder(&self, channel_id: &ChannelId) -> Vec<Anwesenheit> {
        self.inner
            .kanaele
            .get(channel_id)
            .map(|b| Arc::clone(b.value()))
            .map(|b| b.lock().anwesende.clone())
            .unwrap_or_default()
    }

    /// Nur die Verbindungs-IDs der Anwesenden
    pub fn verbindungen(&self, channel_id: &ChannelId) -> Vec<ConnectionId> {
        self.mitglieder(channel_id)
            .into_iter()
            .map(|a| a.connection_id)
            .collect()
    }

    /// Setzt das Sprech-Flag einer Anwesenheit
    pub fn sprechen_setzen(
        &self,
        channel_id: ChannelId,
        connection_id: &ConnectionId,
        spricht: bool,
    ) -> SignalingResult<()> {
        let belegung = self
            .inner
            .kanaele
            .get(&channel_id)
            .map(|b| Arc::clone(b.value()))
            .ok_or(SignalingError::NichtAnwesend)?;
        let mut belegung = belegung.lock();

        let eintrag = belegung
            .anwesende
            .iter_mut()
            .find(|a| &a.connection_id == connection_id)
            .ok_or(SignalingError::NichtAnwesend)?;
        eintrag.spricht = spricht;
        Ok(())
    }

    /// Kanal in dem die Verbindung gerade anwesend ist
    pub fn kanal_von(&self, connection_id: &ConnectionId) -> Option<ChannelId> {
        self.inner.verbindung_kanal.get(connection_id).map(|k| *k)
    }

    pub fn anzahl(&self, channel_id: &ChannelId) -> usize {
        self.inner
            .kanaele
            .get(channel_id)
            .map(|b| Arc::clone(b.value()))
            .map(|b| b.lock().anwesende.len())
            .unwrap_or(0)
    }

    /// Anzahl der Kanaele mit mindestens einer Anwesenheit
    pub fn aktive_kanaele(&self) -> usize {
        self.inner.belegte_kanaele.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn zugang(kapazitaet: u32) -> KanalZugang {
        KanalZugang {
            ist_mitglied: true,
            kapazitaet,
        }
    }

    #[test]
    fn beitreten_bis_zur_kapazitaet() {
        let tabelle = PresenceTable::neu();
        let kanal = ChannelId::new();

        assert_eq!(
            tabelle
                .beitreten(kanal, ConnectionId::new(), UserId::new(), &zugang(2))
                .unwrap(),
            1
        );
        assert_eq!(
            tabelle
                .beitreten(kanal, ConnectionId::new(), UserId::new(), &zugang(2))
                .unwrap(),
            2
        );
        assert!(matches!(
            tabelle.beitreten(kanal, ConnectionId::new(), UserId::new(), &zugang(2)),
            Err(SignalingError::KanalVoll)
        ));
        assert_eq!(tabelle.anzahl(&kanal), 2);
    }

    #[test]
    fn beitreten_ist_idempotent() {
        let tabelle = PresenceTable::neu();
        let kanal = ChannelId::new();
        let conn = ConnectionId::new();
        let user = UserId::new();

        tabelle.beitreten(kanal, conn, user, &zugang(1)).unwrap();
        // Auch bei voller Kapazitaet kein Fehler und kein Duplikat
        assert_eq!(tabelle.beitreten(kanal, conn, user, &zugang(1)).unwrap(), 1);
        assert_eq!(tabelle.mitglieder(&kanal).len(), 1);
    }

    #[test]
    fn ohne_mitgliedschaft_kein_beitritt() {
        let tabelle = PresenceTable::neu();
        let kanal = ChannelId::new();
        let ergebnis = tabelle.beitreten(
            kanal,
            ConnectionId::new(),
            UserId::new(),
            &KanalZugang {
                ist_mitglied: false,
                kapazitaet: 10,
            },
        );
        assert!(matches!(ergebnis, Err(SignalingError::KeinMitglied)));
        assert_eq!(tabelle.anzahl(&kanal), 0);
    }

    #[test]
    fn hoechstens_ein_kanal_pro_verbindung() {
        let tabelle = PresenceTable::neu();
        let (a, b) = (ChannelId::new(), ChannelId::new());
        let conn = ConnectionId::new();
        let user = UserId::new();

        tabelle.beitreten(a, conn, user, &zugang(5)).unwrap();
        assert!(matches!(
            tabelle.beitreten(b, conn, user, &zugang(5)),
            Err(SignalingError::UngueltigerZustand(_))
        ));
        assert_eq!(tabelle.kanal_von(&conn), Some(a));

        assert!(tabelle.verlassen(a, &conn));
        assert!(tabelle.kanal_von(&conn).is_none());
        tabelle.beitreten(b, conn, user, &zugang(5)).unwrap();
        assert_eq!(tabelle.kanal_von(&conn), Some(b));
    }

    #[test]
    fn verlassen_ohne_anwesenheit_ist_kein_fehler() {
        let tabelle = PresenceTable::neu();
        assert!(!tabelle.verlassen(ChannelId::new(), &ConnectionId::new()));
    }

    #[test]
    fn sprechen_setzen_erfordert_anwesenheit() {
        let tabelle = PresenceTable::neu();
        let kanal = ChannelId::new();
        let conn = ConnectionId::new();

        assert!(matches!(
            tabelle.sprechen_setzen(kanal, &conn, true),
            Err(SignalingError::NichtAnwesend)
        ));

        tabelle
            .beitreten(kanal, conn, UserId::new(), &zugang(5))
            .unwrap();
        tabelle.sprechen_setzen(kanal, &conn, true).unwrap();
        assert!(tabelle.mitglieder(&kanal)[0].spricht);
    }

    #[test]
    fn mitglieder_in_beitrittsreihenfolge() {
        let tabelle = PresenceTable::neu();
        let kanal = ChannelId::new();
        let conns: Vec<ConnectionId> = (0..3).map(|_| ConnectionId::new()).collect();
        for conn in &conns {
            tabelle
                .beitreten(kanal, *conn, UserId::new(), &zugang(10))
                .unwrap();
        }
        assert_eq!(tabelle.verbindungen(&kanal), conns);
        assert_eq!(tabelle.aktive_kanaele(), 1);

        for conn in &conns {
            tabelle.verlassen(kanal, conn);
        }
        assert_eq!(tabelle.aktive_kanaele(), 0);
    }

    #[test]
    fn belegte_kanaele_werden_mitgezaehlt() {
        let tabelle = PresenceTable::neu();
        let (a, b) = (ChannelId::new(), ChannelId::new());
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());

        tabelle.beitreten(a, c1, UserId::new(), &zugang(5)).unwrap();
        tabelle.beitreten(a, c2, UserId::new(), &zugang(5)).unwrap();
        assert_eq!(tabelle.aktive_kanaele(), 1);

        // Leerer Eintrag bleibt bestehen, zaehlt aber nicht
        tabelle.beitreten(b, ConnectionId::new(), UserId::new(), &zugang(0)).unwrap_err();
        assert_eq!(tabelle.aktive_kanaele(), 1);

        tabelle.wechseln(a, b, c1, UserId::new(), &zugang(5)).unwrap();
        assert_eq!(tabelle.aktive_kanaele(), 2);
        tabelle.wechseln(a, b, c2, UserId::new(), &zugang(5)).unwrap();
        assert_eq!(tabelle.aktive_kanaele(), 1);

        // Doppeltes Verlassen zaehlt nicht doppelt
        assert!(tabelle.verlassen(b, &c1));
        assert!(!tabelle.verlassen(b, &c1));
        assert_eq!(tabelle.aktive_kanaele(), 1);
        assert!(tabelle.verlassen(b, &c2));
        assert_eq!(tabelle.aktive_kanaele(), 0);
    }

    #[test]
    fn wechsel_in_vollen_kanal_behaelt_den_alten() {
        let tabelle = PresenceTable::neu();
        let (alt, voll) = (ChannelId::new(), ChannelId::new());
        let conn = ConnectionId::new();
        let user = UserId::new();

        tabelle.beitreten(alt, conn, user, &zugang(5)).unwrap();
        tabelle.sprechen_setzen(alt, &conn, true).unwrap();
        tabelle.beitreten(voll, ConnectionId::new(), UserId::new(), &zugang(1)).unwrap();

        assert!(matches!(
            tabelle.wechseln(alt, voll, conn, user, &zugang(1)),
            Err(SignalingError::KanalVoll)
        ));
        assert_eq!(tabelle.kanal_von(&conn), Some(alt));
        assert!(tabelle.mitglieder(&alt)[0].spricht);
        assert_eq!(tabelle.anzahl(&voll), 1);

        assert_eq!(tabelle.wechseln(alt, voll, conn, user, &zugang(2)).unwrap(), 2);
        assert_eq!(tabelle.kanal_von(&conn), Some(voll));
        assert_eq!(tabelle.anzahl(&alt), 0);
        assert!(!tabelle.mitglieder(&voll)[1].spricht);
    }

    #[test]
    fn gegenlaeufige_wechsel_verklemmen_nicht() {
        let tabelle = PresenceTable::neu();
        let (a, b) = (ChannelId::new(), ChannelId::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tabelle = tabelle.clone();
                let (von, nach) = if i % 2 == 0 { (a, b) } else { (b, a) };
                std::thread::spawn(move || {
                    let conn = ConnectionId::new();
                    let user = UserId::new();
                    tabelle.beitreten(von, conn, user, &zugang(100)).unwrap();
                    for _ in 0..200 {
                        tabelle.wechseln(von, nach, conn, user, &zugang(100)).unwrap();
                        tabelle.wechseln(nach, von, conn, user, &zugang(100)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tabelle.anzahl(&a) + tabelle.anzahl(&b), 8);
        assert_eq!(tabelle.aktive_kanaele(), 2);
    }

    #[test]
    fn parallele_beitritte_respektieren_kapazitaet() {
        let tabelle = PresenceTable::neu();
        let kanal = ChannelId::new();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tabelle = tabelle.clone();
                std::thread::spawn(move || {
                    tabelle
                        .beitreten(kanal, ConnectionId::new(), UserId::new(), &zugang(5))
                        .is_ok()
                })
            })
            .collect();

        let erfolgreich = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(erfolgreich, 5);
        assert_eq!(tabelle.anzahl(&kanal), 5);
    }
}
