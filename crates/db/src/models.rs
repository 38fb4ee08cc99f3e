//! Datensaetze des Kanal-Registers und des Aktivitaetsprotokolls
//!
//! Reine Datenuebertragungsobjekte, getrennt von den Signaling-Typen.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sprechfunk_core::types::{ChannelId, UserId};

// ---------------------------------------------------------------------------
// Kanaele
// ---------------------------------------------------------------------------

/// Standard-Kapazitaet eines Kanals
pub const STANDARD_MAX_USERS: u32 = 50;

/// Kanal-Datensatz
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanalRecord {
    pub id: ChannelId,
    pub name: String,
    pub beschreibung: Option<String>,
    /// Maximale Anzahl gleichzeitig anwesender Mitglieder
    pub max_users: u32,
    pub aktiv: bool,
    pub erstellt_am: DateTime<Utc>,
}

/// Daten zum Anlegen eines Kanals
#[derive(Debug, Clone)]
pub struct NeuerKanal<'a> {
    /// Feste ID (z.B. aus der Konfiguration); sonst wird eine erzeugt
    pub id: Option<ChannelId>,
    pub name: &'a str,
    pub beschreibung: Option<&'a str>,
    pub max_users: u32,
    pub aktiv: bool,
}

impl Default for NeuerKanal<'_> {
    fn default() -> Self {
        Self {
            id: None,
            name: "",
            beschreibung: None,
            max_users: STANDARD_MAX_USERS,
            aktiv: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Aktivitaeten
// ---------------------------------------------------------------------------

/// Protokollierte Kanal-Aktion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aktion {
    Join,
    Leave,
    SpeakStart,
    SpeakEnd,
}

impl Aktion {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::SpeakStart => "speak_start",
            Self::SpeakEnd => "speak_end",
        }
    }
}

impl std::str::FromStr for Aktion {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "join" => Ok(Self::Join),
            "leave" => Ok(Self::Leave),
            "speak_start" => Ok(Self::SpeakStart),
            "speak_end" => Ok(Self::SpeakEnd),
            other => Err(format!("Unbekannte Aktion: {other}")),
        }
    }
}

impl std::fmt::Display for Aktion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

/// Ein Eintrag im Aktivitaetsprotokoll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AktivitaetsEintrag {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub aktion: Aktion,
    /// Sprechdauer in Sekunden (nur bei `speak_end`)
    pub dauer_sek: Option<f64>,
    pub zeitpunkt: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aktion_string_konvertierung() {
        for aktion in [Aktion::Join, Aktion::Leave, Aktion::SpeakStart, Aktion::SpeakEnd] {
            assert_eq!(aktion.als_str().parse::<Aktion>().unwrap(), aktion);
        }
        assert!("mute".parse::<Aktion>().is_err());
    }

    #[test]
    fn neuer_kanal_standardwerte() {
        let kanal = NeuerKanal::default();
        assert_eq!(kanal.max_users, STANDARD_MAX_USERS);
        assert!(kanal.aktiv);
    }
}
