//! Gemeinsame Typen fuer das Hideaway-Protokoll
//!
//! `ChatId` verwendet das Newtype-Pattern, serialisiert aber als blanker
//! String damit das Wire-Format (`{"chatId": "Ab3x"}`) schlank bleibt.

use serde::{Deserialize, Serialize};

/// Oeffentliches, teilbares Chat-Token (base58, 3-5 Bytes Entropie)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

impl ChatId {
    /// Erstellt eine ChatId aus einem bereits kodierten Token
    pub fn neu(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Gibt das Token als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Art eines Medien-Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackArt {
    Audio,
    Video,
}

impl std::fmt::Display for TrackArt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackArt::Audio => write!(f, "audio"),
            TrackArt::Video => write!(f, "video"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_id_serialisiert_als_string() {
        let id = ChatId::neu("Ab3x");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"Ab3x\"");

        let zurueck: ChatId = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, id);
    }

    #[test]
    fn track_art_anzeige() {
        assert_eq!(TrackArt::Audio.to_string(), "audio");
        assert_eq!(TrackArt::Video.to_string(), "video");
    }
}
