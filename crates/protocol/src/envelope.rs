//! Signaling-Envelope und typisierte Payloads
//!
//! Jede Client-Nachricht ist ein Envelope `{type, data, id?}`. Das Parsen
//! laeuft zweistufig: zuerst das Envelope, dann die typisierte Payload.
//! So laesst sich ein unbekannter Typ (405) von einer kaputten Payload
//! (400) unterscheiden – ein einstufiges tagged Enum wuerde beides in
//! denselben serde-Fehler werfen.
//!
//! Antworten sind `{code, message, data?, id?}` und spiegeln die
//! Korrelations-ID der Anfrage zurueck.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ChatId;

// ---------------------------------------------------------------------------
// Antwort-Codes
// ---------------------------------------------------------------------------

/// Antwort-Codes des Relays (HTTP-angelehnt)
pub mod code {
    pub const OK: u16 = 200;
    pub const UNGUELTIGE_ANFRAGE: u16 = 400;
    pub const UNAUTORISIERT: u16 = 401;
    pub const NICHT_GEFUNDEN: u16 = 404;
    pub const NICHT_ERLAUBT: u16 = 405;
    pub const KONFLIKT: u16 = 409;
    pub const INTERNER_FEHLER: u16 = 500;
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Nachrichten-Envelope Client -> Relay bzw. Relay -> Client (weitergeleitet)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Nachrichtentyp: start, join, candidate, offer, answer
    #[serde(rename = "type")]
    pub typ: String,
    /// Typ-abhaengige Payload (fuer das Relay groesstenteils opak)
    #[serde(default)]
    pub data: Value,
    /// Client-gewaehlte Korrelations-ID, wird in Antworten gespiegelt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Envelope {
    /// Baut ein Envelope aus Typ und serialisierbarer Payload
    pub fn neu(typ: &str, data: Value, id: Option<String>) -> Self {
        Self {
            typ: typ.to_string(),
            data,
            id,
        }
    }

    /// Parst das Envelope aus rohen Frame-Bytes
    pub fn parsen(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Ordnet den Typ-String einem bekannten `SignalKind` zu
    pub fn kind(&self) -> Option<SignalKind> {
        SignalKind::aus_str(&self.typ)
    }
}

/// Bekannte Nachrichtentypen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Start,
    Join,
    Candidate,
    Offer,
    Answer,
}

impl SignalKind {
    /// Parst den Typ-String; `None` fuer unbekannte Typen
    pub fn aus_str(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "join" => Some(Self::Join),
            "candidate" => Some(Self::Candidate),
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            _ => None,
        }
    }

    /// true fuer Nachrichten die in der Relay-Phase erlaubt sind
    pub fn ist_relay_phase(&self) -> bool {
        matches!(self, Self::Candidate | Self::Offer | Self::Answer)
    }

    /// Typ-String fuer das Wire-Format
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Join => "join",
            Self::Candidate => "candidate",
            Self::Offer => "offer",
            Self::Answer => "answer",
        }
    }
}

// ---------------------------------------------------------------------------
// Typisierte Payloads
// ---------------------------------------------------------------------------

/// `start`-Anfrage: neuen Chat eroeffnen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub name: String,
    pub password: String,
}

/// `join`-Anfrage: bestehendem Chat beitreten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
    pub name: String,
    pub password: String,
}

/// Antwort-Daten einer erfolgreichen `start`-Anfrage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(rename = "chatId")]
    pub chat_id: ChatId,
}

/// Antwort-Daten einer erfolgreichen `join`-Anfrage
///
/// `members` enthaelt alle bestehenden Mitglieder, ohne den Beitretenden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub members: Vec<String>,
}

/// `offer`-Payload: Session-Beschreibung plus DH-Public-Key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferPayload {
    pub offer: Value,
    #[serde(rename = "pubKey")]
    pub pub_key: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// `answer`-Payload: Antwort-Beschreibung, DH-Public-Key und der Salt
/// den die antwortende Seite fuer die Ableitung erzeugt hat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub answer: Value,
    #[serde(rename = "pubKey")]
    pub pub_key: String,
    pub salt: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// `candidate`-Payload: Netzwerk-Erreichbarkeits-Deskriptor (opak)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePayload {
    pub candidate: Value,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

// ---------------------------------------------------------------------------
// Antwort
// ---------------------------------------------------------------------------

/// Antwort des Relays auf eine Anfrage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Antwort {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Antwort {
    /// Erfolgsantwort (Code 200, Nachricht "Connected")
    pub fn ok(data: Option<Value>, id: Option<String>) -> Self {
        Self {
            code: code::OK,
            message: "Connected".to_string(),
            data,
            id,
        }
    }

    /// Fehlerantwort mit Code und Nachricht
    pub fn fehler(code: u16, message: impl Into<String>, id: Option<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            id,
        }
    }

    /// true wenn die Antwort einen Erfolg signalisiert
    pub fn ist_ok(&self) -> bool {
        self.code == code::OK
    }
}
