//! Fehlertypen fuer die Client-Seite

use hideaway_crypto::CryptoError;
use thiserror::Error;

/// Fehlertyp fuer Relay-Link, Peer-Sessions und Koordinator
#[derive(Debug, Error)]
pub enum SessionError {
    /// IO-Fehler auf der Relay-Verbindung
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Fehler aus Schluesselaushandlung oder Frame-Verschluesselung
    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] CryptoError),

    /// Das Relay hat mit einem Fehlercode geantwortet
    #[error("Relay-Fehler {code}: {message}")]
    Relay { code: u16, message: String },

    /// Zeitlimit beim Verbinden oder Warten auf eine Antwort
    #[error("Zeitlimit: {0}")]
    Zeitlimit(String),

    /// Signal von einem Namen zu dem keine Peer-Session existiert
    #[error("Unbekannter Peer: {0}")]
    UnbekannterPeer(String),

    /// Nachricht passt nicht zum aktuellen Session-Zustand
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Der Transport des Peers hat einen Fehler gemeldet
    #[error("Transportfehler: {0}")]
    Transport(String),

    /// Die Relay-Verbindung ist nicht mehr aktiv
    #[error("Relay-Verbindung geschlossen")]
    VerbindungGeschlossen,
}

/// Result-Typ fuer die Client-Seite
pub type SessionResult<T> = Result<T, SessionError>;
