//! Fehlertypen fuer den Relay-Server

use hideaway_protocol::{Antwort, code};
use thiserror::Error;

/// Fehlertyp fuer den Relay-Server
///
/// Jede Variante traegt die Nachricht die auf dem Draht landet; die
/// Zuordnung zu Antwort-Codes passiert in [`RelayError::als_antwort`].
#[derive(Debug, Error)]
pub enum RelayError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Kaputtes Envelope oder falscher Nachrichtentyp in der Handshake-Phase
    #[error("Ungueltige Anfrage: {0}")]
    UngueltigeAnfrage(String),

    /// Passwort falsch
    #[error("Passwort falsch")]
    Unautorisiert,

    /// Raum oder Mitglied nicht gefunden
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Nachrichtentyp in der Relay-Phase nicht erlaubt
    #[error("Nicht erlaubt: {0}")]
    NichtErlaubt(String),

    /// Mitgliedsname im Raum bereits vergeben
    #[error("Name bereits vergeben: {0}")]
    NameVergeben(String),

    /// Alle Kandidaten-Laengen fuer die Raum-ID kollidieren
    #[error("Keine freie Raum-ID verfuegbar")]
    KeineFreieId,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl RelayError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Baut die Wire-Antwort zu diesem Fehler, mit gespiegelter Anfrage-ID
    pub fn als_antwort(&self, id: Option<String>) -> Antwort {
        let (code, message) = match self {
            Self::UngueltigeAnfrage(msg) => (code::UNGUELTIGE_ANFRAGE, msg.as_str()),
            Self::Unautorisiert => (code::UNAUTORISIERT, "Invalid password"),
            Self::NichtGefunden(msg) => (code::NICHT_GEFUNDEN, msg.as_str()),
            Self::NichtErlaubt(msg) => (code::NICHT_ERLAUBT, msg.as_str()),
            Self::NameVergeben(_) => (code::KONFLIKT, "Member already has that name"),
            Self::KeineFreieId => (code::INTERNER_FEHLER, "Service unavailable"),
            Self::Io(_) | Self::Intern(_) => (code::INTERNER_FEHLER, "Internal Server Error"),
        };
        Antwort::fehler(code, message, id)
    }
}

/// Result-Typ fuer den Relay-Server
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn antwort_codes_stimmen() {
        assert_eq!(RelayError::Unautorisiert.als_antwort(None).code, 401);
        assert_eq!(
            RelayError::NichtGefunden("Chat not found".into())
                .als_antwort(None)
                .code,
            404
        );
        assert_eq!(
            RelayError::NameVergeben("alice".into()).als_antwort(None).code,
            409
        );
        assert_eq!(RelayError::KeineFreieId.als_antwort(None).code, 500);
    }

    #[test]
    fn antwort_spiegelt_id() {
        let antwort = RelayError::Unautorisiert.als_antwort(Some("req-3".into()));
        assert_eq!(antwort.id.as_deref(), Some("req-3"));
    }

    #[test]
    fn keine_freie_id_meldet_service_unavailable() {
        let antwort = RelayError::KeineFreieId.als_antwort(None);
        assert_eq!(antwort.message, "Service unavailable");
    }
}
