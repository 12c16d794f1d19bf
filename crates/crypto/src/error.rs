//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehlertyp fuer Schluesselaushandlung und Frame-Verschluesselung
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Der private DH-Schluessel wurde bereits verbraucht
    #[error("Schluesselaustausch: privater Schluessel bereits verwendet")]
    SchluesselVerbraucht,

    /// HKDF-Ableitung fehlgeschlagen (z.B. angeforderte Laenge > 255 * 32)
    #[error("Schluesselableitung fehlgeschlagen: {0}")]
    KeyDerivation(String),

    /// Schluesselmaterial hat die falsche Laenge
    #[error("Ungueltige Schluessellaenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    /// Verschluesselung fehlgeschlagen
    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    /// Auth-Tag-Pruefung fehlgeschlagen – das Frame wird verworfen
    #[error("Authentifizierung des Frames fehlgeschlagen")]
    AuthentifizierungFehlgeschlagen,

    /// Payload zu kurz oder strukturell kaputt
    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    /// Der zugeteilte Cipher-Worker nimmt keine Auftraege mehr an
    #[error("Cipher-Worker nicht mehr erreichbar")]
    WorkerBeendet,
}

/// Result-Typ fuer das Kryptografie-Subsystem
pub type CryptoResult<T> = Result<T, CryptoError>;
