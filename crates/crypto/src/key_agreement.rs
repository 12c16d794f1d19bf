//! X25519 Diffie-Hellman Schluesselaushandlung pro Peer-Paar
//!
//! Beide Seiten tauschen ihre oeffentlichen Schluessel ueber das Relay aus
//! (im Offer bzw. Answer) und leiten das 32-Byte-Geheimnis unabhaengig
//! voneinander ab – es gibt keinen Bestaetigungsschritt. Die Ableitung
//! muss deshalb bit-identisch sein, egal welche Seite rechnet:
//!
//! - IKM   = roher DH-Wert
//! - Salt  = 32 Zufallsbytes, erzeugt von der Seite die zuerst rechnet
//!   (die antwortende) und im Answer mitgeschickt
//! - Info  = Kontext-String: beide Teilnehmernamen lexikografisch
//!   sortiert und mit `,` verbunden
//!
//! Der Kontext-String bindet das Geheimnis an genau dieses Namenspaar.
//! Teilen sich mehrere Chats ein Relay, kann ein abgeleiteter Schluessel
//! so nie fuer ein anderes Paar gelten.

use base64::{Engine, engine::general_purpose::STANDARD};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{AbgeleitetesGeheimnis, SecretBytes};

/// Laenge des abgeleiteten Geheimnisses in Bytes
pub const GEHEIMNIS_LAENGE: usize = 32;

/// Laenge des Extraktions-Salts in Bytes
pub const SALT_LAENGE: usize = 32;

/// Baut den Kontext-String aus dem sortierten Namenspaar
///
/// Symmetrisch: `kontext_string(a, b) == kontext_string(b, a)`.
pub fn kontext_string(lokaler_name: &str, remote_name: &str) -> String {
    let mut paar = [lokaler_name, remote_name];
    paar.sort_unstable();
    paar.join(",")
}

/// Eine Seite der Schluesselaushandlung fuer genau ein Peer-Paar
///
/// Der private Schluessel ist ephemer und wird beim Berechnen des
/// Geheimnisses verbraucht – eine zweite Berechnung schlaegt fehl.
pub struct KeyAgreement {
    ephemeral: Option<EphemeralSecret>,
    public_key: [u8; 32],
}

impl KeyAgreement {
    /// Erstellt eine neue Instanz mit frischem ephemerem Schluesselpaar
    pub fn neu() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public_key = X25519PublicKey::from(&secret);
        Self {
            ephemeral: Some(secret),
            public_key: public_key.to_bytes(),
        }
    }

    /// Oeffentlicher Schluessel – darf im Klartext uebertragen werden
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// Oeffentlicher Schluessel base64-kodiert fuer das Signaling
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public_key)
    }

    /// Fuehrt den DH-Austausch durch und leitet das Paar-Geheimnis ab
    ///
    /// Liefert die Seite keinen `salt` (die antwortende Seite rechnet
    /// zuerst), wird ein frischer 32-Byte-Salt erzeugt und im Ergebnis
    /// zurueckgegeben, damit er im Answer mitreisen kann.
    pub fn geheimnis_berechnen(
        &mut self,
        remote_public: &[u8; 32],
        lokaler_name: &str,
        remote_name: &str,
        salt: Option<[u8; 32]>,
    ) -> CryptoResult<AbgeleitetesGeheimnis> {
        let eigener = self
            .ephemeral
            .take()
            .ok_or(CryptoError::SchluesselVerbraucht)?;

        let remote = X25519PublicKey::from(*remote_public);
        let dh = eigener.diffie_hellman(&remote);

        let salt = match salt {
            Some(s) => s,
            None => {
                let mut s = [0u8; SALT_LAENGE];
                OsRng.fill_bytes(&mut s);
                s
            }
        };

        let info = kontext_string(lokaler_name, remote_name);
        let schluessel = hkdf_ableiten(dh.as_bytes(), &salt, info.as_bytes(), GEHEIMNIS_LAENGE)?;

        Ok(AbgeleitetesGeheimnis {
            schluessel: SecretBytes::new(schluessel),
            salt,
        })
    }
}

impl Default for KeyAgreement {
    fn default() -> Self {
        Self::neu()
    }
}

/// HKDF-SHA256: Extract mit `salt`, Expand mit `info`
///
/// Unterstuetzt beliebige Laengen bis zur HKDF-Grenze (255 * 32 Bytes);
/// dieses System fordert immer 32 an.
pub fn hkdf_ableiten(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> CryptoResult<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

/// Dekodiert einen base64-kodierten 32-Byte-Wert (Public Key oder Salt)
pub fn base64_dekodieren_32(s: &str) -> CryptoResult<[u8; 32]> {
    let bytes = STANDARD
        .decode(s)
        .map_err(|e| CryptoError::UngueltigeDaten(format!("Base64: {e}")))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| CryptoError::UngueltigeSchluesselLaenge {
            erwartet: 32,
            erhalten: v.len(),
        })
}

/// Kodiert Bytes base64 fuer das Signaling
pub fn base64_kodieren(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
