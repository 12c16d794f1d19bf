//! Frame-Verschluesselung mit AES-256-GCM
//!
//! Jedes Medien-Frame wird einzeln und zustandslos verschluesselt – das
//! einzige geteilte Stueck ist das Paar-Geheimnis. Der Traeger darf Frames
//! also beliebig umordnen oder verlieren.
//!
//! ## Wire-Layout
//!
//! ```text
//! [nonce(16)] [tag(16)] [ciphertext(variabel)]
//! ```
//!
//! Die Nonce kommt pro Frame frisch aus dem CSPRNG. Ein Zaehler waere bei
//! gleichem Schluessel ueber Prozessgrenzen hinweg nicht synchronisierbar,
//! und Nonce-Wiederverwendung unter GCM gibt den Klartext komplett preis.

use aes_gcm::{
    AesGcm,
    aead::{Aead, KeyInit, consts::U16, generic_array::GenericArray},
    aes::Aes256,
};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{CryptoError, CryptoResult};
use crate::types::SecretBytes;

/// AES-256-GCM mit 16-Byte-Nonce (Tag bleibt 16 Bytes)
type FrameAead = AesGcm<Aes256, U16>;

/// Laenge der Nonce in Bytes
pub const NONCE_LAENGE: usize = 16;

/// Laenge des Auth-Tags in Bytes
pub const TAG_LAENGE: usize = 16;

/// Gesamtlaenge des Headers vor dem Ciphertext
pub const HEADER_LAENGE: usize = NONCE_LAENGE + TAG_LAENGE;

fn cipher_bauen(geheimnis: &SecretBytes) -> CryptoResult<FrameAead> {
    if geheimnis.len() != 32 {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: 32,
            erhalten: geheimnis.len(),
        });
    }
    Ok(FrameAead::new(GenericArray::from_slice(geheimnis.as_bytes())))
}

/// Verschluesselt ein einzelnes Frame mit frischer Zufalls-Nonce
///
/// Keine zusaetzlichen authentifizierten Daten – das Frame ist fuer den
/// Traeger vollstaendig opak.
pub fn frame_verschluesseln(geheimnis: &SecretBytes, klartext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = cipher_bauen(geheimnis)?;

    let mut nonce = [0u8; NONCE_LAENGE];
    OsRng.fill_bytes(&mut nonce);

    // aead liefert ciphertext || tag – fuer das Wire-Layout umsortieren
    let mut ct_mit_tag = cipher
        .encrypt(GenericArray::from_slice(&nonce), klartext)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    let tag = ct_mit_tag.split_off(ct_mit_tag.len() - TAG_LAENGE);

    let mut payload = Vec::with_capacity(HEADER_LAENGE + ct_mit_tag.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&tag);
    payload.extend_from_slice(&ct_mit_tag);

    Ok(payload)
}

/// Entschluesselt ein Frame und verifiziert den Auth-Tag
///
/// Schlaegt die Tag-Pruefung fehl, wird `AuthentifizierungFehlgeschlagen`
/// zurueckgegeben – niemals teilweise entschluesselter Klartext.
pub fn frame_entschluesseln(geheimnis: &SecretBytes, payload: &[u8]) -> CryptoResult<Vec<u8>> {
    if payload.len() < HEADER_LAENGE {
        return Err(CryptoError::UngueltigeDaten(format!(
            "Frame zu kurz: {} Bytes",
            payload.len()
        )));
    }

    let cipher = cipher_bauen(geheimnis)?;

    let nonce = &payload[..NONCE_LAENGE];
    let tag = &payload[NONCE_LAENGE..HEADER_LAENGE];
    let ciphertext = &payload[HEADER_LAENGE..];

    // aead erwartet ciphertext || tag
    let mut ct_mit_tag = Vec::with_capacity(ciphertext.len() + TAG_LAENGE);
    ct_mit_tag.extend_from_slice(ciphertext);
    ct_mit_tag.extend_from_slice(tag);

    cipher
        .decrypt(GenericArray::from_slice(nonce), ct_mit_tag.as_slice())
        .map_err(|_| CryptoError::AuthentifizierungFehlgeschlagen)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
