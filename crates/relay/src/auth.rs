//! Passwort-Gate: argon2id-Hash + konstantzeitiger Vergleich
//!
//! Das Relay speichert pro Raum einen 64-Byte-Roh-Hash und den 16-Byte-
//! Salt. Beim Join wird das angebotene Passwort mit dem gespeicherten
//! Salt gehasht und konstantzeitig verglichen – die Laufzeit haengt nicht
//! davon ab an welcher Stelle die Hashes zuerst abweichen.
//!
//! Das Hashing ist absichtlich langsam (speicherhart) und laeuft deshalb
//! immer auf `spawn_blocking`, nie im Verbindungs-Task.

use argon2::{Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

use crate::error::{RelayError, RelayResult};

/// Laenge des Roh-Hashes in Bytes
pub const HASH_LAENGE: usize = 64;

/// Laenge des Salts in Bytes
pub const SALT_LAENGE: usize = 16;

/// Argon2id-Parameter (OWASP-Empfehlung: 64 MiB, 3 Iterationen, 1 Thread)
fn argon2_instanz() -> Argon2<'static> {
    let params = Params::new(
        64 * 1024, // m_cost: 64 MiB
        3,         // t_cost: 3 Iterationen
        1,         // p_cost: 1 Thread
        Some(HASH_LAENGE),
    )
    .expect("Argon2-Parameter ungueltig");

    Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params)
}

/// Erzeugt einen frischen zufaelligen Salt
pub fn salt_erzeugen() -> [u8; SALT_LAENGE] {
    let mut salt = [0u8; SALT_LAENGE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Hasht ein Passwort mit argon2id und dem gegebenen Salt
///
/// CPU- und speicherintensiv – Aufrufer muessen das auf `spawn_blocking`
/// auslagern damit andere Verbindungen weiterlaufen.
pub fn langsamer_hash(
    passwort: &[u8],
    salt: &[u8; SALT_LAENGE],
) -> RelayResult<[u8; HASH_LAENGE]> {
    let mut hash = [0u8; HASH_LAENGE];
    argon2_instanz()
        .hash_password_into(passwort, salt, &mut hash)
        .map_err(|e| RelayError::intern(format!("Passwort-Hashing: {e}")))?;
    Ok(hash)
}

/// Vergleicht zwei Roh-Hashes in konstanter Zeit
pub fn hashes_gleich(a: &[u8; HASH_LAENGE], b: &[u8; HASH_LAENGE]) -> bool {
    a.ct_eq(b).into()
}
