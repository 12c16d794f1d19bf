//! hideaway-crypto – Schluesselaushandlung und Frame-Verschluesselung
//!
//! Dieses Crate implementiert die beiden kryptografischen Bausteine des
//! Systems:
//!
//! - `KeyAgreement`: Diffie-Hellman-Austausch pro Peer-Paar plus
//!   HKDF-SHA256-Ableitung eines 32-Byte-Geheimnisses. Der Kontext-String
//!   (sortiertes Namenspaar) bindet das Geheimnis an genau diese Beziehung.
//! - `FrameCipher`: AES-256-GCM pro Medien-Frame mit frischer 16-Byte-Nonce
//!   und dem Wire-Layout `nonce(16) || tag(16) || ciphertext`.
//!
//! Dazu kommt der `CipherPool`: ein Worker-Pool der Frame-Stroeme pro
//! Peer-Paar einem festen Worker zuordnet, damit die Reihenfolge innerhalb
//! einer Pipeline vom Strom selbst bestimmt wird und nicht vom Scheduler.
//!
//! Das Relay sieht von alledem nichts – Schluesselmaterial reist nur in
//! opaken Signaling-Payloads zwischen den Teilnehmern.

pub mod error;
pub mod frame_cipher;
pub mod key_agreement;
pub mod pipeline;
pub mod types;

// Bequeme Re-Exporte
pub use error::{CryptoError, CryptoResult};
pub use frame_cipher::{frame_entschluesseln, frame_verschluesseln};
pub use key_agreement::{KeyAgreement, base64_dekodieren_32, base64_kodieren, kontext_string};
pub use pipeline::{CipherJob, CipherOp, CipherPool, CipherWorker};
pub use types::{AbgeleitetesGeheimnis, SecretBytes};
