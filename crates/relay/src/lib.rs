//! hideaway-relay – Relay-Server fuer passwortgeschuetzte Chats
//!
//! Das Relay vermittelt Signaling-Nachrichten zwischen den Teilnehmern
//! eines Chats, sieht aber nie ein abgeleitetes Geheimnis oder Klartext-
//! Medien. Es verwaltet ausschliesslich:
//!
//! - die Raum-Registry (kurze base58-IDs, kollisionsgeprueft)
//! - das Passwort-Gate (argon2id, konstantzeitiger Vergleich)
//! - die Weiterleitung von `candidate`/`offer`/`answer`-Envelopes
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (RelayServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Phase 1: erstes Frame muss start/join sein (Zeitfenster begrenzt)
//!     |  Phase 2: Relay-Phase, nur candidate/offer/answer
//!     v
//! RaumRegistry (DashMap) -- Mitglieder: Name -> Sende-Queue
//! ```
//!
//! Fehler einer Verbindung beruehren nie andere Verbindungen oder Raeume.

pub mod auth;
pub mod connection;
pub mod error;
pub mod room;
pub mod server;

// Bequeme Re-Exporte
pub use connection::ClientConnection;
pub use error::{RelayError, RelayResult};
pub use room::{Raum, RaumRegistry};
pub use server::{RelayConfig, RelayServer};
