//! hideaway-session – Client-Seite: Relay-Link, Peer-Sessions, Koordinator
//!
//! Diese Crate implementiert die Teilnehmer-Seite des Systems. Das Relay
//! sieht nur Signaling; Geheimnisse entstehen ausschliesslich hier:
//!
//! ```text
//! RelayLink ---- korrelierte Anfragen (start/join) + Envelope-Strom
//!     |
//!     v
//! SessionCoordinator ---- verteilt Signale nach `from`
//!     |
//!     v
//! PeerSession (pro Gegenseite) ---- X25519/HKDF-Aushandlung,
//!     |                             Kandidaten-Puffer, Spur-Puffer
//!     v
//! CipherPool ---- Frame-Pipelines (AES-256-GCM) pro Spur
//! ```
//!
//! Der Medien-Transport selbst (Beschreibungen, Kandidaten, Spuren) ist
//! extern und haengt hinter dem [`PeerTransport`]-Trait.

pub mod coordinator;
pub mod error;
pub mod link;
pub mod peer;
pub mod transport;

// Bequeme Re-Exporte
pub use coordinator::SessionCoordinator;
pub use error::{SessionError, SessionResult};
pub use link::RelayLink;
pub use peer::{PeerSession, PeerZustand};
pub use transport::{PeerTransport, SpurStrom, TransportEvent, TransportFactory};
