//! hideaway-protocol – Signaling-Protokoll zwischen Client und Relay
//!
//! Definiert das Envelope-Format, die typisierten Payloads und den
//! Frame-Codec fuer die Relay-Verbindung.
//!
//! ## Nachrichtenfluss
//!
//! ```text
//! Client                       Relay                        Client
//!   | {type:"start"/"join"} ---> |                             |
//!   | <--- {code, message, data} |                             |
//!   |                            |                             |
//!   | {type:"offer", data:{to}} -> stempelt data.from --------> |
//!   | {type:"answer", ...} -----> |  (Envelope sonst unveraendert)
//!   | {type:"candidate", ...} --> |                             |
//! ```
//!
//! Das Relay liest nie in `offer`/`answer`/`candidate` hinein – die
//! Payloads (Beschreibungen, Kandidaten, Schluesselmaterial) bleiben
//! opake JSON-Werte.

pub mod envelope;
pub mod types;
pub mod wire;

// Bequeme Re-Exporte
pub use envelope::{
    AnswerPayload, Antwort, CandidatePayload, Envelope, JoinRequest, JoinResponse, OfferPayload,
    SignalKind, StartRequest, StartResponse, code,
};
pub use types::{ChatId, TrackArt};
pub use wire::{FrameCodec, als_frame};
