//! Transport-Seam zu den externen Medien-Kollaborateuren
//!
//! Das Aushandeln der Medienverbindung (Beschreibungen, Kandidaten,
//! Spuren) uebernimmt ein externer Transport. Diese Crate kennt ihn nur
//! ueber das [`PeerTransport`]-Trait; Beschreibungen und Kandidaten
//! bleiben opake JSON-Werte und reisen unveraendert durch das Signaling.
//!
//! Frame-Stroeme sind mpsc-Kanaele: der Transport liefert pro Spur ein
//! [`SpurStrom`]-Paar, die Session haengt die Cipher-Pipeline dazwischen.

use async_trait::async_trait;
use bytes::Bytes;
use hideaway_protocol::TrackArt;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::SessionResult;

/// Frame-Strom einer Spur
///
/// `quelle` ist die Seite die die Cipher-Pipeline liest, `senke` die in
/// die sie schreibt. Ausgehend: Klartext rein, Wire-Payload raus.
/// Eingehend: Wire-Payload rein, Klartext raus.
pub struct SpurStrom {
    pub art: TrackArt,
    pub quelle: mpsc::Receiver<Bytes>,
    pub senke: mpsc::Sender<Bytes>,
}

/// Ereignisse die der Transport waehrend der Aushandlung meldet
pub enum TransportEvent {
    /// Lokaler Erreichbarkeits-Kandidat, muss zur Gegenseite
    Kandidat(Value),
    /// Eingehende Spur der Gegenseite, braucht eine Entschluesselungs-Pipeline
    EingehendeSpur(SpurStrom),
}

/// Medien-Transport fuer genau ein Peer-Paar
#[async_trait]
pub trait PeerTransport: Send {
    /// Erstellt die lokale Session-Beschreibung der anbietenden Seite
    async fn offerte_erstellen(&mut self) -> SessionResult<Value>;

    /// Erstellt die Antwort-Beschreibung (setzt gesetzte Remote-Beschreibung voraus)
    async fn antwort_erstellen(&mut self) -> SessionResult<Value>;

    /// Setzt die Beschreibung der Gegenseite
    async fn remote_beschreibung_setzen(&mut self, beschreibung: Value) -> SessionResult<()>;

    /// Wendet einen Kandidaten der Gegenseite an
    async fn kandidat_anwenden(&mut self, kandidat: Value) -> SessionResult<()>;

    /// Haengt eine ausgehende Spur an und liefert ihren Frame-Strom
    async fn spur_hinzufuegen(&mut self, art: TrackArt) -> SessionResult<SpurStrom>;
}

/// Erzeugt pro Peer einen Transport plus dessen Ereignis-Strom
pub trait TransportFactory: Send + Sync {
    fn erstellen(
        &self,
        peer_name: &str,
    ) -> SessionResult<(Box<dyn PeerTransport>, mpsc::Receiver<TransportEvent>)>;
}
