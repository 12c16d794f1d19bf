//! SessionCoordinator: ein Teilnehmer, viele Peer-Sessions
//!
//! Der Koordinator besitzt alle Peer-Sessions eines Teilnehmers und
//! verdrahtet drei Stroeme:
//!
//! - weitergeleitete Envelopes vom Relay (Offerten, Antworten, Kandidaten),
//!   zugestellt nach dem `from`-Stempel
//! - Transport-Ereignisse der Peers (lokale Kandidaten gehen als
//!   `{candidate, to}` zum Relay, eingehende Spuren zur Session)
//! - lokal veroeffentlichte Spuren, die an jeden Peer angehaengt werden
//!
//! Beim Beitritt wird pro bestehendem Mitglied eine anbietende Session
//! eroeffnet; eine Offerte von einem noch unbekannten Namen eroeffnet die
//! antwortende Gegenseite. Kandidaten und Antworten von unbekannten Namen
//! werden abgelehnt ohne irgendeinen Zustand anzufassen.

use hideaway_crypto::CipherPool;
use hideaway_protocol::{
    AnswerPayload, CandidatePayload, ChatId, Envelope, OfferPayload, SignalKind, TrackArt,
};
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::error::{SessionError, SessionResult};
use crate::link::RelayLink;
use crate::peer::{PeerSession, PeerZustand};
use crate::transport::{TransportEvent, TransportFactory};

/// Kapazitaet des gebuendelten Transport-Ereignis-Stroms
const EREIGNIS_QUEUE: usize = 64;

/// Koordiniert alle Peer-Sessions eines Teilnehmers
pub struct SessionCoordinator {
    lokaler_name: String,
    link: RelayLink,
    eingehend_rx: mpsc::Receiver<Envelope>,
    pool: CipherPool,
    fabrik: Box<dyn TransportFactory>,
    peers: HashMap<String, PeerSession>,
    lokale_spuren: Vec<TrackArt>,
    ereignis_tx: mpsc::Sender<(String, TransportEvent)>,
    ereignis_rx: mpsc::Receiver<(String, TransportEvent)>,
}

/// Naechstes zu verarbeitendes Ereignis
enum Schritt {
    Envelope(Option<Envelope>),
    Ereignis(Option<(String, TransportEvent)>),
}

impl SessionCoordinator {
    /// Erstellt einen Koordinator ueber einem verbundenen Relay-Link
    pub fn neu(
        lokaler_name: &str,
        link: RelayLink,
        eingehend_rx: mpsc::Receiver<Envelope>,
        fabrik: Box<dyn TransportFactory>,
    ) -> Self {
        let (ereignis_tx, ereignis_rx) = mpsc::channel(EREIGNIS_QUEUE);
        Self {
            lokaler_name: lokaler_name.to_string(),
            link,
            eingehend_rx,
            pool: CipherPool::standard(),
            fabrik,
            peers: HashMap::new(),
            lokale_spuren: Vec::new(),
            ereignis_tx,
            ereignis_rx,
        }
    }

    /// Zustand einer Peer-Session (fuer Introspektion)
    pub fn peer_zustand(&self, name: &str) -> Option<PeerZustand> {
        self.peers.get(name).map(PeerSession::zustand)
    }

    /// Anzahl der aktiven Peer-Sessions
    pub fn peer_anzahl(&self) -> usize {
        self.peers.len()
    }

    // -----------------------------------------------------------------------
    // Chat-Lebenszyklus
    // -----------------------------------------------------------------------

    /// Eroeffnet einen neuen Chat; der Koordinator ist dann einziges Mitglied
    pub async fn chat_starten(&self, passwort: &str) -> SessionResult<ChatId> {
        self.link.chat_starten(&self.lokaler_name, passwort).await
    }

    /// Tritt einem Chat bei und eroeffnet pro bestehendem Mitglied eine
    /// anbietende Peer-Session
    pub async fn chat_beitreten(&mut self, chat_id: &ChatId, passwort: &str) -> SessionResult<()> {
        let mitglieder = self
            .link
            .chat_beitreten(chat_id, &self.lokaler_name, passwort)
            .await?;

        tracing::info!(
            chat = %chat_id,
            mitglieder = mitglieder.len(),
            "Chat beigetreten, Offerten gehen raus"
        );

        for mitglied in mitglieder {
            self.peer_erstellen(&mitglied)?;

            let spuren = self.lokale_spuren.clone();
            let peer = self.peer_holen(&mitglied)?;
            for art in spuren {
                peer.spur_anbinden(art).await?;
            }
            let offerte = peer.offerte_erstellen().await?;

            let data = serde_json::to_value(offerte)
                .map_err(|e| SessionError::Protokoll(e.to_string()))?;
            self.link.senden(SignalKind::Offer, data).await?;
        }

        Ok(())
    }

    /// Veroeffentlicht eine lokale Spur: sie wird an alle bestehenden und
    /// alle zukuenftigen Peers angehaengt
    pub async fn spur_veroeffentlichen(&mut self, art: TrackArt) -> SessionResult<()> {
        self.lokale_spuren.push(art);
        for peer in self.peers.values_mut() {
            peer.spur_anbinden(art).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Event-Loop
    // -----------------------------------------------------------------------

    /// Verarbeitet Signale und Transport-Ereignisse bis der Link schliesst
    ///
    /// Fehler einzelner Signale werden geloggt, der Loop laeuft weiter.
    pub async fn ereignis_schleife(&mut self) {
        loop {
            match self.einen_schritt().await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!("Eingangs-Strom geschlossen, Koordinator beendet");
                    break;
                }
                Err(e) => {
                    tracing::warn!(fehler = %e, "Signal verworfen");
                }
            }
        }
    }

    /// Verarbeitet genau ein Ereignis; `Ok(false)` wenn der Link zu ist
    pub async fn einen_schritt(&mut self) -> SessionResult<bool> {
        let schritt = tokio::select! {
            envelope = self.eingehend_rx.recv() => Schritt::Envelope(envelope),
            ereignis = self.ereignis_rx.recv() => Schritt::Ereignis(ereignis),
        };

        match schritt {
            Schritt::Envelope(Some(envelope)) => {
                self.envelope_verarbeiten(envelope).await?;
                Ok(true)
            }
            Schritt::Envelope(None) => Ok(false),
            Schritt::Ereignis(Some((peer, ereignis))) => {
                self.ereignis_verarbeiten(&peer, ereignis).await?;
                Ok(true)
            }
            // Der Koordinator haelt selbst einen Sender, der Strom endet nie
            Schritt::Ereignis(None) => Ok(true),
        }
    }

    /// Stellt ein weitergeleitetes Envelope der richtigen Session zu
    async fn envelope_verarbeiten(&mut self, envelope: Envelope) -> SessionResult<()> {
        match envelope.kind() {
            Some(SignalKind::Offer) => {
                let payload: OfferPayload = payload_parsen(envelope)?;
                let von = absender(&payload.from)?;

                if self.peers.contains_key(&von) {
                    return Err(SessionError::Protokoll(format!(
                        "Zweite Offerte von {von}"
                    )));
                }

                self.peer_erstellen(&von)?;
                let spuren = self.lokale_spuren.clone();
                let peer = self.peer_holen(&von)?;
                for art in spuren {
                    peer.spur_anbinden(art).await?;
                }
                let antwort = peer.offerte_verarbeiten(payload.offer, &payload.pub_key).await?;

                let data = serde_json::to_value(antwort)
                    .map_err(|e| SessionError::Protokoll(e.to_string()))?;
                self.link.senden(SignalKind::Answer, data).await
            }

            Some(SignalKind::Answer) => {
                let payload: AnswerPayload = payload_parsen(envelope)?;
                let von = absender(&payload.from)?;
                let peer = self
                    .peers
                    .get_mut(&von)
                    .ok_or(SessionError::UnbekannterPeer(von))?;
                peer.antwort_verarbeiten(payload.answer, &payload.pub_key, &payload.salt)
                    .await
            }

            Some(SignalKind::Candidate) => {
                let payload: CandidatePayload = payload_parsen(envelope)?;
                let von = absender(&payload.from)?;
                let peer = self
                    .peers
                    .get_mut(&von)
                    .ok_or(SessionError::UnbekannterPeer(von))?;
                peer.kandidat_verarbeiten(payload.candidate).await
            }

            _ => Err(SessionError::Protokoll(format!(
                "Unerwarteter Envelope-Typ: {}",
                envelope.typ
            ))),
        }
    }

    /// Verarbeitet ein Transport-Ereignis eines Peers
    async fn ereignis_verarbeiten(
        &mut self,
        peer_name: &str,
        ereignis: TransportEvent,
    ) -> SessionResult<()> {
        match ereignis {
            TransportEvent::Kandidat(kandidat) => {
                self.link
                    .senden(
                        SignalKind::Candidate,
                        json!({"candidate": kandidat, "to": peer_name}),
                    )
                    .await
            }
            TransportEvent::EingehendeSpur(strom) => {
                let peer = self
                    .peers
                    .get_mut(peer_name)
                    .ok_or_else(|| SessionError::UnbekannterPeer(peer_name.to_string()))?;
                peer.eingehende_spur(strom).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    /// Erstellt eine Peer-Session samt Ereignis-Weiterleitung
    fn peer_erstellen(&mut self, name: &str) -> SessionResult<()> {
        let (transport, mut ereignisse) = self.fabrik.erstellen(name)?;

        // Transport-Ereignisse in den gebuendelten Strom umleiten,
        // gestempelt mit dem Peer-Namen
        let ereignis_tx = self.ereignis_tx.clone();
        let peer_name = name.to_string();
        tokio::spawn(async move {
            while let Some(ereignis) = ereignisse.recv().await {
                if ereignis_tx.send((peer_name.clone(), ereignis)).await.is_err() {
                    break;
                }
            }
        });

        let session = PeerSession::neu(
            &self.lokaler_name,
            name,
            transport,
            self.pool.zuteilen(),
        );
        self.peers.insert(name.to_string(), session);
        tracing::debug!(peer = %name, "Peer-Session erstellt");
        Ok(())
    }

    fn peer_holen(&mut self, name: &str) -> SessionResult<&mut PeerSession> {
        self.peers
            .get_mut(name)
            .ok_or_else(|| SessionError::UnbekannterPeer(name.to_string()))
    }
}

/// Zieht die typisierte Payload aus einem Envelope (400er-Aequivalent)
fn payload_parsen<T: serde::de::DeserializeOwned>(envelope: Envelope) -> SessionResult<T> {
    serde_json::from_value(envelope.data)
        .map_err(|e| SessionError::Protokoll(format!("Payload: {e}")))
}

/// Der `from`-Stempel ist Pflicht fuer weitergeleitete Envelopes
fn absender(from: &Option<String>) -> SessionResult<String> {
    from.clone()
        .ok_or_else(|| SessionError::Protokoll("Envelope ohne from-Stempel".to_string()))
}
