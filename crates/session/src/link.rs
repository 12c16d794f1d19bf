//! RelayLink: korrelierte Anfragen ueber die Relay-Verbindung
//!
//! Der Link besitzt die TCP-Verbindung zum Relay in einem eigenen Task.
//! Anfragen (`start`, `join`) tragen eine uuid-Korrelations-ID; die
//! zugehoerige Antwort wird ueber einen oneshot-Kanal an den Aufrufer
//! zurueckgereicht. Weitergeleitete Envelopes anderer Teilnehmer (ohne
//! Korrelation) landen im Eingangs-Strom des Koordinators.
//!
//! Verbinden und Warten auf Antworten sind mit 10 Sekunden begrenzt.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hideaway_protocol::{
    Antwort, ChatId, Envelope, FrameCodec, JoinRequest, JoinResponse, SignalKind, StartRequest,
    StartResponse, als_frame,
};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};

/// Zeitlimit fuer Verbindungsaufbau und Anfrage-Antwort
const ZEITLIMIT: Duration = Duration::from_secs(10);

/// Kapazitaet der Sende- und Eingangs-Queues
const QUEUE_GROESSE: usize = 64;

type WartendeMap = HashMap<String, oneshot::Sender<Antwort>>;
type Wartende = Arc<Mutex<WartendeMap>>;

/// Sperrt die Map der wartenden Anfragen
///
/// Die Map traegt keine Invarianten ueber einzelne Eintraege hinaus; ein
/// vergifteter Guard wird deshalb weiterverwendet statt zu panicken.
fn wartende_sperren(wartende: &Wartende) -> MutexGuard<'_, WartendeMap> {
    wartende.lock().unwrap_or_else(|vergiftet| vergiftet.into_inner())
}

/// Verbindung zum Relay mit Anfrage-Korrelation
#[derive(Clone)]
pub struct RelayLink {
    ausgehend_tx: mpsc::Sender<Bytes>,
    wartende: Wartende,
}

impl RelayLink {
    /// Verbindet zum Relay
    ///
    /// Liefert den Link plus den Strom der weitergeleiteten Envelopes
    /// (Offerten, Antworten und Kandidaten anderer Teilnehmer).
    pub async fn verbinden(
        addr: SocketAddr,
    ) -> SessionResult<(Self, mpsc::Receiver<Envelope>)> {
        let stream = tokio::time::timeout(ZEITLIMIT, TcpStream::connect(addr))
            .await
            .map_err(|_| SessionError::Zeitlimit(format!("Verbindungsaufbau zu {addr}")))??;

        let framed = Framed::new(stream, FrameCodec::new());

        let (ausgehend_tx, ausgehend_rx) = mpsc::channel(QUEUE_GROESSE);
        let (eingehend_tx, eingehend_rx) = mpsc::channel(QUEUE_GROESSE);
        let wartende: Wartende = Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(link_schleife(
            framed,
            ausgehend_rx,
            Arc::clone(&wartende),
            eingehend_tx,
        ));

        Ok((
            Self {
                ausgehend_tx,
                wartende,
            },
            eingehend_rx,
        ))
    }

    /// Stellt eine korrelierte Anfrage und wartet auf die passende Antwort
    ///
    /// Eine Antwort mit Code != 200 wird zum [`SessionError::Relay`].
    pub async fn anfrage(&self, typ: SignalKind, data: Value) -> SessionResult<Antwort> {
        let id = Uuid::new_v4().to_string();
        let (antwort_tx, antwort_rx) = oneshot::channel();

        wartende_sperren(&self.wartende).insert(id.clone(), antwort_tx);

        let envelope = Envelope::neu(typ.als_str(), data, Some(id.clone()));
        let frame = als_frame(&envelope)?;
        if self.ausgehend_tx.send(frame).await.is_err() {
            wartende_sperren(&self.wartende).remove(&id);
            return Err(SessionError::VerbindungGeschlossen);
        }

        let antwort = match tokio::time::timeout(ZEITLIMIT, antwort_rx).await {
            Ok(Ok(antwort)) => antwort,
            Ok(Err(_)) => return Err(SessionError::VerbindungGeschlossen),
            Err(_) => {
                wartende_sperren(&self.wartende).remove(&id);
                return Err(SessionError::Zeitlimit(format!("Anfrage {}", typ.als_str())));
            }
        };

        if antwort.ist_ok() {
            Ok(antwort)
        } else {
            Err(SessionError::Relay {
                code: antwort.code,
                message: antwort.message,
            })
        }
    }

    /// Sendet ein Envelope ohne auf eine Antwort zu warten
    ///
    /// Erfolgreiche Weiterleitungen quittiert das Relay nicht; Fehler
    /// (etwa 404 fuer einen abgemeldeten Empfaenger) kommen als
    /// unkorrelierte Antworten zurueck und werden nur geloggt.
    pub async fn senden(&self, typ: SignalKind, data: Value) -> SessionResult<()> {
        let envelope = Envelope::neu(typ.als_str(), data, None);
        let frame = als_frame(&envelope)?;
        self.ausgehend_tx
            .send(frame)
            .await
            .map_err(|_| SessionError::VerbindungGeschlossen)
    }

    /// Eroeffnet einen neuen Chat und liefert sein Token
    pub async fn chat_starten(&self, name: &str, passwort: &str) -> SessionResult<ChatId> {
        let data = serde_json::to_value(StartRequest {
            name: name.to_string(),
            password: passwort.to_string(),
        })
        .map_err(|e| SessionError::Protokoll(e.to_string()))?;

        let antwort = self.anfrage(SignalKind::Start, data).await?;
        let daten: StartResponse = antwort_daten(antwort)?;
        Ok(daten.chat_id)
    }

    /// Tritt einem Chat bei und liefert die bestehenden Mitglieder
    pub async fn chat_beitreten(
        &self,
        chat_id: &ChatId,
        name: &str,
        passwort: &str,
    ) -> SessionResult<Vec<String>> {
        let data = serde_json::to_value(JoinRequest {
            chat_id: chat_id.clone(),
            name: name.to_string(),
            password: passwort.to_string(),
        })
        .map_err(|e| SessionError::Protokoll(e.to_string()))?;

        let antwort = self.anfrage(SignalKind::Join, data).await?;
        let daten: JoinResponse = antwort_daten(antwort)?;
        Ok(daten.members)
    }
}

/// Zieht die typisierten Daten aus einer Erfolgsantwort
fn antwort_daten<T: serde::de::DeserializeOwned>(antwort: Antwort) -> SessionResult<T> {
    let daten = antwort
        .data
        .ok_or_else(|| SessionError::Protokoll("Antwort ohne Daten".to_string()))?;
    serde_json::from_value(daten)
        .map_err(|e| SessionError::Protokoll(format!("Antwort-Daten: {e}")))
}

// ---------------------------------------------------------------------------
// Link-Task
// ---------------------------------------------------------------------------

/// Event-Loop des Links: sendet ausgehende Frames, routet eingehende
async fn link_schleife(
    mut framed: Framed<TcpStream, FrameCodec>,
    mut ausgehend_rx: mpsc::Receiver<Bytes>,
    wartende: Wartende,
    eingehend_tx: mpsc::Sender<Envelope>,
) {
    loop {
        tokio::select! {
            ausgehend = ausgehend_rx.recv() => {
                match ausgehend {
                    Some(frame) => {
                        if let Err(e) = framed.send(frame).await {
                            tracing::warn!(fehler = %e, "Senden zum Relay fehlgeschlagen");
                            break;
                        }
                    }
                    None => break,
                }
            }

            eingehend = framed.next() => {
                match eingehend {
                    Some(Ok(bytes)) => nachricht_routen(&bytes, &wartende, &eingehend_tx).await,
                    Some(Err(e)) => {
                        tracing::warn!(fehler = %e, "Frame-Lesefehler vom Relay");
                        break;
                    }
                    None => {
                        tracing::info!("Relay hat die Verbindung geschlossen");
                        break;
                    }
                }
            }
        }
    }

    // Wartende Anfragen scheitern mit VerbindungGeschlossen (oneshot-Drop)
    wartende_sperren(&wartende).clear();
}

/// Ordnet ein eingehendes Frame zu: Antwort (hat `code`) oder Envelope
async fn nachricht_routen(bytes: &[u8], wartende: &Wartende, eingehend_tx: &mpsc::Sender<Envelope>) {
    let wert: Value = match serde_json::from_slice(bytes) {
        Ok(wert) => wert,
        Err(e) => {
            tracing::warn!(fehler = %e, "Unparsbares Frame vom Relay verworfen");
            return;
        }
    };

    if wert.get("code").is_some() {
        let antwort: Antwort = match serde_json::from_value(wert) {
            Ok(antwort) => antwort,
            Err(e) => {
                tracing::warn!(fehler = %e, "Kaputte Antwort vom Relay verworfen");
                return;
            }
        };

        match antwort.id.clone() {
            Some(id) => {
                let warter = wartende_sperren(wartende).remove(&id);
                match warter {
                    Some(tx) => {
                        let _ = tx.send(antwort);
                    }
                    None => {
                        tracing::debug!(id = %id, "Antwort ohne wartende Anfrage");
                    }
                }
            }
            None => {
                // Unkorrelierte Fehler (z.B. 404 nach fire-and-forget)
                tracing::debug!(code = antwort.code, message = %antwort.message, "Unkorrelierte Antwort");
            }
        }
        return;
    }

    match serde_json::from_value::<Envelope>(wert) {
        Ok(envelope) => {
            if eingehend_tx.send(envelope).await.is_err() {
                tracing::debug!("Eingangs-Strom geschlossen, Envelope verworfen");
            }
        }
        Err(e) => {
            tracing::warn!(fehler = %e, "Unbekanntes Frame vom Relay verworfen");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
