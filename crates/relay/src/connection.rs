//! Client-Verbindung – verwaltet eine einzelne TCP-Verbindung zum Relay
//!
//! Jede Verbindung laeuft in einem eigenen tokio-Task und durchlaeuft zwei
//! Phasen:
//!
//! ```text
//! Handshake (erstes Frame, Zeitfenster begrenzt)
//!     start -> Raum erstellen, Ersteller wird einziges Mitglied
//!     join  -> Passwort pruefen, Mitglied registrieren
//!     alles andere / kaputtes JSON -> 400, Verbindung zu
//!
//! Relay-Phase (langlebig)
//!     candidate | offer | answer -> weiterleiten, data.from stempeln
//!     unbekannter Typ            -> 405, Verbindung bleibt offen
//!     kaputtes JSON              -> 400, Verbindung bleibt offen
//! ```
//!
//! Das Passwort-Hashing laeuft auf `spawn_blocking`; der Verbindungs-Task
//! selbst blockiert nie laenger als ein Frame braucht.

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hideaway_protocol::{
    Antwort, Envelope, FrameCodec, JoinRequest, JoinResponse, SignalKind, StartRequest,
    StartResponse, als_frame, code,
};
use serde_json::Value;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use crate::auth::{langsamer_hash, salt_erzeugen};
use crate::error::{RelayError, RelayResult};
use crate::room::{Raum, RaumRegistry};
use crate::server::RelayConfig;

/// Ergebnis eines erfolgreichen Handshakes
struct Registriert {
    raum: Arc<Raum>,
    name: String,
    /// Queue ueber die andere Verbindungen Frames an diese schicken
    empfang_rx: mpsc::Receiver<Bytes>,
}

/// Verarbeitet eine einzelne TCP-Verbindung
pub struct ClientConnection {
    registry: Arc<RaumRegistry>,
    config: Arc<RelayConfig>,
    peer_addr: SocketAddr,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(registry: Arc<RaumRegistry>, config: Arc<RelayConfig>, peer_addr: SocketAddr) -> Self {
        Self {
            registry,
            config,
            peer_addr,
        }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal
    /// eingeht. Fehler dieser Verbindung beruehren keine anderen.
    pub async fn verarbeiten(self, stream: TcpStream, mut shutdown_rx: watch::Receiver<bool>) {
        let peer_addr = self.peer_addr;
        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let mut framed = Framed::new(
            stream,
            FrameCodec::with_max_size(self.config.max_frame_bytes),
        );

        let mut registriert = match self.handshake(&mut framed).await {
            Some(r) => r,
            None => {
                tracing::info!(peer = %peer_addr, "Verbindung ohne Handshake beendet");
                return;
            }
        };

        self.relay_phase(&mut framed, &mut registriert, &mut shutdown_rx)
            .await;

        // Cleanup: Mitglied austragen, leeren Raum einsammeln
        registriert.raum.mitglied_entfernen(&registriert.name);
        if self.registry.entfernen_wenn_leer(registriert.raum.id.as_str()) {
            tracing::info!(chat = %registriert.raum.id, "Leerer Raum entfernt");
        }

        tracing::info!(
            peer = %peer_addr,
            name = %registriert.name,
            "Verbindungs-Task beendet"
        );
    }

    // -----------------------------------------------------------------------
    // Handshake-Phase
    // -----------------------------------------------------------------------

    /// Liest und verarbeitet das erste Frame (muss start oder join sein)
    async fn handshake(&self, framed: &mut Framed<TcpStream, FrameCodec>) -> Option<Registriert> {
        let frame = tokio::time::timeout(self.config.handshake_fenster, framed.next()).await;

        let bytes = match frame {
            Err(_) => {
                tracing::warn!(peer = %self.peer_addr, "Handshake-Zeitfenster abgelaufen");
                return None;
            }
            Ok(None) => return None,
            Ok(Some(Err(e))) => {
                tracing::warn!(peer = %self.peer_addr, fehler = %e, "Frame-Lesefehler im Handshake");
                return None;
            }
            Ok(Some(Ok(bytes))) => bytes,
        };

        let envelope = match Envelope::parsen(&bytes) {
            Ok(env) => env,
            Err(_) => {
                let antwort = Antwort::fehler(code::UNGUELTIGE_ANFRAGE, "Invalid message", None);
                let _ = antwort_senden(framed, &antwort).await;
                return None;
            }
        };

        let anfrage_id = envelope.id.clone();

        let ergebnis = match envelope.kind() {
            Some(SignalKind::Start) => self.start_verarbeiten(envelope).await,
            Some(SignalKind::Join) => self.join_verarbeiten(envelope).await,
            _ => Err(RelayError::UngueltigeAnfrage(
                "Expected start or join request".to_string(),
            )),
        };

        match ergebnis {
            Ok((registriert, daten)) => {
                let antwort = Antwort::ok(Some(daten), anfrage_id);
                if antwort_senden(framed, &antwort).await.is_err() {
                    // Antwort nicht zustellbar – Mitglied gleich wieder austragen
                    registriert.raum.mitglied_entfernen(&registriert.name);
                    self.registry
                        .entfernen_wenn_leer(registriert.raum.id.as_str());
                    return None;
                }
                Some(registriert)
            }
            Err(fehler) => {
                tracing::debug!(peer = %self.peer_addr, fehler = %fehler, "Handshake abgelehnt");
                let _ = antwort_senden(framed, &fehler.als_antwort(anfrage_id)).await;
                None
            }
        }
    }

    /// `start`: Raum unter frischer ID erstellen, Ersteller registrieren
    async fn start_verarbeiten(&self, envelope: Envelope) -> RelayResult<(Registriert, Value)> {
        let anfrage: StartRequest = serde_json::from_value(envelope.data)
            .map_err(|_| RelayError::UngueltigeAnfrage("Invalid message".to_string()))?;

        let salt = salt_erzeugen();
        let passwort = anfrage.password;
        let hash_aufgabe =
            tokio::task::spawn_blocking(move || langsamer_hash(passwort.as_bytes(), &salt));

        // ID-Suche laeuft waehrend argon2 auf dem Blocking-Pool rechnet;
        // bis der Hash gesetzt ist, lehnt der Raum jeden Join ab
        let raum = self.registry.raum_erstellen(salt)?;

        let hash = match hash_aufgabe.await {
            Ok(Ok(hash)) => hash,
            Ok(Err(fehler)) => {
                self.registry.entfernen_wenn_leer(raum.id.as_str());
                return Err(fehler);
            }
            Err(e) => {
                self.registry.entfernen_wenn_leer(raum.id.as_str());
                return Err(RelayError::intern(e.to_string()));
            }
        };
        raum.passwort_setzen(hash);

        let (sende_tx, empfang_rx) = mpsc::channel(self.config.sende_queue);
        raum.mitglied_registrieren(&anfrage.name, sende_tx)?;

        tracing::info!(chat = %raum.id, name = %anfrage.name, "Raum erstellt");

        let daten = serde_json::to_value(StartResponse {
            chat_id: raum.id.clone(),
        })
        .map_err(|e| RelayError::intern(e.to_string()))?;

        Ok((
            Registriert {
                raum,
                name: anfrage.name,
                empfang_rx,
            },
            daten,
        ))
    }

    /// `join`: Raum suchen, Namen und Passwort pruefen, registrieren
    ///
    /// Die billigen Pruefungen (Raum, Name) laufen vor dem teuren Hash.
    async fn join_verarbeiten(&self, envelope: Envelope) -> RelayResult<(Registriert, Value)> {
        let anfrage: JoinRequest = serde_json::from_value(envelope.data)
            .map_err(|_| RelayError::UngueltigeAnfrage("Invalid message".to_string()))?;

        let raum = self
            .registry
            .holen(anfrage.chat_id.as_str())
            .ok_or_else(|| RelayError::NichtGefunden("Chat not found".to_string()))?;

        if raum.mitglied_existiert(&anfrage.name) {
            return Err(RelayError::NameVergeben(anfrage.name));
        }

        let salt = *raum.salt();
        let passwort = anfrage.password;
        let hash = tokio::task::spawn_blocking(move || langsamer_hash(passwort.as_bytes(), &salt))
            .await
            .map_err(|e| RelayError::intern(e.to_string()))??;

        if !raum.passwort_pruefen(&hash) {
            return Err(RelayError::Unautorisiert);
        }

        let (sende_tx, empfang_rx) = mpsc::channel(self.config.sende_queue);
        // Ueber die Registry: faengt den Fall ab, dass der Raum waehrend
        // des Hashens leer wurde und eingesammelt worden ist
        self.registry
            .mitglied_registrieren(&raum, &anfrage.name, sende_tx)?;

        let mitglieder = raum.mitglieder_ausser(&anfrage.name);
        tracing::info!(
            chat = %raum.id,
            name = %anfrage.name,
            mitglieder = mitglieder.len(),
            "Mitglied beigetreten"
        );

        let daten = serde_json::to_value(JoinResponse { members: mitglieder })
            .map_err(|e| RelayError::intern(e.to_string()))?;

        Ok((
            Registriert {
                raum,
                name: anfrage.name,
                empfang_rx,
            },
            daten,
        ))
    }

    // -----------------------------------------------------------------------
    // Relay-Phase
    // -----------------------------------------------------------------------

    /// Langlebige Schleife: eingehende Frames weiterleiten, Queue leeren
    async fn relay_phase(
        &self,
        framed: &mut Framed<TcpStream, FrameCodec>,
        registriert: &mut Registriert,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                frame = framed.next() => {
                    match frame {
                        Some(Ok(bytes)) => {
                            let antwort = self.nachricht_verarbeiten(
                                &registriert.raum,
                                &registriert.name,
                                &bytes,
                            );
                            if let Some(antwort) = antwort {
                                if antwort_senden(framed, &antwort).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %self.peer_addr, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %self.peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                ausgehend = registriert.empfang_rx.recv() => {
                    match ausgehend {
                        Some(frame) => {
                            if let Err(e) = framed.send(frame).await {
                                tracing::warn!(peer = %self.peer_addr, fehler = %e, "Senden fehlgeschlagen");
                                break;
                            }
                        }
                        None => break,
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %self.peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }
    }

    /// Verarbeitet ein Frame der Relay-Phase; `Some` ist eine Antwort an
    /// den Absender, `None` heisst erfolgreich weitergeleitet
    fn nachricht_verarbeiten(&self, raum: &Raum, absender: &str, bytes: &[u8]) -> Option<Antwort> {
        let envelope = match Envelope::parsen(bytes) {
            Ok(env) => env,
            // Kaputtes JSON ist hier nicht-fatal
            Err(_) => return Some(Antwort::fehler(code::UNGUELTIGE_ANFRAGE, "Invalid message", None)),
        };

        match envelope.kind() {
            Some(kind) if kind.ist_relay_phase() => self.weiterleiten(raum, absender, envelope),
            _ => Some(Antwort::fehler(
                code::NICHT_ERLAUBT,
                "Invalid message type",
                envelope.id,
            )),
        }
    }

    /// Stempelt `data.from` und reicht das Envelope an den Empfaenger weiter
    fn weiterleiten(&self, raum: &Raum, absender: &str, mut envelope: Envelope) -> Option<Antwort> {
        let anfrage_id = envelope.id.clone();

        let empfaenger_name = match envelope.data.get("to").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => {
                return Some(
                    RelayError::NichtGefunden("Member not found".to_string())
                        .als_antwort(anfrage_id),
                );
            }
        };

        let empfaenger = match raum.mitglied_holen(&empfaenger_name) {
            Some(sender) => sender,
            None => {
                return Some(
                    RelayError::NichtGefunden("Member not found".to_string())
                        .als_antwort(anfrage_id),
                );
            }
        };

        // Absender stempeln, Envelope sonst unveraendert lassen
        if let Some(obj) = envelope.data.as_object_mut() {
            obj.insert("from".to_string(), Value::String(absender.to_string()));
        }

        let frame = match als_frame(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(fehler = %e, "Envelope nicht serialisierbar");
                return Some(Antwort::fehler(
                    code::INTERNER_FEHLER,
                    "Internal Server Error",
                    anfrage_id,
                ));
            }
        };

        match empfaenger.try_send(frame) {
            Ok(()) => None,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Voll heisst: Empfaenger kommt nicht hinterher – verwerfen
                tracing::warn!(
                    empfaenger = %empfaenger_name,
                    chat = %raum.id,
                    "Sende-Queue voll – Envelope verworfen"
                );
                None
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Some(
                RelayError::NichtGefunden("Member not found".to_string()).als_antwort(anfrage_id),
            ),
        }
    }
}

/// Serialisiert und sendet eine Antwort auf der Verbindung
async fn antwort_senden(
    framed: &mut Framed<TcpStream, FrameCodec>,
    antwort: &Antwort,
) -> io::Result<()> {
    let frame = als_frame(antwort)?;
    framed.send(frame).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
