//! Peer-Session: Aushandlung und Pipeline-Anbindung fuer ein Peer-Paar
//!
//! Jede Session durchlaeuft eine Seite dieses Zustandsautomaten:
//!
//! ```text
//! Anbietende Seite              Antwortende Seite
//!
//! Neu                           Neu
//!  | offerte_erstellen           | offerte_verarbeiten
//!  v                             v
//! OfferteGesendet               OfferteEmpfangen
//!  | antwort_verarbeiten         | (Geheimnis sofort, Salt selbst erzeugt)
//!  v                             v
//! GeheimnisAusstehend           GeheimnisAusstehend
//!  v                             v
//! Etabliert                     Etabliert
//! ```
//!
//! Ordnungsgarantien:
//! - Das Geheimnis steht bevor irgendeine Pipeline gebunden wird.
//! - Die Remote-Beschreibung ist gesetzt bevor gepufferte Kandidaten
//!   angewendet werden; der Puffer wird genau einmal geleert, in
//!   Ankunftsreihenfolge.
//! - Spuren die vor dem Geheimnis angehaengt werden warten gepuffert und
//!   werden bei der Etablierung gebunden.

use hideaway_crypto::{
    CipherJob, CipherOp, CipherWorker, KeyAgreement, SecretBytes, base64_dekodieren_32,
    base64_kodieren,
};
use hideaway_protocol::{AnswerPayload, OfferPayload, TrackArt};
use serde_json::Value;

use crate::error::{SessionError, SessionResult};
use crate::transport::{PeerTransport, SpurStrom};

/// Zustand einer Peer-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerZustand {
    Neu,
    OfferteGesendet,
    OfferteEmpfangen,
    GeheimnisAusstehend,
    Etabliert,
    Geschlossen,
}

/// Eine Seite der Aushandlung mit genau einem Peer
pub struct PeerSession {
    peer_name: String,
    lokaler_name: String,
    zustand: PeerZustand,
    aushandlung: KeyAgreement,
    transport: Box<dyn PeerTransport>,
    worker: CipherWorker,
    geheimnis: Option<SecretBytes>,
    remote_gesetzt: bool,
    wartende_kandidaten: Vec<Value>,
    wartende_sende_spuren: Vec<SpurStrom>,
    wartende_empfangs_spuren: Vec<SpurStrom>,
}

impl PeerSession {
    /// Erstellt eine neue Session mit frischem ephemerem Schluesselpaar
    pub fn neu(
        lokaler_name: &str,
        peer_name: &str,
        transport: Box<dyn PeerTransport>,
        worker: CipherWorker,
    ) -> Self {
        Self {
            peer_name: peer_name.to_string(),
            lokaler_name: lokaler_name.to_string(),
            zustand: PeerZustand::Neu,
            aushandlung: KeyAgreement::neu(),
            transport,
            worker,
            geheimnis: None,
            remote_gesetzt: false,
            wartende_kandidaten: Vec::new(),
            wartende_sende_spuren: Vec::new(),
            wartende_empfangs_spuren: Vec::new(),
        }
    }

    /// Name der Gegenseite
    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    /// Aktueller Zustand
    pub fn zustand(&self) -> PeerZustand {
        self.zustand
    }

    /// true sobald das Paar-Geheimnis steht und Pipelines gebunden sind
    pub fn ist_etabliert(&self) -> bool {
        self.zustand == PeerZustand::Etabliert
    }

    // -----------------------------------------------------------------------
    // Aushandlung
    // -----------------------------------------------------------------------

    /// Anbietende Seite: baut die Offerte fuer die Gegenseite
    pub async fn offerte_erstellen(&mut self) -> SessionResult<OfferPayload> {
        self.zustand_pruefen(PeerZustand::Neu)?;

        let offer = self.transport.offerte_erstellen().await?;
        self.zustand = PeerZustand::OfferteGesendet;

        Ok(OfferPayload {
            offer,
            pub_key: self.aushandlung.public_key_base64(),
            to: self.peer_name.clone(),
            from: None,
        })
    }

    /// Antwortende Seite: verarbeitet eine Offerte und baut die Antwort
    ///
    /// Das Geheimnis wird sofort berechnet; der dabei erzeugte Salt reist
    /// in der Antwort zur Gegenseite.
    pub async fn offerte_verarbeiten(
        &mut self,
        offer: Value,
        remote_pub: &str,
    ) -> SessionResult<AnswerPayload> {
        self.zustand_pruefen(PeerZustand::Neu)?;
        self.zustand = PeerZustand::OfferteEmpfangen;

        let remote_pub = base64_dekodieren_32(remote_pub)?;

        self.zustand = PeerZustand::GeheimnisAusstehend;
        let abgeleitet = self.aushandlung.geheimnis_berechnen(
            &remote_pub,
            &self.lokaler_name,
            &self.peer_name,
            None,
        )?;
        let salt = abgeleitet.salt;

        self.remote_beschreibung_setzen(offer).await?;
        let answer = self.transport.antwort_erstellen().await?;

        self.etablieren(abgeleitet.schluessel).await?;

        Ok(AnswerPayload {
            answer,
            pub_key: self.aushandlung.public_key_base64(),
            salt: base64_kodieren(&salt),
            to: self.peer_name.clone(),
            from: None,
        })
    }

    /// Anbietende Seite: verarbeitet die Antwort der Gegenseite
    pub async fn antwort_verarbeiten(
        &mut self,
        answer: Value,
        remote_pub: &str,
        salt: &str,
    ) -> SessionResult<()> {
        self.zustand_pruefen(PeerZustand::OfferteGesendet)?;

        let remote_pub = base64_dekodieren_32(remote_pub)?;
        let salt = base64_dekodieren_32(salt)?;

        self.zustand = PeerZustand::GeheimnisAusstehend;
        let abgeleitet = self.aushandlung.geheimnis_berechnen(
            &remote_pub,
            &self.lokaler_name,
            &self.peer_name,
            Some(salt),
        )?;

        self.remote_beschreibung_setzen(answer).await?;
        self.etablieren(abgeleitet.schluessel).await
    }

    /// Wendet einen Kandidaten an oder puffert ihn bis zur Remote-Beschreibung
    pub async fn kandidat_verarbeiten(&mut self, kandidat: Value) -> SessionResult<()> {
        if self.zustand == PeerZustand::Geschlossen {
            return Err(SessionError::Protokoll(format!(
                "Session mit {} ist geschlossen",
                self.peer_name
            )));
        }

        if self.remote_gesetzt {
            self.transport.kandidat_anwenden(kandidat).await
        } else {
            self.wartende_kandidaten.push(kandidat);
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Spuren und Pipelines
    // -----------------------------------------------------------------------

    /// Haengt eine ausgehende Spur an
    ///
    /// Steht das Geheimnis noch nicht, wartet der Strom gepuffert und wird
    /// bei der Etablierung an die Verschluesselungs-Pipeline gebunden.
    pub async fn spur_anbinden(&mut self, art: TrackArt) -> SessionResult<()> {
        let strom = self.transport.spur_hinzufuegen(art).await?;

        if self.geheimnis.is_some() {
            self.pipeline_binden(CipherOp::Verschluesseln, strom).await
        } else {
            self.wartende_sende_spuren.push(strom);
            Ok(())
        }
    }

    /// Nimmt eine eingehende Spur der Gegenseite entgegen
    pub async fn eingehende_spur(&mut self, strom: SpurStrom) -> SessionResult<()> {
        if self.geheimnis.is_some() {
            self.pipeline_binden(CipherOp::Entschluesseln, strom).await
        } else {
            self.wartende_empfangs_spuren.push(strom);
            Ok(())
        }
    }

    /// Schliesst die Session; weitere Signale werden abgelehnt
    pub fn schliessen(&mut self) {
        self.zustand = PeerZustand::Geschlossen;
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    /// Setzt die Remote-Beschreibung und leert danach den Kandidaten-Puffer
    /// genau einmal, in Ankunftsreihenfolge
    async fn remote_beschreibung_setzen(&mut self, beschreibung: Value) -> SessionResult<()> {
        self.transport.remote_beschreibung_setzen(beschreibung).await?;
        self.remote_gesetzt = true;

        for kandidat in std::mem::take(&mut self.wartende_kandidaten) {
            self.transport.kandidat_anwenden(kandidat).await?;
        }
        Ok(())
    }

    /// Hinterlegt das Geheimnis und bindet alle wartenden Spuren
    async fn etablieren(&mut self, geheimnis: SecretBytes) -> SessionResult<()> {
        self.geheimnis = Some(geheimnis);

        for strom in std::mem::take(&mut self.wartende_sende_spuren) {
            self.pipeline_binden(CipherOp::Verschluesseln, strom).await?;
        }
        for strom in std::mem::take(&mut self.wartende_empfangs_spuren) {
            self.pipeline_binden(CipherOp::Entschluesseln, strom).await?;
        }

        self.zustand = PeerZustand::Etabliert;
        tracing::info!(peer = %self.peer_name, "Peer-Session etabliert");
        Ok(())
    }

    async fn pipeline_binden(&self, op: CipherOp, strom: SpurStrom) -> SessionResult<()> {
        let geheimnis = self
            .geheimnis
            .clone()
            .ok_or_else(|| SessionError::Protokoll("Pipeline ohne Geheimnis".to_string()))?;

        tracing::debug!(peer = %self.peer_name, art = %strom.art, op = ?op, "Pipeline gebunden");

        self.worker
            .einreichen(CipherJob {
                op,
                geheimnis,
                quelle: strom.quelle,
                senke: strom.senke,
            })
            .await?;
        Ok(())
    }

    fn zustand_pruefen(&self, erwartet: PeerZustand) -> SessionResult<()> {
        if self.zustand == erwartet {
            Ok(())
        } else {
            Err(SessionError::Protokoll(format!(
                "Signal passt nicht zum Zustand {:?} (Peer {})",
                self.zustand, self.peer_name
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PeerTransport;
    use async_trait::async_trait;
    use bytes::Bytes;
    use hideaway_crypto::CipherPool;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Transport-Attrappe: zeichnet Aufrufe auf, liefert feste Beschreibungen
    struct TestTransport {
        angewendete_kandidaten: Arc<Mutex<Vec<Value>>>,
        remote: Arc<Mutex<Option<Value>>>,
        spur_eingaben: Arc<Mutex<Vec<mpsc::Sender<Bytes>>>>,
        spur_ausgaben: Arc<Mutex<Vec<mpsc::Receiver<Bytes>>>>,
    }

    impl TestTransport {
        fn neu() -> Self {
            Self {
                angewendete_kandidaten: Arc::new(Mutex::new(Vec::new())),
                remote: Arc::new(Mutex::new(None)),
                spur_eingaben: Arc::new(Mutex::new(Vec::new())),
                spur_ausgaben: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl PeerTransport for TestTransport {
        async fn offerte_erstellen(&mut self) -> SessionResult<Value> {
            Ok(json!({"sdp": "offerte"}))
        }

        async fn antwort_erstellen(&mut self) -> SessionResult<Value> {
            Ok(json!({"sdp": "antwort"}))
        }

        async fn remote_beschreibung_setzen(&mut self, beschreibung: Value) -> SessionResult<()> {
            *self.remote.lock().unwrap() = Some(beschreibung);
            Ok(())
        }

        async fn kandidat_anwenden(&mut self, kandidat: Value) -> SessionResult<()> {
            self.angewendete_kandidaten.lock().unwrap().push(kandidat);
            Ok(())
        }

        async fn spur_hinzufuegen(&mut self, art: TrackArt) -> SessionResult<SpurStrom> {
            let (eingabe_tx, quelle) = mpsc::channel(8);
            let (senke, ausgabe_rx) = mpsc::channel(8);
            self.spur_eingaben.lock().unwrap().push(eingabe_tx);
            self.spur_ausgaben.lock().unwrap().push(ausgabe_rx);
            Ok(SpurStrom { art, quelle, senke })
        }
    }

    fn session_paar() -> (PeerSession, PeerSession, Arc<Mutex<Vec<Value>>>) {
        let pool = CipherPool::neu(1);

        let alice_transport = TestTransport::neu();
        let bob_transport = TestTransport::neu();
        let bob_kandidaten = Arc::clone(&bob_transport.angewendete_kandidaten);

        let alice = PeerSession::neu("alice", "bob", Box::new(alice_transport), pool.zuteilen());
        let bob = PeerSession::neu("bob", "alice", Box::new(bob_transport), pool.zuteilen());
        (alice, bob, bob_kandidaten)
    }

    #[tokio::test]
    async fn aushandlung_etabliert_beide_seiten() {
        let (mut alice, mut bob, _) = session_paar();

        let offerte = alice.offerte_erstellen().await.unwrap();
        assert_eq!(alice.zustand(), PeerZustand::OfferteGesendet);

        let antwort = bob
            .offerte_verarbeiten(offerte.offer, &offerte.pub_key)
            .await
            .unwrap();
        assert!(bob.ist_etabliert());

        alice
            .antwort_verarbeiten(antwort.answer, &antwort.pub_key, &antwort.salt)
            .await
            .unwrap();
        assert!(alice.ist_etabliert());
    }

    #[tokio::test]
    async fn kandidaten_warten_bis_remote_beschreibung() {
        let (mut alice, mut bob, bob_kandidaten) = session_paar();

        // Kandidaten treffen vor der Offerte ein
        bob.kandidat_verarbeiten(json!({"nr": 1})).await.unwrap();
        bob.kandidat_verarbeiten(json!({"nr": 2})).await.unwrap();
        assert!(bob_kandidaten.lock().unwrap().is_empty());

        let offerte = alice.offerte_erstellen().await.unwrap();
        bob.offerte_verarbeiten(offerte.offer, &offerte.pub_key)
            .await
            .unwrap();

        // Puffer in Ankunftsreihenfolge geleert
        {
            let angewendet = bob_kandidaten.lock().unwrap();
            assert_eq!(angewendet.as_slice(), &[json!({"nr": 1}), json!({"nr": 2})]);
        }

        // Spaetere Kandidaten gehen direkt durch
        bob.kandidat_verarbeiten(json!({"nr": 3})).await.unwrap();
        assert_eq!(bob_kandidaten.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn spur_vor_geheimnis_wird_bei_etablierung_gebunden() {
        let pool = CipherPool::neu(1);
        let transport = TestTransport::neu();
        let eingaben = Arc::clone(&transport.spur_eingaben);
        let ausgaben = Arc::clone(&transport.spur_ausgaben);

        let mut alice = PeerSession::neu("alice", "bob", Box::new(transport), pool.zuteilen());

        // Spur vor jeder Aushandlung anhaengen
        alice.spur_anbinden(TrackArt::Audio).await.unwrap();

        let bob_transport = TestTransport::neu();
        let mut bob = PeerSession::neu("bob", "alice", Box::new(bob_transport), pool.zuteilen());

        let offerte = alice.offerte_erstellen().await.unwrap();
        let antwort = bob
            .offerte_verarbeiten(offerte.offer, &offerte.pub_key)
            .await
            .unwrap();
        alice
            .antwort_verarbeiten(antwort.answer, &antwort.pub_key, &antwort.salt)
            .await
            .unwrap();

        // Klartext rein, Wire-Payload raus: Pipeline ist angebunden
        let eingabe = eingaben.lock().unwrap().remove(0);
        let mut ausgabe = ausgaben.lock().unwrap().remove(0);

        eingabe.send(Bytes::from_static(b"frame")).await.unwrap();
        let verschluesselt = ausgabe.recv().await.unwrap();
        assert_ne!(verschluesselt, Bytes::from_static(b"frame"));
        // nonce(16) + tag(16) + ciphertext
        assert_eq!(verschluesselt.len(), 32 + 5);
    }

    #[tokio::test]
    async fn antwort_im_falschen_zustand_ist_protokollfehler() {
        let (mut alice, _bob, _) = session_paar();

        let ergebnis = alice
            .antwort_verarbeiten(json!({}), "QQ==", "QQ==")
            .await;
        assert!(matches!(ergebnis, Err(SessionError::Protokoll(_))));
        assert_eq!(alice.zustand(), PeerZustand::Neu);
    }

    #[tokio::test]
    async fn geschlossene_session_lehnt_kandidaten_ab() {
        let (mut alice, _bob, _) = session_paar();

        alice.schliessen();
        let ergebnis = alice.kandidat_verarbeiten(json!({})).await;
        assert!(matches!(ergebnis, Err(SessionError::Protokoll(_))));
    }
}
