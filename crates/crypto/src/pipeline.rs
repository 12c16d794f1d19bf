//! Cipher-Worker-Pool fuer Frame-Stroeme
//!
//! Frame-Transformationen laufen nicht im Session-Task sondern in einem
//! Pool aus Worker-Tasks. Ein Auftrag ist ein kompletter Strom:
//! `{op, geheimnis, quelle, senke}` – der Worker zieht Frames aus der
//! Quelle, transformiert sie und schiebt sie in die Senke.
//!
//! ## Zuteilung
//! Die Zuteilung rotiert pro neuem Peer-Paar (nicht pro Frame). Alle
//! Pipelines eines Paares landen so beim selben Worker und die Reihenfolge
//! innerhalb einer Pipeline bleibt die des Stroms.
//!
//! ## Fehlerverhalten
//! Ein Frame das die Tag-Pruefung nicht besteht wird verworfen und nur
//! geloggt – der Strom und die Session laufen weiter.

use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::error::{CryptoError, CryptoResult};
use crate::frame_cipher::{frame_entschluesseln, frame_verschluesseln};
use crate::types::SecretBytes;

/// Groesse der Auftrags-Queue pro Worker
const AUFTRAGS_QUEUE_GROESSE: usize = 16;

/// Richtung einer Frame-Pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherOp {
    /// Ausgehende Frames: Klartext rein, Wire-Payload raus
    Verschluesseln,
    /// Eingehende Frames: Wire-Payload rein, Klartext raus
    Entschluesseln,
}

/// Ein kompletter Pipeline-Auftrag fuer einen Worker
pub struct CipherJob {
    pub op: CipherOp,
    pub geheimnis: SecretBytes,
    /// Eingehender Frame-Strom (Eigentum wandert zum Worker)
    pub quelle: mpsc::Receiver<Bytes>,
    /// Ausgehender Frame-Strom
    pub senke: mpsc::Sender<Bytes>,
}

/// Handle auf einen Worker des Pools
///
/// Wird einem Peer-Paar bei der Erstellung zugeteilt; alle Pipelines des
/// Paares werden ueber dieses Handle eingereicht.
#[derive(Clone)]
pub struct CipherWorker {
    auftraege: mpsc::Sender<CipherJob>,
}

impl CipherWorker {
    /// Reicht eine Pipeline beim Worker ein
    pub async fn einreichen(&self, job: CipherJob) -> CryptoResult<()> {
        self.auftraege
            .send(job)
            .await
            .map_err(|_| CryptoError::WorkerBeendet)
    }
}

/// Pool aus Cipher-Workern, dimensioniert nach verfuegbarer Parallelitaet
pub struct CipherPool {
    arbeiter: Vec<mpsc::Sender<CipherJob>>,
    naechster: Arc<AtomicUsize>,
}

impl CipherPool {
    /// Erstellt einen Pool mit `anzahl` Workern
    pub fn neu(anzahl: usize) -> Self {
        let anzahl = anzahl.max(1);
        let mut arbeiter = Vec::with_capacity(anzahl);

        for index in 0..anzahl {
            let (tx, rx) = mpsc::channel(AUFTRAGS_QUEUE_GROESSE);
            tokio::spawn(arbeiter_schleife(index, rx));
            arbeiter.push(tx);
        }

        Self {
            arbeiter,
            naechster: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Erstellt einen Pool in der Groesse der verfuegbaren Parallelitaet
    pub fn standard() -> Self {
        let anzahl = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::neu(anzahl)
    }

    /// Teilt den naechsten Worker zu (Round-Robin pro Peer-Paar)
    pub fn zuteilen(&self) -> CipherWorker {
        let index = self.naechster.fetch_add(1, Ordering::Relaxed) % self.arbeiter.len();
        CipherWorker {
            auftraege: self.arbeiter[index].clone(),
        }
    }

    /// Anzahl der Worker im Pool
    pub fn groesse(&self) -> usize {
        self.arbeiter.len()
    }
}

/// Haupt-Schleife eines Workers: nimmt Auftraege an und faehrt die
/// Pipelines als Subtasks bis Quelle oder Senke schliessen
async fn arbeiter_schleife(index: usize, mut auftraege: mpsc::Receiver<CipherJob>) {
    let mut pipelines = JoinSet::new();

    loop {
        tokio::select! {
            auftrag = auftraege.recv() => {
                match auftrag {
                    Some(job) => {
                        tracing::debug!(worker = index, op = ?job.op, "Pipeline uebernommen");
                        pipelines.spawn(pipeline_fahren(job));
                    }
                    None => break,
                }
            }
            Some(_) = pipelines.join_next(), if !pipelines.is_empty() => {}
        }
    }

    // Pool weg – laufende Pipelines noch zu Ende fahren
    while pipelines.join_next().await.is_some() {}
    tracing::debug!(worker = index, "Cipher-Worker beendet");
}

/// Faehrt eine einzelne Pipeline: Frame ziehen, transformieren, weiterreichen
async fn pipeline_fahren(mut job: CipherJob) {
    while let Some(frame) = job.quelle.recv().await {
        let ergebnis = match job.op {
            CipherOp::Verschluesseln => frame_verschluesseln(&job.geheimnis, &frame),
            CipherOp::Entschluesseln => frame_entschluesseln(&job.geheimnis, &frame),
        };

        match ergebnis {
            Ok(transformiert) => {
                if job.senke.send(Bytes::from(transformiert)).await.is_err() {
                    // Empfaenger weg, Pipeline beenden
                    break;
                }
            }
            Err(e) => {
                // Einzelnes kaputtes Frame verwerfen, Strom laeuft weiter
                tracing::debug!(op = ?job.op, fehler = %e, "Frame verworfen");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_geheimnis() -> SecretBytes {
        SecretBytes::new(vec![0x11u8; 32])
    }

    #[tokio::test]
    async fn pipeline_roundtrip_ueber_worker() {
        let pool = CipherPool::neu(2);
        let worker = pool.zuteilen();

        // Klartext -> verschluesseln -> Draht -> entschluesseln -> Klartext
        let (klar_tx, klar_rx) = mpsc::channel(8);
        let (draht_tx, draht_rx) = mpsc::channel(8);
        let (ausgabe_tx, mut ausgabe_rx) = mpsc::channel(8);

        worker
            .einreichen(CipherJob {
                op: CipherOp::Verschluesseln,
                geheimnis: test_geheimnis(),
                quelle: klar_rx,
                senke: draht_tx,
            })
            .await
            .unwrap();

        worker
            .einreichen(CipherJob {
                op: CipherOp::Entschluesseln,
                geheimnis: test_geheimnis(),
                quelle: draht_rx,
                senke: ausgabe_tx,
            })
            .await
            .unwrap();

        for i in 0u8..5 {
            klar_tx.send(Bytes::from(vec![i; 24])).await.unwrap();
        }
        drop(klar_tx);

        // Reihenfolge innerhalb der Pipeline bleibt erhalten
        for i in 0u8..5 {
            let frame = ausgabe_rx.recv().await.unwrap();
            assert_eq!(frame, Bytes::from(vec![i; 24]));
        }
    }

    #[tokio::test]
    async fn kaputtes_frame_wird_verworfen_strom_laeuft_weiter() {
        let pool = CipherPool::neu(1);
        let worker = pool.zuteilen();

        let (draht_tx, draht_rx) = mpsc::channel(8);
        let (ausgabe_tx, mut ausgabe_rx) = mpsc::channel(8);

        worker
            .einreichen(CipherJob {
                op: CipherOp::Entschluesseln,
                geheimnis: test_geheimnis(),
                quelle: draht_rx,
                senke: ausgabe_tx,
            })
            .await
            .unwrap();

        // Muell zuerst, dann ein echtes Frame
        draht_tx.send(Bytes::from_static(&[0u8; 40])).await.unwrap();
        let gueltig = frame_verschluesseln(&test_geheimnis(), b"echtes Frame").unwrap();
        draht_tx.send(Bytes::from(gueltig)).await.unwrap();
        drop(draht_tx);

        let frame = ausgabe_rx.recv().await.unwrap();
        assert_eq!(frame, Bytes::from_static(b"echtes Frame"));
        assert!(ausgabe_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn zuteilung_rotiert_round_robin() {
        let pool = CipherPool::neu(3);
        assert_eq!(pool.groesse(), 3);

        let handles: Vec<CipherWorker> = (0..6).map(|_| pool.zuteilen()).collect();

        // Die ersten drei Zuteilungen treffen drei verschiedene Worker
        assert!(!handles[0].auftraege.same_channel(&handles[1].auftraege));
        assert!(!handles[0].auftraege.same_channel(&handles[2].auftraege));
        assert!(!handles[1].auftraege.same_channel(&handles[2].auftraege));

        // Danach beginnt die Runde von vorn
        for (erste, zweite) in handles.iter().zip(&handles[3..]) {
            assert!(erste.auftraege.same_channel(&zweite.auftraege));
        }
    }

    #[tokio::test]
    async fn pool_mit_null_workern_wird_auf_einen_angehoben() {
        let pool = CipherPool::neu(0);
        assert_eq!(pool.groesse(), 1);
        assert!(pool
            .zuteilen()
            .auftraege
            .same_channel(&pool.zuteilen().auftraege));
    }
}
