//! TCP-Server: Accept-Loop und Konfiguration
//!
//! Der Server bindet einen Listener und spawnt pro eingehender Verbindung
//! einen [`ClientConnection`]-Task. Ein `watch`-Kanal traegt das
//! Shutdown-Signal an alle laufenden Verbindungen.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::connection::ClientConnection;
use crate::error::RelayResult;
use crate::room::RaumRegistry;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Laufzeit-Konfiguration des Relay-Servers
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Zeitfenster in dem das erste Frame (start/join) eintreffen muss
    pub handshake_fenster: Duration,

    /// Kapazitaet der Sende-Queue pro Mitglied
    pub sende_queue: usize,

    /// Maximale Frame-Groesse in Bytes
    pub max_frame_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            handshake_fenster: Duration::from_secs(30),
            sende_queue: 64,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// RelayServer
// ---------------------------------------------------------------------------

/// Der Relay-Server: Listener plus geteilte Raum-Registry
pub struct RelayServer {
    registry: Arc<RaumRegistry>,
    config: Arc<RelayConfig>,
    bind_addr: SocketAddr,
}

impl RelayServer {
    /// Erstellt einen neuen Server mit leerer Registry
    pub fn neu(bind_addr: SocketAddr, config: RelayConfig) -> Self {
        Self {
            registry: Arc::new(RaumRegistry::neu()),
            config: Arc::new(config),
            bind_addr,
        }
    }

    /// Geteilte Raum-Registry (fuer Introspektion in Tests)
    pub fn registry(&self) -> Arc<RaumRegistry> {
        Arc::clone(&self.registry)
    }

    /// Bindet den Listener und startet die Accept-Loop
    ///
    /// Laeuft bis `shutdown_rx` auf `true` wechselt.
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> RelayResult<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        tracing::info!(adresse = %self.bind_addr, "Relay-Server gestartet");
        self.starten_auf(listener, shutdown_rx).await
    }

    /// Accept-Loop auf einem bereits gebundenen Listener
    ///
    /// Tests binden Port 0 und reichen den Listener hier herein.
    pub async fn starten_auf(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> RelayResult<()> {
        loop {
            tokio::select! {
                eingehend = listener.accept() => {
                    match eingehend {
                        Ok((stream, peer_addr)) => {
                            let verbindung = ClientConnection::neu(
                                Arc::clone(&self.registry),
                                Arc::clone(&self.config),
                                peer_addr,
                            );
                            tokio::spawn(verbindung.verarbeiten(stream, shutdown_rx.clone()));
                        }
                        Err(e) => {
                            tracing::warn!(fehler = %e, "Accept fehlgeschlagen");
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Shutdown-Signal – Accept-Loop beendet");
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_hat_sinnvolle_werte() {
        let config = RelayConfig::default();
        assert_eq!(config.handshake_fenster, Duration::from_secs(30));
        assert_eq!(config.sende_queue, 64);
        assert_eq!(config.max_frame_bytes, 1024 * 1024);
    }
}
