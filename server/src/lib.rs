//! hideaway-server – Bibliotheks-Root
//!
//! Deklariert die Daemon-Module und stellt den Einstiegspunkt fuer
//! Integrationstests bereit.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use hideaway_relay::RelayServer;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet das Relay und laeuft bis zum Shutdown-Signal
    pub async fn starten(self) -> Result<()> {
        let bind_adresse: std::net::SocketAddr = self
            .config
            .bind_adresse()
            .parse()
            .map_err(|e| anyhow::anyhow!("Bind-Adresse ungueltig: {e}"))?;

        tracing::info!(adresse = %bind_adresse, "Server startet");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let relay = RelayServer::neu(bind_adresse, self.config.relay_config());

        let relay_task = tokio::spawn(relay.starten(shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        let _ = shutdown_tx.send(true);
        relay_task.await??;

        Ok(())
    }
}
