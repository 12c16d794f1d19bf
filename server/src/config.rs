//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Daemon ohne Konfigurationsdatei
//! lauffaehig ist.

use hideaway_relay::RelayConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ServerConfig {
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Relay-Einstellungen
    pub relay: RelayEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer den Relay-Listener
    pub bind_adresse: String,
    /// Port fuer den Relay-Listener
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 9000,
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    /// Zeitfenster fuer das erste Frame (start/join) in Sekunden
    pub handshake_fenster_sekunden: u64,
    /// Kapazitaet der Sende-Queue pro Mitglied
    pub sende_queue: usize,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_bytes: usize,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        let standard = RelayConfig::default();
        Self {
            handshake_fenster_sekunden: standard.handshake_fenster.as_secs(),
            sende_queue: standard.sende_queue,
            max_frame_bytes: standard.max_frame_bytes,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer den Relay-Listener zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    /// Baut die Laufzeit-Konfiguration des Relays
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            handshake_fenster: Duration::from_secs(self.relay.handshake_fenster_sekunden),
            sende_queue: self.relay.sende_queue,
            max_frame_bytes: self.relay.max_frame_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.netzwerk.port, 9000);
        assert_eq!(cfg.relay.handshake_fenster_sekunden, 30);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.bind_adresse(), "0.0.0.0:9000");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [netzwerk]
            port = 9443

            [relay]
            handshake_fenster_sekunden = 10
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.netzwerk.port, 9443);
        assert_eq!(cfg.relay.handshake_fenster_sekunden, 10);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.relay.sende_queue, 64);
        assert_eq!(cfg.netzwerk.bind_adresse, "0.0.0.0");
    }

    #[test]
    fn relay_config_uebernimmt_werte() {
        let mut cfg = ServerConfig::default();
        cfg.relay.handshake_fenster_sekunden = 5;
        let relay = cfg.relay_config();
        assert_eq!(relay.handshake_fenster, Duration::from_secs(5));
    }
}
