//! Bot-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte; Zugangsdaten koennen per Umgebungsvariable gesetzt
//! werden und haben dann Vorrang vor der Datei.

use std::time::Duration;

use anyhow::bail;
use bbbot_observability::{log_format_gueltig, log_level_gueltig};
use bbbot_realtime::ConnectionConfig;
use bbbot_session::ClientConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Bot-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// BBB-Server (REST-API und HTML5-Client)
    pub bbb: BbbEinstellungen,
    /// Meeting und Anzeigename des Bots
    pub bot: BotEinstellungen,
    /// Echtzeit-Verbindung
    pub verbindung: VerbindungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BbbEinstellungen {
    pub api: ApiEinstellungen,
    pub client: ClientEinstellungen,
}

/// REST-API des BBB-Servers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiEinstellungen {
    /// Basis-URL, z.B. `https://bbb.example/bigbluebutton/`
    pub url: String,
    /// Shared Secret fuer die Checksumme
    pub secret: String,
    /// Hash-Verfahren: "sha1" oder "sha256"
    pub sha: String,
}

impl Default for ApiEinstellungen {
    fn default() -> Self {
        Self {
            url: "http://localhost/bigbluebutton/".into(),
            secret: String::new(),
            sha: "sha256".into(),
        }
    }
}

/// HTML5-Client des BBB-Servers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientEinstellungen {
    pub url: String,
    /// WebSocket-Endpunkt des Echtzeit-Protokolls
    pub ws: String,
}

impl Default for ClientEinstellungen {
    fn default() -> Self {
        Self {
            url: "http://localhost/html5client/".into(),
            ws: "ws://localhost/html5client/websocket".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotEinstellungen {
    /// Externe Meeting-ID
    pub meeting_id: String,
    /// Anzeigename im Meeting
    pub name: String,
    pub moderator: bool,
}

impl Default for BotEinstellungen {
    fn default() -> Self {
        Self {
            meeting_id: String::new(),
            name: "bbbot".into(),
            moderator: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// Zeitlimit fuer den Protokoll-Handshake
    pub handshake_timeout_sek: u64,
    /// Heartbeat-Intervall
    pub heartbeat_sek: u64,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        Self {
            handshake_timeout_sek: 10,
            heartbeat_sek: 30,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level bzw. Filter-Direktive
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

impl BotConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei und wendet
    /// Umgebungsvariablen an.
    /// Verwendet Standardwerte wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let mut config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.umgebung_anwenden(|name| std::env::var(name).ok());
        config
            .validieren()
            .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
        Ok(config)
    }

    /// Prueft Zeitwerte (groesser 0) und Logging-Einstellungen
    pub fn validieren(&self) -> anyhow::Result<()> {
        if self.verbindung.handshake_timeout_sek == 0 {
            bail!("verbindung.handshake_timeout_sek muss groesser als 0 sein");
        }
        if self.verbindung.heartbeat_sek == 0 {
            bail!("verbindung.heartbeat_sek muss groesser als 0 sein");
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("logging.format '{}' ungueltig (text oder json)", self.logging.format);
        }
        // Direktiven wie `bbbot_realtime=debug,info`: jeder Level-Teil zaehlt
        let level_ok = self.logging.level.split(',').all(|direktive| {
            let level = direktive.rsplit('=').next().unwrap_or(direktive).trim();
            log_level_gueltig(level)
        });
        if !level_ok {
            bail!("logging.level '{}' ungueltig", self.logging.level);
        }
        Ok(())
    }

    /// Ueberschreibt Felder mit gesetzten Umgebungsvariablen
    pub fn umgebung_anwenden<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let felder: [(&str, &mut String); 5] = [
            ("BBB_API_URL", &mut self.bbb.api.url),
            ("BBB_API_SECRET", &mut self.bbb.api.secret),
            ("BBB_API_SHA", &mut self.bbb.api.sha),
            ("BBB_CLIENT_URL", &mut self.bbb.client.url),
            ("BBB_CLIENT_WS", &mut self.bbb.client.ws),
        ];
        for (name, feld) in felder {
            if let Some(wert) = lookup(name).filter(|w| !w.is_empty()) {
                *feld = wert;
            }
        }
    }

    /// Session-Konfiguration fuer den `Client`
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            client_url: self.bbb.client.url.clone(),
            client_ws_url: self.bbb.client.ws.clone(),
            verbindung: ConnectionConfig {
                handshake_timeout: Duration::from_secs(self.verbindung.handshake_timeout_sek),
                heartbeat_intervall: Duration::from_secs(self.verbindung.heartbeat_sek),
                ..ConnectionConfig::default()
            },
        }
    }
}
