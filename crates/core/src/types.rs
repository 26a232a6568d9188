//! Gemeinsame Zustands- und Datentypen fuer bbbot

use serde::{Deserialize, Serialize};

/// Ein gespiegeltes Dokument einer Collection (Feldname -> Wert)
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Verbindungszustand einer Connection bzw. Session
///
/// Pro Connection existiert genau ein Zustand; er wird ausschliesslich
/// ueber Zustandsuebergaenge veraendert.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Keine Verbindung
    #[default]
    Disconnected,
    /// Verbindungsaufbau / Join laeuft
    Connecting,
    /// Verbunden und authentifiziert
    Connected,
    /// Erneuter Verbindungsaufbau (wird vom Core nicht automatisch ausgeloest)
    Reconnecting,
    /// Verbindung wird getrennt
    Disconnecting,
}

impl ConnectionStatus {
    /// Gibt den Status als Kleinbuchstaben-String zurueck
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Disconnecting => "disconnecting",
        }
    }

    /// Gibt true zurueck wenn der Status `Connected` ist
    pub fn ist_verbunden(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
