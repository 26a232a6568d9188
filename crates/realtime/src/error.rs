//! Fehlertypen fuer die Echtzeit-Verbindung

use bbbot_core::ServerError;
use thiserror::Error;

/// Fehlertyp fuer Verbindung, Calls und Subscriptions
///
/// `Clone`, weil beim Abbau der Verbindung derselbe Fehler an alle
/// wartenden Aufrufer verteilt wird.
#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    /// Socket konnte nicht geoeffnet werden oder ist nicht verbunden
    #[error("Transportfehler: {0}")]
    Transport(String),

    /// Protokoll-Handshake abgelehnt oder Timeout
    #[error("Handshake fehlgeschlagen: {0}")]
    Handshake(String),

    /// Verbindung wurde abgebaut bevor eine Antwort eintraf
    #[error("Verbindung verloren")]
    ConnectionLost,

    /// Anwendungsfehler des Servers (aus `result` oder `nosub`)
    #[error("Serverfehler: {0}")]
    Server(ServerError),

    /// Subscription-ID ist nicht (mehr) bekannt
    #[error("Unbekannte Subscription: {0}")]
    UnknownSubscription(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        RealtimeError::Transport(e.to_string())
    }
}

/// Result-Alias fuer die Echtzeit-Schicht
pub type RealtimeResult<T> = Result<T, RealtimeError>;
