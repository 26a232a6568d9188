//! Fehlertypen fuer die Session

use bbbot_api::ApiError;
use bbbot_realtime::RealtimeError;
use thiserror::Error;

/// Fehlertyp der Session-Orchestrierung
#[derive(Debug, Error)]
pub enum SessionError {
    /// REST-Join fehlgeschlagen
    #[error("Join abgelehnt: {0}")]
    JoinRejected(#[source] ApiError),

    /// `validateAuthToken` fehlgeschlagen
    #[error("Auth-Token ungueltig: {0}")]
    AuthTokenInvalid(#[source] RealtimeError),

    /// Keine aktive Session
    #[error("Nicht in einem Meeting – zuerst join() aufrufen")]
    NotInMeeting,

    /// Join waehrend bereits eine Session besteht oder aufgebaut wird
    #[error("Bereits einem Meeting beigetreten")]
    AlreadyJoined,

    /// Fehler der Echtzeit-Verbindung
    #[error("Verbindungsfehler: {0}")]
    Realtime(#[from] RealtimeError),

    /// Fehler der Medienquelle
    #[error("Audio-Fehler: {0}")]
    Audio(String),
}

/// Result-Alias fuer die Session
pub type SessionResult<T> = Result<T, SessionError>;
