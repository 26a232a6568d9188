//! Fehlertypen fuer den REST-Client

use thiserror::Error;

/// Fehlertyp fuer Anfragen an die BBB-API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Basis-URL beginnt nicht mit `http://` oder `https://`
    #[error("Ungueltige API-URL '{0}' (erwartet z.B. https://example.com/bigbluebutton/api/)")]
    InvalidUrl(String),

    /// Netzwerk- oder HTTP-Fehler
    #[error("HTTP-Fehler: {0}")]
    Http(#[from] reqwest::Error),

    /// Server antwortete nicht mit 200
    #[error("Server antwortete mit Status {0}")]
    Status(u16),

    /// Antwort ist kein gueltiges XML
    #[error("Ungueltige XML-Antwort: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// `returncode` ist nicht `SUCCESS`
    #[error("Anfrage abgelehnt: [{message_key}] {message}")]
    Rejected { message_key: String, message: String },

    /// Pflichtfeld fehlt in einer erfolgreichen Antwort
    #[error("Feld '{0}' fehlt in der Antwort")]
    MissingField(&'static str),
}

/// Result-Alias fuer den REST-Client
pub type ApiResult<T> = Result<T, ApiError>;
