//! Fehlerobjekt des Servers
//!
//! `result`- und `nosub`-Nachrichten koennen ein anwendungsspezifisches
//! Fehlerobjekt tragen. Es wird unveraendert an den Aufrufer weitergereicht.

use serde::{Deserialize, Serialize};

/// Vom Server gemeldeter Anwendungsfehler
///
/// `error` ist je nach Server ein numerischer Code (`403`) oder ein
/// String (`"not-allowed"`), daher als `serde_json::Value` modelliert.
///
/// Die Deserialisierung schlaegt nie fehl: fehlt `error`, ist es `Null`;
/// ist die Nutzlast gar kein Objekt, steht sie unveraendert in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "serde_json::Value")]
pub struct ServerError {
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub error: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServerError {
    /// Erstellt einen Fehler mit Code und Begruendung
    pub fn neu(error: impl Into<serde_json::Value>, reason: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: Some(reason.into()),
            message: None,
            error_type: None,
            details: None,
        }
    }
}

impl From<serde_json::Value> for ServerError {
    fn from(wert: serde_json::Value) -> Self {
        let mut obj = match wert {
            serde_json::Value::Object(obj) => obj,
            andere => {
                return Self {
                    error: andere,
                    reason: None,
                    message: None,
                    error_type: None,
                    details: None,
                }
            }
        };

        let mut text = |feld: &str| match obj.remove(feld) {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Null) | None => None,
            Some(andere) => Some(andere.to_string()),
        };
        let reason = text("reason");
        let message = text("message");
        let error_type = text("errorType");

        Self {
            error: obj.remove("error").unwrap_or(serde_json::Value::Null),
            reason,
            message,
            error_type,
            details: obj.remove("details"),
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match &self.error {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };
        let text = self.reason.as_ref().or(self.message.as_ref());
        match (code, text) {
            (Some(code), Some(text)) => write!(f, "[{}] {}", code, text),
            (Some(code), None) => write!(f, "[{}]", code),
            (None, Some(text)) => write!(f, "{}", text),
            (None, None) => write!(f, "unbekannter Serverfehler"),
        }
    }
}

impl std::error::Error for ServerError {}
