//! Protokoll-Umschlaege (Envelopes)
//!
//! Definiert alle Nachrichten die ueber die WebSocket-Verbindung zwischen
//! Bot und Server ausgetauscht werden.
//!
//! ## Design
//! - JSON-Objekte, das Feld `msg` bestimmt die Nachrichtenart
//! - Tagged Enum fuer typsichere Nachrichtenarten
//! - Jede Variante traegt nur die fuer ihre Art relevanten Felder
//! - Request/Response-Zuordnung ueber die vom Client vergebene `id`

use bbbot_core::{Document, ServerError};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Versionen
// ---------------------------------------------------------------------------

/// Bevorzugte Protokollversion
pub const PROTOKOLL_VERSION: &str = "1";

/// Unterstuetzte Protokollversionen (in Praeferenz-Reihenfolge)
pub const UNTERSTUETZTE_VERSIONEN: [&str; 3] = ["1", "pre2", "pre1"];

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Alle moeglichen Protokoll-Nachrichten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum Envelope {
    // Handshake
    Connect {
        version: String,
        support: Vec<String>,
    },
    Connected {
        session: String,
    },
    Failed {
        version: String,
    },

    // Heartbeat
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    // Remote Procedure Calls
    Method {
        id: String,
        method: String,
        #[serde(default)]
        params: Vec<serde_json::Value>,
    },
    Result {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ServerError>,
    },
    Updated {
        #[serde(default)]
        methods: Vec<String>,
    },

    // Subscriptions
    Sub {
        id: String,
        name: String,
        #[serde(default)]
        params: Vec<serde_json::Value>,
    },
    Unsub {
        id: String,
    },
    Nosub {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ServerError>,
    },
    Ready {
        #[serde(default)]
        subs: Vec<String>,
    },

    // Collection-Diffs
    Added {
        collection: String,
        id: String,
        #[serde(default)]
        fields: Document,
    },
    Changed {
        collection: String,
        id: String,
        #[serde(default, skip_serializing_if = "Document::is_empty")]
        fields: Document,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        cleared: Vec<String>,
    },
    Removed {
        collection: String,
        id: String,
    },

    // Protokollfehler
    Error {
        reason: String,
        #[serde(
            default,
            rename = "offendingMessage",
            skip_serializing_if = "Option::is_none"
        )]
        offending_message: Option<serde_json::Value>,
    },
}

impl Envelope {
    /// Erstellt die `connect`-Nachricht mit allen unterstuetzten Versionen
    pub fn connect() -> Self {
        Envelope::Connect {
            version: PROTOKOLL_VERSION.to_string(),
            support: UNTERSTUETZTE_VERSIONEN
                .iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(id: Option<String>) -> Self {
        Envelope::Ping { id }
    }

    /// Erstellt eine Pong-Antwort (spiegelt die Ping-ID)
    pub fn pong(id: Option<String>) -> Self {
        Envelope::Pong { id }
    }

    /// Erstellt einen Methodenaufruf
    pub fn method(
        id: impl Into<String>,
        method: impl Into<String>,
        params: Vec<serde_json::Value>,
    ) -> Self {
        Envelope::Method {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Erstellt eine Subscription-Anfrage
    pub fn sub(
        id: impl Into<String>,
        name: impl Into<String>,
        params: Vec<serde_json::Value>,
    ) -> Self {
        Envelope::Sub {
            id: id.into(),
            name: name.into(),
            params,
        }
    }

    /// Erstellt eine Unsubscribe-Nachricht
    pub fn unsub(id: impl Into<String>) -> Self {
        Envelope::Unsub { id: id.into() }
    }

    /// Gibt den Wert des `msg`-Felds zurueck
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Connect { .. } => "connect",
            Envelope::Connected { .. } => "connected",
            Envelope::Failed { .. } => "failed",
            Envelope::Ping { .. } => "ping",
            Envelope::Pong { .. } => "pong",
            Envelope::Method { .. } => "method",
            Envelope::Result { .. } => "result",
            Envelope::Updated { .. } => "updated",
            Envelope::Sub { .. } => "sub",
            Envelope::Unsub { .. } => "unsub",
            Envelope::Nosub { .. } => "nosub",
            Envelope::Ready { .. } => "ready",
            Envelope::Added { .. } => "added",
            Envelope::Changed { .. } => "changed",
            Envelope::Removed { .. } => "removed",
            Envelope::Error { .. } => "error",
        }
    }

    /// Gibt true zurueck wenn die Nachricht ein Collection-Diff ist
    pub fn ist_diff(&self) -> bool {
        matches!(
            self,
            Envelope::Added { .. } | Envelope::Changed { .. } | Envelope::Removed { .. }
        )
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
