//! Wire-Format fuer WebSocket-Text-Frames
//!
//! Jeder Text-Frame enthaelt genau ein JSON-Objekt. Das Feld `msg` bestimmt
//! die Nachrichtenart. Frames ohne `msg` (z.B. die `server_id`-Begruessung)
//! werden als "keine Nachricht" dekodiert und vom Aufrufer uebersprungen.
//!
//! Maximale Frame-Groesse ist konfigurierbar (Standard: 1 MB).

use serde::Deserialize;

use crate::envelope::Envelope;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Kodieren oder Dekodieren eines Frames
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Frame zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)")]
    FrameZuGross { laenge: usize, maximum: usize },

    #[error("Frame ist kein JSON-Objekt")]
    KeinObjekt,

    #[error("Ungueltige '{kind}'-Nachricht: {source}")]
    UngueltigeNachricht {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// FrameKopf
// ---------------------------------------------------------------------------

/// Art und ID eines Frames
///
/// Laesst sich auch aus Frames lesen die als Nachricht ungueltig oder zu
/// gross sind, damit Antworten trotzdem ihrem Aufrufer zugeordnet werden.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrameKopf {
    pub msg: String,
    #[serde(default)]
    pub id: Option<String>,
}

// ---------------------------------------------------------------------------
// EnvelopeCodec
// ---------------------------------------------------------------------------

/// Codec fuer Text-Frames der WebSocket-Verbindung
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
}

impl EnvelopeCodec {
    /// Erstellt einen neuen `EnvelopeCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `EnvelopeCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Dekodiert einen Text-Frame
    ///
    /// Gibt `Ok(None)` zurueck wenn das Objekt kein `msg`-Feld traegt.
    pub fn decode(&self, frame: &str) -> Result<Option<Envelope>, CodecError> {
        if frame.len() > self.max_frame_size {
            return Err(CodecError::FrameZuGross {
                laenge: frame.len(),
                maximum: self.max_frame_size,
            });
        }

        let value: serde_json::Value = serde_json::from_str(frame)?;
        let kind = match value.as_object() {
            Some(obj) => match obj.get("msg").and_then(|m| m.as_str()) {
                Some(kind) => kind.to_string(),
                None => return Ok(None),
            },
            None => return Err(CodecError::KeinObjekt),
        };

        serde_json::from_value(value)
            .map(Some)
            .map_err(|source| CodecError::UngueltigeNachricht { kind, source })
    }

    /// Liest nur `msg` und `id` (ohne Groessenlimit, Inhalte werden uebersprungen)
    pub fn kopf(frame: &str) -> Option<FrameKopf> {
        serde_json::from_str(frame).ok()
    }

    /// Kodiert eine Nachricht als Text-Frame
    pub fn encode(&self, envelope: &Envelope) -> Result<String, CodecError> {
        let json = envelope.to_json()?;

        if json.len() > self.max_frame_size {
            return Err(CodecError::FrameZuGross {
                laenge: json.len(),
                maximum: self.max_frame_size,
            });
        }

        Ok(json)
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
