//! bbbot-core – Gemeinsame Typen, Events und Fehler-Payloads
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen bbbot-Crates gemeinsam genutzt werden: den Verbindungsstatus,
//! die typisierten Event-Payloads des Event-Busses und das Fehlerobjekt,
//! das der Server in `result`/`nosub` mitschickt.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::ServerError;
pub use event::{
    BotEvent, ChatMessage, CollectionEvent, DiffOp, EventKind, EventPayload, PresenceChange,
    PresenceKind, StatusChange,
};
pub use types::{ConnectionStatus, Document};
