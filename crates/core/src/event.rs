//! Typisierte Event-Payloads fuer den Event-Bus
//!
//! Jede Event-Art hat genau einen Payload-Typ. Handler werden ueber das
//! `EventPayload`-Trait registriert, sodass die Signatur eines Handlers zur
//! Compilezeit gegen die Event-Art geprueft wird.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConnectionStatus, Document};

/// Alle Event-Arten die ueber den Bus fliessen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    ChatMessage,
    Presence,
    Collection,
}

/// Ein Ereignis auf dem Event-Bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BotEvent {
    /// Verbindungs- bzw. Session-Status hat sich geaendert
    Status(StatusChange),
    /// Eingehende Chat-Nachricht (normalisiert)
    ChatMessage(ChatMessage),
    /// Teilnehmer betritt / verlaesst / aendert sich
    Presence(PresenceChange),
    /// Rohe Collection-Aenderung
    Collection(CollectionEvent),
}

impl BotEvent {
    /// Gibt die Event-Art zurueck
    pub fn kind(&self) -> EventKind {
        match self {
            BotEvent::Status(_) => EventKind::Status,
            BotEvent::ChatMessage(_) => EventKind::ChatMessage,
            BotEvent::Presence(_) => EventKind::Presence,
            BotEvent::Collection(_) => EventKind::Collection,
        }
    }
}

/// Statuswechsel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub previous: ConnectionStatus,
    pub current: ConnectionStatus,
}

/// Normalisierte Chat-Nachricht aus der `group-chat-msg`-Collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Dokument-ID in der Collection
    pub id: String,
    pub chat_id: String,
    /// Interne User-ID des Absenders
    pub sender: String,
    pub sender_name: String,
    pub message: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Art der Presence-Aenderung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceKind {
    Joined,
    Updated,
    Left,
}

/// Presence-Aenderung eines Teilnehmers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceChange {
    /// Interne User-ID
    pub user_id: String,
    pub name: Option<String>,
    pub kind: PresenceKind,
}

/// Operation eines Diffs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOp {
    Added,
    Changed,
    Removed,
}

/// Erfolgreich angewendeter Collection-Diff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionEvent {
    pub collection: String,
    pub op: DiffOp,
    pub document_id: String,
    /// Zustand des Dokuments nach dem Diff (None bei `Removed`)
    pub document: Option<Document>,
    /// `added` hat ein bereits vorhandenes Dokument ueberschrieben
    pub corrected: bool,
}

/// Payload-Typ einer Event-Art
pub trait EventPayload: Clone + Send + Sync + 'static {
    const KIND: EventKind;

    /// Extrahiert den Payload aus einem Event (None bei anderer Art)
    fn aus_event(event: &BotEvent) -> Option<&Self>;

    /// Verpackt den Payload als Event
    fn into_event(self) -> BotEvent;
}

macro_rules! event_payload {
    ($typ:ty, $variante:ident) => {
        impl EventPayload for $typ {
            const KIND: EventKind = EventKind::$variante;

            fn aus_event(event: &BotEvent) -> Option<&Self> {
                match event {
                    BotEvent::$variante(payload) => Some(payload),
                    _ => None,
                }
            }

            fn into_event(self) -> BotEvent {
                BotEvent::$variante(self)
            }
        }
    };
}

event_payload!(StatusChange, Status);
event_payload!(ChatMessage, ChatMessage);
event_payload!(PresenceChange, Presence);
event_payload!(CollectionEvent, Collection);
