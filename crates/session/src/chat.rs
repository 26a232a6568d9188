//! Gruppen-Chat
//!
//! Nachrichten kommen als Diffs auf der Collection `group-chat-msg` an und
//! werden zu `ChatMessage`-Events normalisiert. Gesendet wird ueber die
//! Server-Methode `sendGroupChatMsg`.

use bbbot_core::{ChatMessage, CollectionEvent, DiffOp, Document};
use bbbot_realtime::{EventBus, HandlerId};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::client::Client;
use crate::error::SessionResult;

/// ID des oeffentlichen Haupt-Chats
pub const MAIN_PUBLIC_GROUP_CHAT: &str = "MAIN-PUBLIC-GROUP-CHAT";

/// Collection bzw. Publikation der Chat-Nachrichten
pub(crate) const CHAT_COLLECTION: &str = "group-chat-msg";

/// Leitet Chat-Diffs als `ChatMessage`-Events weiter
pub(crate) fn weiterleitung_registrieren(bus: &EventBus) {
    let schwach = bus.downgrade();
    bus.on::<CollectionEvent, _>(move |event| {
        if event.collection != CHAT_COLLECTION || event.op == DiffOp::Removed {
            return;
        }
        if let Some(nachricht) = event
            .document
            .as_ref()
            .and_then(|doc| normalisieren(&event.document_id, doc))
        {
            schwach.emit(bbbot_core::BotEvent::ChatMessage(nachricht));
        }
    });
}

/// Baut eine `ChatMessage` aus einem Chat-Dokument
///
/// Gibt None zurueck solange das Dokument noch keinen Text enthaelt.
pub(crate) fn normalisieren(id: &str, doc: &Document) -> Option<ChatMessage> {
    let message = doc.get("message")?.as_str()?.to_string();

    // `sender` ist je nach Server-Version eine ID oder ein Objekt {id, name}
    let (sender, name_aus_sender) = match doc.get("sender") {
        Some(Value::String(id)) => (id.clone(), None),
        Some(Value::Object(obj)) => (
            text(obj.get("id")).unwrap_or_default(),
            text(obj.get("name")),
        ),
        _ => (String::new(), None),
    };

    let sender_name = text(doc.get("senderName"))
        .or(name_aus_sender)
        .unwrap_or_default();

    let timestamp = doc
        .get("timestamp")
        .and_then(Value::as_i64)
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    Some(ChatMessage {
        id: id.to_string(),
        chat_id: text(doc.get("chatId")).unwrap_or_else(|| MAIN_PUBLIC_GROUP_CHAT.to_string()),
        sender,
        sender_name,
        message,
        timestamp,
    })
}

fn text(wert: Option<&Value>) -> Option<String> {
    wert.and_then(Value::as_str).map(str::to_string)
}

impl Client {
    /// Registriert einen Handler fuer eingehende Chat-Nachrichten
    ///
    /// Abonniert `group-chat-msg` (einmal pro Session). Ohne aktive Session
    /// wird das Abonnement beim naechsten Join nachgeholt.
    pub async fn on_chat_message<F>(&self, handler: F) -> SessionResult<HandlerId>
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        let id = self.inner.bus.on::<ChatMessage, _>(handler);
        self.publikation_anfordern(CHAT_COLLECTION).await?;
        Ok(id)
    }

    /// Sendet eine Nachricht in einen Gruppen-Chat
    pub async fn send_chat_message(&self, text: &str, chat_id: &str) -> SessionResult<()> {
        let (connection, user_id, user_name) = self.aktive_verbindung().await?;

        let nachricht = json!({
            "correlationId": format!("{}-{}", user_id, Utc::now().timestamp_millis()),
            "sender": {
                "id": user_id,
                "name": user_name,
            },
            "chatEmphasizedText": true,
            "message": text,
        });

        connection
            .call("sendGroupChatMsg", vec![json!(chat_id), nachricht])
            .await?;
        tracing::debug!(chat_id = %chat_id, "Chat-Nachricht gesendet");
        Ok(())
    }
}
