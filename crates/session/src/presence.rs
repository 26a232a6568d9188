//! Teilnehmer-Presence aus der Collection `users`

use bbbot_core::{BotEvent, CollectionEvent, DiffOp, Document, PresenceChange, PresenceKind};
use bbbot_realtime::{EventBus, HandlerId};

use crate::client::Client;
use crate::error::SessionResult;

pub(crate) const USERS_COLLECTION: &str = "users";

pub(crate) fn weiterleitung_registrieren(bus: &EventBus) {
    let schwach = bus.downgrade();
    bus.on::<CollectionEvent, _>(move |event| {
        if event.collection == USERS_COLLECTION {
            schwach.emit(BotEvent::Presence(aus_diff(event)));
        }
    });
}

/// Leitet die Presence-Aenderung aus einem `users`-Diff ab
pub(crate) fn aus_diff(event: &CollectionEvent) -> PresenceChange {
    let doc = event.document.as_ref();

    let kind = match event.op {
        DiffOp::Added => PresenceKind::Joined,
        DiffOp::Removed => PresenceKind::Left,
        DiffOp::Changed if doc.is_some_and(abgemeldet) => PresenceKind::Left,
        DiffOp::Changed => PresenceKind::Updated,
    };

    PresenceChange {
        user_id: doc
            .and_then(|d| d.get("userId"))
            .and_then(|v| v.as_str())
            .unwrap_or(&event.document_id)
            .to_string(),
        name: doc
            .and_then(|d| d.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        kind,
    }
}

fn abgemeldet(doc: &Document) -> bool {
    ["loggedOut", "left"]
        .iter()
        .any(|feld| doc.get(*feld).and_then(|v| v.as_bool()) == Some(true))
}

impl Client {
    /// Registriert einen Handler fuer Teilnehmer-Aenderungen (abonniert `users`)
    pub async fn on_presence<F>(&self, handler: F) -> SessionResult<HandlerId>
    where
        F: Fn(&PresenceChange) + Send + Sync + 'static,
    {
        let id = self.inner.bus.on::<PresenceChange, _>(handler);
        self.publikation_anfordern(USERS_COLLECTION).await?;
        Ok(id)
    }
}
