//! Event-Bus – Typisiertes Publish/Subscribe
//!
//! Handler werden pro Event-Art registriert und in Registrierungsreihenfolge
//! aufgerufen. `emit` reiht das Event nur ein; ein eigener Dispatch-Task
//! ruft die Handler auf, sodass der Lesepfad der Verbindung nie durch
//! Aufrufer-Code blockiert wird.
//!
//! ## Eigenschaften
//! - Ein Handler-Panic wird abgefangen und geloggt, spaetere Handler und
//!   spaetere Events laufen weiter
//! - Kein Replay: spaet registrierte Handler sehen fruehere Events nicht
//! - Der Dispatch-Task endet wenn der letzte `EventBus`-Klon gedroppt wird

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bbbot_core::{BotEvent, EventKind, EventPayload};
use dashmap::DashMap;
use tokio::sync::mpsc;

type Handler = Arc<dyn Fn(&BotEvent) + Send + Sync>;
type HandlerMap = DashMap<EventKind, Vec<(HandlerId, Handler)>>;

/// Kennung eines registrierten Handlers (fuer `off`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct BusInner {
    handler: Arc<HandlerMap>,
    naechste_id: AtomicU64,
    queue_tx: mpsc::UnboundedSender<BotEvent>,
}

/// Event-Bus (guenstig klonbar, alle Klone teilen Handler und Queue)
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Erstellt einen neuen Bus und startet den Dispatch-Task
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn new() -> Self {
        let handler: Arc<HandlerMap> = Arc::new(DashMap::new());
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        tokio::spawn(dispatch_schleife(queue_rx, Arc::clone(&handler)));

        Self {
            inner: Arc::new(BusInner {
                handler,
                naechste_id: AtomicU64::new(1),
                queue_tx,
            }),
        }
    }

    /// Registriert einen Handler fuer die Event-Art des Payload-Typs `E`
    pub fn on<E, F>(&self, handler: F) -> HandlerId
    where
        E: EventPayload,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.naechste_id.fetch_add(1, Ordering::Relaxed));
        let verpackt: Handler = Arc::new(move |event: &BotEvent| {
            if let Some(payload) = E::aus_event(event) {
                handler(payload);
            }
        });
        self.inner
            .handler
            .entry(E::KIND)
            .or_default()
            .push((id, verpackt));
        tracing::trace!(kind = ?E::KIND, handler_id = id.0, "Handler registriert");
        id
    }

    /// Entfernt einen Handler; gibt false zurueck wenn er nicht existiert
    pub fn off(&self, id: HandlerId) -> bool {
        for mut eintrag in self.inner.handler.iter_mut() {
            let vorher = eintrag.len();
            eintrag.retain(|(hid, _)| *hid != id);
            if eintrag.len() != vorher {
                return true;
            }
        }
        false
    }

    /// Reiht ein Event zur Zustellung ein
    pub fn emit(&self, event: BotEvent) {
        if self.inner.queue_tx.send(event).is_err() {
            tracing::debug!("Dispatch-Task beendet – Event verworfen");
        }
    }

    /// Reiht einen typisierten Payload zur Zustellung ein
    pub fn emit_payload<E: EventPayload>(&self, payload: E) {
        self.emit(payload.into_event());
    }

    /// Schwaches Handle, z.B. fuer Handler die selbst Events ausloesen
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Anzahl registrierter Handler fuer eine Event-Art
    #[cfg(test)]
    pub fn handler_anzahl(&self, kind: EventKind) -> usize {
        self.inner.handler.get(&kind).map(|h| h.len()).unwrap_or(0)
    }
}

/// Schwaches Handle auf einen `EventBus`
///
/// Haelt den Bus nicht am Leben; `emit` verwirft Events sobald der Bus
/// gedroppt wurde.
#[derive(Clone)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    pub fn emit(&self, event: BotEvent) {
        if let Some(inner) = self.inner.upgrade() {
            EventBus { inner }.emit(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("event_arten", &self.inner.handler.len())
            .finish()
    }
}

async fn dispatch_schleife(mut queue_rx: mpsc::UnboundedReceiver<BotEvent>, handler: Arc<HandlerMap>) {
    while let Some(event) = queue_rx.recv().await {
        // Liste kopieren: Handler duerfen selbst on/off aufrufen
        let liste: Vec<(HandlerId, Handler)> = match handler.get(&event.kind()) {
            Some(h) => h.clone(),
            None => continue,
        };

        for (id, h) in liste {
            if catch_unwind(AssertUnwindSafe(|| h(&event))).is_err() {
                tracing::error!(
                    kind = ?event.kind(),
                    handler_id = id.0,
                    "Event-Handler ist abgestuerzt"
                );
            }
        }
    }
    tracing::debug!("Dispatch-Task beendet");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbbot_core::{ConnectionStatus, PresenceChange, PresenceKind, StatusChange};
    use std::time::Duration;

    fn status(current: ConnectionStatus) -> StatusChange {
        StatusChange {
            previous: ConnectionStatus::Disconnected,
            current,
        }
    }

    async fn empfangen<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timeout beim Warten auf Event")
            .expect("Kanal geschlossen")
    }

    #[tokio::test]
    async fn handler_in_registrierungsreihenfolge() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for nr in 1..=3 {
            let tx = tx.clone();
            bus.on::<StatusChange, _>(move |_| {
                let _ = tx.send(nr);
            });
        }
        bus.emit_payload(status(ConnectionStatus::Connected));

        assert_eq!(empfangen(&mut rx).await, 1);
        assert_eq!(empfangen(&mut rx).await, 2);
        assert_eq!(empfangen(&mut rx).await, 3);
    }

    #[tokio::test]
    async fn nur_passende_event_art_wird_zugestellt() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on::<PresenceChange, _>(move |p| {
            let _ = tx.send(p.user_id.clone());
        });

        bus.emit_payload(status(ConnectionStatus::Connected));
        bus.emit_payload(PresenceChange {
            user_id: "w_1".into(),
            name: None,
            kind: PresenceKind::Joined,
        });

        assert_eq!(empfangen(&mut rx).await, "w_1");
        assert_eq!(bus.handler_anzahl(EventKind::Presence), 1);
        assert_eq!(bus.handler_anzahl(EventKind::Status), 0);
    }

    #[tokio::test]
    async fn panic_im_handler_stoppt_dispatch_nicht() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        bus.on::<StatusChange, _>(|_| panic!("absichtlicher Test-Panic"));
        let tx2 = tx.clone();
        bus.on::<StatusChange, _>(move |s| {
            let _ = tx2.send(s.current);
        });

        bus.emit_payload(status(ConnectionStatus::Connecting));
        bus.emit_payload(status(ConnectionStatus::Connected));

        assert_eq!(empfangen(&mut rx).await, ConnectionStatus::Connecting);
        assert_eq!(empfangen(&mut rx).await, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn off_entfernt_handler() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let tx1 = tx.clone();
        let id = bus.on::<StatusChange, _>(move |_| {
            let _ = tx1.send("entfernt");
        });
        bus.on::<StatusChange, _>(move |_| {
            let _ = tx.send("aktiv");
        });

        assert!(bus.off(id));
        assert!(!bus.off(id));
        bus.emit_payload(status(ConnectionStatus::Connected));

        assert_eq!(empfangen(&mut rx).await, "aktiv");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn handler_kann_ueber_schwaches_handle_weiterleiten() {
        let bus = EventBus::new();
        let schwach = bus.downgrade();
        bus.on::<StatusChange, _>(move |s| {
            schwach.emit(BotEvent::Presence(PresenceChange {
                user_id: s.current.to_string(),
                name: None,
                kind: PresenceKind::Updated,
            }));
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on::<PresenceChange, _>(move |p| {
            let _ = tx.send(p.user_id.clone());
        });

        bus.emit_payload(status(ConnectionStatus::Connected));
        assert_eq!(empfangen(&mut rx).await, "connected");
    }

    #[tokio::test]
    async fn kein_replay_fuer_spaete_handler() {
        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Marker-Handler stellt sicher dass das erste Event verarbeitet wurde
        let (marker_tx, mut marker_rx) = mpsc::unbounded_channel();
        bus.on::<StatusChange, _>(move |_| {
            let _ = marker_tx.send(());
        });
        bus.emit_payload(status(ConnectionStatus::Connecting));
        empfangen(&mut marker_rx).await;

        bus.on::<StatusChange, _>(move |s| {
            let _ = tx.send(s.current);
        });
        bus.emit_payload(status(ConnectionStatus::Connected));

        assert_eq!(empfangen(&mut rx).await, ConnectionStatus::Connected);
        assert!(rx.try_recv().is_err());
    }
}
