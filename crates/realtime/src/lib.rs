//! bbbot-realtime – Echtzeit-Protokoll-Engine
//!
//! Dieses Crate stellt die WebSocket-Verbindung zum Konferenz-Server bereit:
//! Handshake, Heartbeat, Methodenaufrufe, Subscriptions, den gespiegelten
//! Collection-Zustand und den Event-Bus fuer Aufrufer.
//!
//! ## Architektur
//! - `connection` – Verbindungs-Task und oeffentliches Handle
//! - `calls` – Zuordnung Methodenaufruf -> Ergebnis
//! - `subscriptions` – Subscription-Lebenszyklus und Bereitschaft
//! - `collections` – Collection-Spiegel aus inkrementellen Diffs
//! - `dispatcher` – Typisierter Event-Bus mit eigenem Dispatch-Task

pub mod calls;
pub mod collections;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod subscriptions;

pub use collections::CollectionStore;
pub use connection::{Connection, ConnectionConfig};
pub use dispatcher::{EventBus, HandlerId, WeakEventBus};
pub use error::{RealtimeError, RealtimeResult};
