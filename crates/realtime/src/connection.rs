//! Connection – Verwaltet die WebSocket-Verbindung zum Konferenz-Server
//!
//! Ein einzelner tokio-Task besitzt den Socket sowie Call-Registry,
//! Subscription-Registry und die Schreibseite des Collection-Spiegels.
//! Die oeffentliche API (`Connection`) spricht mit diesem Task ueber einen
//! mpsc-Kommandokanal und erhaelt Antworten ueber oneshot-Kanaele.
//!
//! ## State Machine
//! ```text
//! Connecting --connected--> Connected --close()--> Disconnecting -> Disconnected
//!     |                         |
//!     +--failed/timeout--> Fehler   +--Liveness/Socket weg--> Disconnected
//! ```
//!
//! ## Heartbeat
//! - Eingehendes `ping` wird sofort mit `pong` (gleiche ID) beantwortet
//! - Kommt innerhalb eines Intervalls kein Verkehr, sendet der Task ein `ping`
//! - Vergeht ein weiteres Intervall ohne Verkehr, gilt die Verbindung als tot

use std::time::Duration;

use bbbot_core::{BotEvent, ConnectionStatus, ServerError};
use bbbot_protocol::{CodecError, Envelope, EnvelopeCodec, DEFAULT_MAX_FRAME_SIZE};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::calls::CallRegistry;
use crate::collections::CollectionStore;
use crate::dispatcher::EventBus;
use crate::error::{RealtimeError, RealtimeResult};
use crate::subscriptions::{ReadySender, SubscriptionRegistry};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Kapazitaet des Kommandokanals
const KOMMANDO_KAPAZITAET: usize = 256;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Zeitlimits und Limits einer Verbindung
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Maximale Dauer bis `connected` eintreffen muss
    pub handshake_timeout: Duration,
    /// Intervall ohne Verkehr bis ein eigenes `ping` gesendet wird
    pub heartbeat_intervall: Duration,
    /// Maximale Groesse eines Text-Frames
    pub max_frame_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            heartbeat_intervall: Duration::from_secs(30),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Kommandos
// ---------------------------------------------------------------------------

enum Command {
    Send {
        envelope: Envelope,
    },
    Call {
        method: String,
        params: Vec<serde_json::Value>,
        antwort: crate::calls::CallSender,
    },
    Subscribe {
        id: String,
        name: String,
        params: Vec<serde_json::Value>,
    },
    AwaitReady {
        id: String,
        antwort: ReadySender,
    },
    Unsubscribe {
        id: String,
    },
    Subscriptions {
        antwort: oneshot::Sender<Vec<String>>,
    },
    Close {
        antwort: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Connection (Handle)
// ---------------------------------------------------------------------------

/// Handle auf eine aufgebaute Verbindung
///
/// Klonbar; alle Klone sprechen mit demselben Verbindungs-Task.
#[derive(Clone)]
pub struct Connection {
    kommando_tx: mpsc::Sender<Command>,
    status_rx: watch::Receiver<ConnectionStatus>,
    collections: CollectionStore,
    bus: EventBus,
    session: String,
}

impl Connection {
    /// Baut die WebSocket-Verbindung auf und fuehrt den Protokoll-Handshake durch
    ///
    /// `cookies` werden als `Cookie`-Header weitergereicht (aus dem REST-Join).
    ///
    /// # Fehler
    /// - `Transport` wenn der Socket nicht geoeffnet werden kann
    /// - `Handshake` bei `failed` oder wenn `connected` nicht rechtzeitig eintrifft
    pub async fn connect(
        url: &str,
        cookies: &[String],
        config: ConnectionConfig,
        bus: EventBus,
    ) -> RealtimeResult<Self> {
        let codec = EnvelopeCodec::with_max_size(config.max_frame_size);

        let mut request = url.into_client_request()?;
        if !cookies.is_empty() {
            let wert = HeaderValue::from_str(&cookies.join("; "))
                .map_err(|e| RealtimeError::Transport(format!("Ungueltiger Cookie-Header: {e}")))?;
            request.headers_mut().insert(header::COOKIE, wert);
        }

        tracing::info!(url = %url, "Verbindungsaufbau");
        let (mut ws, _antwort) = tokio_tungstenite::connect_async(request).await?;

        let session = match tokio::time::timeout(
            config.handshake_timeout,
            handshake(&mut ws, &codec),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                let _ = ws.close(None).await;
                return Err(e);
            }
            Err(_) => {
                let _ = ws.close(None).await;
                return Err(RealtimeError::Handshake(format!(
                    "kein 'connected' innerhalb von {:?}",
                    config.handshake_timeout
                )));
            }
        };

        tracing::info!(session = %session, "Verbunden");

        let (kommando_tx, kommando_rx) = mpsc::channel(KOMMANDO_KAPAZITAET);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connected);
        let collections = CollectionStore::new();

        let schleife = VerbindungsSchleife {
            ws,
            codec,
            kommando_rx,
            status_tx,
            calls: CallRegistry::new(),
            subs: SubscriptionRegistry::new(),
            collections: collections.clone(),
            bus: bus.clone(),
            heartbeat: config.heartbeat_intervall,
            naechste_ping_id: 0,
        };
        tokio::spawn(schleife.laufen());

        Ok(Self {
            kommando_tx,
            status_rx,
            collections,
            bus,
            session,
        })
    }

    /// Vom Server vergebene Session-ID
    pub fn session_id(&self) -> &str {
        &self.session
    }

    /// Aktueller Verbindungsstatus
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Beobachter fuer Statuswechsel
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Gespiegelte Collections (nur lesend)
    pub fn collections(&self) -> &CollectionStore {
        &self.collections
    }

    /// Event-Bus dieser Verbindung
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Sendet eine Nachricht ohne auf eine Antwort zu warten
    pub async fn send(&self, envelope: Envelope) -> RealtimeResult<()> {
        if !self.status().ist_verbunden() {
            return Err(RealtimeError::Transport("nicht verbunden".into()));
        }
        self.kommando(Command::Send { envelope })
            .await
            .map_err(|_| RealtimeError::Transport("nicht verbunden".into()))
    }

    /// Ruft eine Server-Methode auf und wartet auf das Ergebnis
    pub async fn call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> RealtimeResult<serde_json::Value> {
        let (antwort, rx) = oneshot::channel();
        self.kommando(Command::Call {
            method: method.to_string(),
            params,
            antwort,
        })
        .await?;
        rx.await.map_err(|_| RealtimeError::ConnectionLost)?
    }

    /// Abonniert eine Publikation und gibt sofort die Subscription-ID zurueck
    pub async fn subscribe(
        &self,
        name: &str,
        params: Vec<serde_json::Value>,
    ) -> RealtimeResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.kommando(Command::Subscribe {
            id: id.clone(),
            name: name.to_string(),
            params,
        })
        .await?;
        Ok(id)
    }

    /// Wartet bis die Subscription `ready` ist
    ///
    /// # Fehler
    /// - `Server` bei `nosub`
    /// - `UnknownSubscription` wenn die ID nicht verfolgt wird
    /// - `ConnectionLost` beim Abbau der Verbindung
    pub async fn await_ready(&self, id: &str) -> RealtimeResult<()> {
        let (antwort, rx) = oneshot::channel();
        self.kommando(Command::AwaitReady {
            id: id.to_string(),
            antwort,
        })
        .await?;
        rx.await.map_err(|_| RealtimeError::ConnectionLost)?
    }

    /// Beendet eine Subscription (ohne auf Bestaetigung zu warten)
    pub async fn unsubscribe(&self, id: &str) -> RealtimeResult<()> {
        self.kommando(Command::Unsubscribe { id: id.to_string() })
            .await
    }

    /// IDs aller aktuell verfolgten Subscriptions
    pub async fn subscriptions(&self) -> RealtimeResult<Vec<String>> {
        let (antwort, rx) = oneshot::channel();
        self.kommando(Command::Subscriptions { antwort }).await?;
        rx.await.map_err(|_| RealtimeError::ConnectionLost)
    }

    /// Trennt die Verbindung
    ///
    /// Idempotent: weitere (auch gleichzeitige) Aufrufe kehren zurueck
    /// sobald die Verbindung getrennt ist.
    pub async fn close(&self) {
        let (antwort, rx) = oneshot::channel();
        if self.kommando_tx.send(Command::Close { antwort }).await.is_ok() {
            let _ = rx.await;
        }

        // Auf den Endzustand warten (Task koennte noch abbauen)
        let mut status_rx = self.status_rx.clone();
        let _ = status_rx
            .wait_for(|s| *s == ConnectionStatus::Disconnected)
            .await;
    }

    async fn kommando(&self, kommando: Command) -> RealtimeResult<()> {
        self.kommando_tx
            .send(kommando)
            .await
            .map_err(|_| RealtimeError::ConnectionLost)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("session", &self.session)
            .field("status", &self.status())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

async fn handshake(ws: &mut WsStream, codec: &EnvelopeCodec) -> RealtimeResult<String> {
    let connect = codec
        .encode(&Envelope::connect())
        .map_err(|e| RealtimeError::Handshake(e.to_string()))?;
    ws.send(Message::Text(connect.into())).await?;

    while let Some(frame) = ws.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match codec.decode(text.as_str()) {
            Ok(Some(Envelope::Connected { session })) => return Ok(session),
            Ok(Some(Envelope::Failed { version })) => {
                return Err(RealtimeError::Handshake(format!(
                    "Server verlangt Protokollversion {version}"
                )));
            }
            Ok(Some(Envelope::Ping { id })) => {
                let pong = codec
                    .encode(&Envelope::pong(id))
                    .map_err(|e| RealtimeError::Handshake(e.to_string()))?;
                ws.send(Message::Text(pong.into())).await?;
            }
            Ok(Some(andere)) => {
                tracing::debug!(kind = andere.kind(), "Nachricht vor Handshake ignoriert");
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(fehler = %e, "Ungueltiger Frame im Handshake"),
        }
    }

    Err(RealtimeError::Handshake(
        "Verbindung waehrend des Handshakes geschlossen".into(),
    ))
}

// ---------------------------------------------------------------------------
// Verbindungs-Task
// ---------------------------------------------------------------------------

/// Grund fuer das Ende der Verbindungsschleife
enum Ende {
    /// Lokales `close()` bzw. alle Handles gedroppt
    Geschlossen(Option<oneshot::Sender<()>>),
    /// Socket weg oder Liveness verletzt
    Verloren,
}

struct VerbindungsSchleife {
    ws: WsStream,
    codec: EnvelopeCodec,
    kommando_rx: mpsc::Receiver<Command>,
    status_tx: watch::Sender<ConnectionStatus>,
    calls: CallRegistry,
    subs: SubscriptionRegistry,
    collections: CollectionStore,
    bus: EventBus,
    heartbeat: Duration,
    naechste_ping_id: u64,
}

impl VerbindungsSchleife {
    async fn laufen(mut self) {
        let mut frist = Instant::now() + self.heartbeat;
        let mut ping_ausstehend = false;

        let ende = loop {
            tokio::select! {
                // Eingehende Frames
                frame = self.ws.next() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            frist = Instant::now() + self.heartbeat;
                            ping_ausstehend = false;
                            match nachricht {
                                Message::Text(text) => {
                                    if let Err(e) = self.frame_verarbeiten(text.as_str()).await {
                                        tracing::warn!(fehler = %e, "Senden fehlgeschlagen");
                                        break Ende::Verloren;
                                    }
                                }
                                Message::Close(grund) => {
                                    tracing::info!(grund = ?grund, "Verbindung vom Server geschlossen");
                                    break Ende::Verloren;
                                }
                                _ => {}
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(fehler = %e, "Frame-Lesefehler");
                            break Ende::Verloren;
                        }
                        None => {
                            tracing::info!("Verbindung getrennt");
                            break Ende::Verloren;
                        }
                    }
                }

                // Kommandos der oeffentlichen API
                kommando = self.kommando_rx.recv() => {
                    match kommando {
                        Some(Command::Close { antwort }) => break Ende::Geschlossen(Some(antwort)),
                        Some(kommando) => {
                            if let Err(e) = self.kommando_verarbeiten(kommando).await {
                                tracing::warn!(fehler = %e, "Senden fehlgeschlagen");
                                break Ende::Verloren;
                            }
                        }
                        // Alle Handles gedroppt
                        None => break Ende::Geschlossen(None),
                    }
                }

                // Heartbeat
                _ = tokio::time::sleep_until(frist) => {
                    if ping_ausstehend {
                        tracing::warn!(intervall = ?self.heartbeat, "Heartbeat-Timeout – Verbindung tot");
                        break Ende::Verloren;
                    }
                    self.naechste_ping_id += 1;
                    let ping = Envelope::ping(Some(self.naechste_ping_id.to_string()));
                    if let Err(e) = self.senden(&ping).await {
                        tracing::warn!(fehler = %e, "Ping-Senden fehlgeschlagen");
                        break Ende::Verloren;
                    }
                    ping_ausstehend = true;
                    frist = Instant::now() + self.heartbeat;
                }
            }
        };

        self.abbauen(ende).await;
    }

    async fn frame_verarbeiten(&mut self, text: &str) -> RealtimeResult<()> {
        let envelope = match self.codec.decode(text) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::warn!(fehler = %e, "Frame nicht dekodierbar – verworfen");
                self.unlesbare_antwort(text, &e);
                return Ok(());
            }
        };

        tracing::trace!(kind = envelope.kind(), "Nachricht empfangen");

        match envelope {
            Envelope::Ping { id } => self.senden(&Envelope::pong(id)).await?,
            Envelope::Pong { .. } => {}
            Envelope::Result { id, result, error } => {
                let ergebnis = match error {
                    Some(fehler) => Err(RealtimeError::Server(fehler)),
                    None => Ok(result.unwrap_or(serde_json::Value::Null)),
                };
                self.calls.aufloesen(&id, ergebnis);
            }
            Envelope::Updated { methods } => {
                tracing::trace!(methods = ?methods, "Methoden-Effekte geschrieben");
            }
            Envelope::Ready { subs } => {
                for id in subs {
                    self.subs.bereit(&id);
                }
            }
            Envelope::Nosub { id, error } => self.subs.gestoppt(&id, error),
            diff if diff.ist_diff() => {
                if let Some(event) = self.collections.apply_diff(diff) {
                    self.bus.emit(BotEvent::Collection(event));
                }
            }
            Envelope::Error {
                reason,
                offending_message,
            } => {
                tracing::warn!(
                    grund = %reason,
                    nachricht = ?offending_message,
                    "Server meldet Protokollfehler"
                );
            }
            andere => {
                tracing::debug!(kind = andere.kind(), "Unerwartete Nachricht ignoriert");
            }
        }
        Ok(())
    }

    /// Loest den Wartenden einer nicht dekodierbaren `result`/`nosub`-Nachricht auf
    fn unlesbare_antwort(&mut self, text: &str, fehler: &CodecError) {
        let Some(kopf) = EnvelopeCodec::kopf(text) else {
            return;
        };
        let Some(id) = kopf.id else {
            return;
        };
        match kopf.msg.as_str() {
            "result" => {
                self.calls.aufloesen(
                    &id,
                    Err(RealtimeError::Transport(format!(
                        "Antwort nicht dekodierbar: {fehler}"
                    ))),
                );
            }
            "nosub" => self
                .subs
                .gestoppt(&id, Some(ServerError::neu("invalid-frame", fehler.to_string()))),
            _ => {}
        }
    }

    async fn kommando_verarbeiten(&mut self, kommando: Command) -> RealtimeResult<()> {
        match kommando {
            Command::Send { envelope } => self.senden(&envelope).await,
            Command::Call {
                method,
                params,
                antwort,
            } => {
                let id = self.calls.anmelden(antwort);
                tracing::debug!(call_id = %id, method = %method, "Methodenaufruf");
                self.senden(&Envelope::method(id, method, params)).await
            }
            Command::Subscribe { id, name, params } => {
                self.subs
                    .registrieren(id.clone(), name.clone(), params.clone());
                self.senden(&Envelope::sub(id, name, params)).await
            }
            Command::AwaitReady { id, antwort } => {
                self.subs.warten(&id, antwort);
                Ok(())
            }
            Command::Unsubscribe { id } => {
                if self.subs.entfernen(&id) {
                    tracing::debug!(sub_id = %id, "Subscription beendet");
                    self.senden(&Envelope::unsub(id)).await
                } else {
                    tracing::debug!(sub_id = %id, "unsubscribe fuer unbekannte Subscription");
                    Ok(())
                }
            }
            Command::Subscriptions { antwort } => {
                let _ = antwort.send(self.subs.ids());
                Ok(())
            }
            // Wird in der Schleife behandelt
            Command::Close { antwort } => {
                let _ = antwort.send(());
                Ok(())
            }
        }
    }

    async fn senden(&mut self, envelope: &Envelope) -> RealtimeResult<()> {
        let frame = match self.codec.encode(envelope) {
            Ok(frame) => frame,
            Err(e) => {
                // Einzelne Nachricht verwerfen, Verbindung bleibt bestehen
                tracing::error!(kind = envelope.kind(), fehler = %e, "Nachricht nicht kodierbar");
                return Ok(());
            }
        };
        self.ws.send(Message::Text(frame.into())).await?;
        Ok(())
    }

    fn status_setzen(&self, neu: ConnectionStatus) {
        let alt = self.status_tx.send_replace(neu);
        if alt != neu {
            tracing::debug!(von = %alt, nach = %neu, "Verbindungsstatus");
        }
    }

    async fn abbauen(mut self, ende: Ende) {
        let antwort = match ende {
            Ende::Geschlossen(antwort) => {
                self.status_setzen(ConnectionStatus::Disconnecting);
                if let Err(e) = self.ws.close(None).await {
                    tracing::debug!(fehler = %e, "WebSocket-Close fehlgeschlagen");
                }
                antwort
            }
            Ende::Verloren => None,
        };

        tracing::debug!(offene_calls = self.calls.anzahl(), "Verbindung wird abgebaut");
        self.calls.alle_abbrechen(RealtimeError::ConnectionLost);
        self.subs.alle_abbrechen(RealtimeError::ConnectionLost);
        self.collections.leeren();
        self.kommando_rx.close();

        // Bereits eingereihte Kommandos aufloesen
        while let Ok(kommando) = self.kommando_rx.try_recv() {
            match kommando {
                Command::Call { antwort, .. } => {
                    let _ = antwort.send(Err(RealtimeError::ConnectionLost));
                }
                Command::AwaitReady { antwort, .. } => {
                    let _ = antwort.send(Err(RealtimeError::ConnectionLost));
                }
                Command::Close { antwort } => {
                    let _ = antwort.send(());
                }
                _ => {}
            }
        }

        self.status_setzen(ConnectionStatus::Disconnected);
        if let Some(antwort) = antwort {
            let _ = antwort.send(());
        }
        tracing::info!("Verbindungs-Task beendet");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bbbot_core::CollectionEvent;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    type ServerWs = WebSocketStream<TcpStream>;

    /// Startet einen Ein-Verbindungs-Testserver und gibt dessen URL zurueck
    async fn test_server<F, Fut>(skript: F) -> (String, tokio::task::JoinHandle<()>)
    where
        F: FnOnce(ServerWs) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            skript(ws).await;
        });
        (format!("ws://{addr}/websocket"), handle)
    }

    /// Liest den naechsten Text-Frame als JSON (None bei Verbindungsende)
    async fn lesen(ws: &mut ServerWs) -> Option<Value> {
        while let Some(Ok(frame)) = ws.next().await {
            match frame {
                Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
        None
    }

    async fn schreiben(ws: &mut ServerWs, wert: Value) {
        ws.send(Message::Text(wert.to_string().into())).await.unwrap();
    }

    /// Server-Seite des Handshakes inkl. `server_id`-Begruessung
    async fn server_handshake(ws: &mut ServerWs) {
        schreiben(ws, json!({"server_id": "0"})).await;
        let connect = lesen(ws).await.unwrap();
        assert_eq!(connect["msg"], "connect");
        assert_eq!(connect["version"], "1");
        assert_eq!(connect["support"], json!(["1", "pre2", "pre1"]));
        schreiben(ws, json!({"msg": "connected", "session": "sess-1"})).await;
    }

    fn schnelle_config() -> ConnectionConfig {
        ConnectionConfig {
            handshake_timeout: Duration::from_millis(300),
            ..ConnectionConfig::default()
        }
    }

    async fn verbinden(url: &str) -> Connection {
        Connection::connect(url, &[], schnelle_config(), EventBus::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn handshake_erfolgreich_mit_cookies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (cookie_tx, cookie_rx) = oneshot::channel::<Option<String>>();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let cookie = req
                    .headers()
                    .get("cookie")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                let _ = cookie_tx.send(cookie);
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            server_handshake(&mut ws).await;
            // Offen halten bis der Client schliesst
            while lesen(&mut ws).await.is_some() {}
        });

        let cookies = vec!["JSESSIONID=abc".to_string(), "route=x".to_string()];
        let conn = Connection::connect(
            &format!("ws://{addr}/websocket"),
            &cookies,
            schnelle_config(),
            EventBus::new(),
        )
        .await
        .unwrap();

        assert_eq!(conn.session_id(), "sess-1");
        assert_eq!(conn.status(), ConnectionStatus::Connected);
        assert_eq!(
            cookie_rx.await.unwrap().as_deref(),
            Some("JSESSIONID=abc; route=x")
        );

        conn.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn handshake_failed_ist_fehler() {
        let (url, _server) = test_server(|mut ws| async move {
            let _ = lesen(&mut ws).await;
            schreiben(&mut ws, json!({"msg": "failed", "version": "pre1"})).await;
            let _ = lesen(&mut ws).await;
        })
        .await;

        let err = Connection::connect(&url, &[], schnelle_config(), EventBus::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::Handshake(_)), "{err}");
    }

    #[tokio::test]
    async fn handshake_timeout_ist_fehler() {
        let (url, _server) = test_server(|mut ws| async move {
            // Antwortet nie mit connected
            while lesen(&mut ws).await.is_some() {}
        })
        .await;

        let err = Connection::connect(&url, &[], schnelle_config(), EventBus::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RealtimeError::Handshake(_)), "{err}");
    }

    #[tokio::test]
    async fn socket_nicht_erreichbar_ist_transportfehler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Connection::connect(
            &format!("ws://{addr}/websocket"),
            &[],
            schnelle_config(),
            EventBus::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RealtimeError::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn calls_in_umgekehrter_reihenfolge_beantwortet() {
        let (url, server) = test_server(|mut ws| async move {
            server_handshake(&mut ws).await;
            let erster = lesen(&mut ws).await.unwrap();
            let zweiter = lesen(&mut ws).await.unwrap();
            for call in [zweiter, erster] {
                assert_eq!(call["msg"], "method");
                schreiben(
                    &mut ws,
                    json!({"msg": "result", "id": call["id"], "result": call["params"][0]}),
                )
                .await;
            }
            while lesen(&mut ws).await.is_some() {}
        })
        .await;

        let conn = verbinden(&url).await;
        let (a, b) = tokio::join!(
            conn.call("echo", vec![json!("a")]),
            conn.call("echo", vec![json!("b")])
        );
        assert_eq!(a.unwrap(), json!("a"));
        assert_eq!(b.unwrap(), json!("b"));

        conn.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn serverfehler_im_result() {
        let (url, _server) = test_server(|mut ws| async move {
            server_handshake(&mut ws).await;
            let call = lesen(&mut ws).await.unwrap();
            schreiben(
                &mut ws,
                json!({"msg": "result", "id": call["id"], "error": {"error": 403, "reason": "denied"}}),
            )
            .await;
            while lesen(&mut ws).await.is_some() {}
        })
        .await;

        let conn = verbinden(&url).await;
        match conn.call("geheim", vec![]).await {
            Err(RealtimeError::Server(e)) => assert_eq!(e.reason.as_deref(), Some("denied")),
            other => panic!("Unerwartet: {other:?}"),
        }
        conn.close().await;
    }

    #[tokio::test]
    async fn serverfehler_in_beliebiger_form() {
        let (url, _server) = test_server(|mut ws| async move {
            server_handshake(&mut ws).await;
            let erster = lesen(&mut ws).await.unwrap();
            let zweiter = lesen(&mut ws).await.unwrap();
            schreiben(&mut ws, json!({"msg": "result", "id": erster["id"], "error": "boom"})).await;
            schreiben(
                &mut ws,
                json!({"msg": "result", "id": zweiter["id"], "error": {"reason": "kein code"}}),
            )
            .await;
            while lesen(&mut ws).await.is_some() {}
        })
        .await;

        let conn = verbinden(&url).await;
        let (a, b) = tokio::time::timeout(
            Duration::from_secs(2),
            async { tokio::join!(conn.call("x", vec![]), conn.call("y", vec![])) },
        )
        .await
        .unwrap();

        match a {
            Err(RealtimeError::Server(e)) => assert_eq!(e.error, json!("boom")),
            other => panic!("Unerwartet: {other:?}"),
        }
        match b {
            Err(RealtimeError::Server(e)) => {
                assert_eq!(e.error, Value::Null);
                assert_eq!(e.reason.as_deref(), Some("kein code"));
            }
            other => panic!("Unerwartet: {other:?}"),
        }
        conn.close().await;
    }

    #[tokio::test]
    async fn zu_grosse_antworten_loesen_wartende_auf() {
        let (url, _server) = test_server(|mut ws| async move {
            server_handshake(&mut ws).await;
            let call = lesen(&mut ws).await.unwrap();
            let sub = lesen(&mut ws).await.unwrap();
            let gross = "x".repeat(1024);
            schreiben(&mut ws, json!({"msg": "result", "id": call["id"], "result": gross})).await;
            schreiben(&mut ws, json!({"msg": "nosub", "id": sub["id"], "error": {"details": gross}}))
                .await;
            while lesen(&mut ws).await.is_some() {}
        })
        .await;

        let config = ConnectionConfig {
            max_frame_size: 256,
            ..schnelle_config()
        };
        let conn = Connection::connect(&url, &[], config, EventBus::new())
            .await
            .unwrap();

        let call = conn.call("gross", vec![]);
        let sub = async {
            let id = conn.subscribe("users", vec![]).await.unwrap();
            conn.await_ready(&id).await
        };
        let (ergebnis, bereit) =
            tokio::time::timeout(Duration::from_secs(2), async { tokio::join!(call, sub) })
                .await
                .unwrap();

        assert!(matches!(ergebnis, Err(RealtimeError::Transport(_))), "{ergebnis:?}");
        match bereit {
            Err(RealtimeError::Server(e)) => assert_eq!(e.error, json!("invalid-frame")),
            other => panic!("Unerwartet: {other:?}"),
        }
        // Verbindung bleibt bestehen
        assert_eq!(conn.status(), ConnectionStatus::Connected);
        conn.close().await;
    }

    #[tokio::test]
    async fn ping_wird_mit_pong_beantwortet() {
        let (url, server) = test_server(|mut ws| async move {
            server_handshake(&mut ws).await;
            schreiben(&mut ws, json!({"msg": "ping", "id": "p1"})).await;
            let pong = lesen(&mut ws).await.unwrap();
            assert_eq!(pong, json!({"msg": "pong", "id": "p1"}));
            schreiben(&mut ws, json!({"msg": "ping"})).await;
            let pong = lesen(&mut ws).await.unwrap();
            assert_eq!(pong, json!({"msg": "pong"}));
        })
        .await;

        let conn = verbinden(&url).await;
        server.await.unwrap();
        drop(conn);
    }

    #[tokio::test]
    async fn verbindungsverlust_bricht_calls_und_wartende_ab() {
        const CALLS: usize = 3;
        const WARTENDE: usize = 2;

        let (url, _server) = test_server(|mut ws| async move {
            server_handshake(&mut ws).await;
            // Warten bis alle Calls und Subscriptions angekommen sind, dann hart trennen
            let mut gesehen = 0;
            while gesehen < CALLS + WARTENDE {
                if lesen(&mut ws).await.is_none() {
                    return;
                }
                gesehen += 1;
            }
            drop(ws);
        })
        .await;

        let conn = verbinden(&url).await;

        let mut aufgaben = Vec::new();
        for i in 0..CALLS {
            let c = conn.clone();
            aufgaben.push(tokio::spawn(async move {
                c.call("haengt", vec![json!(i)]).await.map(|_| ())
            }));
        }
        for _ in 0..WARTENDE {
            let id = conn.subscribe("users", vec![]).await.unwrap();
            let c = conn.clone();
            aufgaben.push(tokio::spawn(async move { c.await_ready(&id).await }));
        }

        for aufgabe in aufgaben {
            let ergebnis = tokio::time::timeout(Duration::from_secs(5), aufgabe)
                .await
                .unwrap()
                .unwrap();
            assert!(
                matches!(ergebnis, Err(RealtimeError::ConnectionLost)),
                "{ergebnis:?}"
            );
        }

        let mut status = conn.status_watch();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| *s == ConnectionStatus::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(conn.send(Envelope::ping(None)).await.is_err());
    }

    #[tokio::test]
    async fn heartbeat_sendet_ping_und_erkennt_toten_server() {
        let (url, server) = test_server(|mut ws| async move {
            server_handshake(&mut ws).await;
            let ping = lesen(&mut ws).await.unwrap();
            assert_eq!(ping["msg"], "ping");
            // Kein pong – Verbindung muss vom Client abgebaut werden
            while lesen(&mut ws).await.is_some() {}
        })
        .await;

        let config = ConnectionConfig {
            heartbeat_intervall: Duration::from_millis(150),
            ..schnelle_config()
        };
        let conn = Connection::connect(&url, &[], config, EventBus::new())
            .await
            .unwrap();

        let mut status = conn.status_watch();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| *s == ConnectionStatus::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(matches!(
            conn.call("x", vec![]).await,
            Err(RealtimeError::ConnectionLost)
        ));
        drop(conn);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn subscription_lebenszyklus() {
        let (url, server) = test_server(|mut ws| async move {
            server_handshake(&mut ws).await;
            let sub1 = lesen(&mut ws).await.unwrap();
            let sub2 = lesen(&mut ws).await.unwrap();
            assert_eq!(sub1["msg"], "sub");
            assert_eq!(sub1["name"], "current-user");
            schreiben(&mut ws, json!({"msg": "ready", "subs": [sub1["id"]]})).await;
            schreiben(&mut ws, json!({"msg": "nosub", "id": sub2["id"]})).await;
            let unsub = lesen(&mut ws).await.unwrap();
            assert_eq!(unsub, json!({"msg": "unsub", "id": sub1["id"]}));
            // nosub nach unsub ist nur eine Diagnose
            schreiben(&mut ws, json!({"msg": "nosub", "id": sub1["id"]})).await;
            while lesen(&mut ws).await.is_some() {}
        })
        .await;

        let conn = verbinden(&url).await;
        let s1 = conn.subscribe("current-user", vec![]).await.unwrap();
        let s2 = conn.subscribe("current-user", vec![]).await.unwrap();
        assert_ne!(s1, s2);

        conn.await_ready(&s1).await.unwrap();
        // Bereits bereit: sofort
        conn.await_ready(&s1).await.unwrap();
        match conn.await_ready(&s2).await {
            Err(RealtimeError::Server(e)) => {
                assert_eq!(e.reason.as_deref(), Some("subscription stopped"))
            }
            other => panic!("Unerwartet: {other:?}"),
        }
        assert!(matches!(
            conn.await_ready("unbekannt").await,
            Err(RealtimeError::UnknownSubscription(_))
        ));

        conn.unsubscribe(&s1).await.unwrap();
        let ids = conn.subscriptions().await.unwrap();
        assert_eq!(ids, vec![s2.clone()]);

        conn.close().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn diffs_landen_im_spiegel_und_auf_dem_bus() {
        let (url, _server) = test_server(|mut ws| async move {
            server_handshake(&mut ws).await;
            schreiben(
                &mut ws,
                json!({"msg": "added", "collection": "users", "id": "u1", "fields": {"name": "Anna"}}),
            )
            .await;
            schreiben(
                &mut ws,
                json!({"msg": "changed", "collection": "users", "id": "u1", "fields": {"name": "Bea"}}),
            )
            .await;
            while lesen(&mut ws).await.is_some() {}
        })
        .await;

        let bus = EventBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<CollectionEvent>();
        bus.on::<CollectionEvent, _>(move |ev| {
            let _ = tx.send(ev.clone());
        });

        let conn = Connection::connect(&url, &[], schnelle_config(), bus)
            .await
            .unwrap();

        let erstes = rx.recv().await.unwrap();
        assert_eq!(erstes.document_id, "u1");
        let zweites = rx.recv().await.unwrap();
        assert_eq!(
            zweites.document.unwrap().get("name"),
            Some(&json!("Bea"))
        );
        assert_eq!(
            conn.collections().document("users", "u1").unwrap().get("name"),
            Some(&json!("Bea"))
        );

        conn.close().await;
        assert!(conn.collections().snapshot("users").is_empty());
    }

    #[tokio::test]
    async fn close_ist_idempotent() {
        let (url, server) = test_server(|mut ws| async move {
            server_handshake(&mut ws).await;
            while lesen(&mut ws).await.is_some() {}
        })
        .await;

        let conn = verbinden(&url).await;
        let c2 = conn.clone();
        tokio::join!(conn.close(), c2.close());
        conn.close().await;

        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        assert!(matches!(
            conn.send(Envelope::ping(None)).await,
            Err(RealtimeError::Transport(_))
        ));
        server.await.unwrap();
    }
}
