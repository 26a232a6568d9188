//! Client – Session-Orchestrierung
//!
//! Der `Client` ist das nach aussen sichtbare Session-Objekt. Er sequenziert
//! den Beitritt (REST-Join -> Protokoll-Handshake -> `current-user` ->
//! `validateAuthToken`) und das Verlassen eines Meetings.
//!
//! ## Zustand
//! - `ClientConfig` ist unveraenderlich und wird beim Erstellen uebergeben
//! - Der veraenderliche Session-Zustand (`ActiveSession`) existiert nur
//!   zwischen erfolgreichem `join` und `leave` bzw. Verbindungsverlust
//! - Der Status wird ueber einen `watch`-Kanal und `Status`-Events verteilt

use std::sync::{Arc, Weak};
use std::time::Duration;

use bbbot_api::{JoinApi, JoinCredentials};
use bbbot_core::{ConnectionStatus, StatusChange};
use bbbot_realtime::{Connection, ConnectionConfig, EventBus, HandlerId};
use serde_json::json;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{SessionError, SessionResult};

/// Maximale Anzahl Pruefungen in `leave()` waehrend ein Join laeuft
pub const LEAVE_POLL_ATTEMPTS: u32 = 5;

/// Abstand zwischen zwei Pruefungen in `leave()`
pub const LEAVE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Publikation die bei jedem Join abonniert wird
const CURRENT_USER: &str = "current-user";

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Unveraenderliche Session-Konfiguration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Basis-URL des HTML5-Clients
    pub client_url: String,
    /// WebSocket-URL des Echtzeit-Endpunkts
    pub client_ws_url: String,
    pub verbindung: ConnectionConfig,
}

// ---------------------------------------------------------------------------
// Session-Zustand
// ---------------------------------------------------------------------------

/// Zustand einer beigetretenen Session
pub(crate) struct ActiveSession {
    pub(crate) connection: Connection,
    pub(crate) credentials: JoinCredentials,
    pub(crate) user_name: String,
    /// Publikationsname -> Subscription-ID
    pub(crate) publikationen: Vec<(String, String)>,
    waechter: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn hat_publikation(&self, name: &str) -> bool {
        self.publikationen.iter().any(|(n, _)| n == name)
    }
}

pub(crate) struct ClientInner {
    config: ClientConfig,
    api: Arc<dyn JoinApi>,
    pub(crate) bus: EventBus,
    status_tx: watch::Sender<ConnectionStatus>,
    pub(crate) sitzung: Mutex<Option<ActiveSession>>,
    /// Von Features angeforderte Publikationen (werden bei jedem Join abonniert)
    angefordert: parking_lot::Mutex<Vec<&'static str>>,
}

impl ClientInner {
    fn status_setzen(&self, neu: ConnectionStatus) {
        let alt = self.status_tx.send_replace(neu);
        if alt != neu {
            tracing::info!(von = %alt, nach = %neu, "Session-Status");
            self.bus.emit_payload(StatusChange {
                previous: alt,
                current: neu,
            });
        }
    }

    /// Setzt den Status nur wenn er aktuell `von` ist
    fn status_wechsel(&self, von: ConnectionStatus, nach: ConnectionStatus) -> bool {
        let geaendert = self.status_tx.send_if_modified(|status| {
            if *status == von {
                *status = nach;
                true
            } else {
                false
            }
        });
        if geaendert {
            tracing::info!(von = %von, nach = %nach, "Session-Status");
            self.bus.emit_payload(StatusChange {
                previous: von,
                current: nach,
            });
        }
        geaendert
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Bot-Client fuer ein Meeting
///
/// Klonbar; alle Klone teilen dieselbe Session.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl Client {
    /// Erstellt einen Client
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden (Event-Bus).
    pub fn neu(config: ClientConfig, api: Arc<dyn JoinApi>) -> Self {
        let bus = EventBus::new();
        crate::chat::weiterleitung_registrieren(&bus);
        crate::presence::weiterleitung_registrieren(&bus);

        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(ClientInner {
                config,
                api,
                bus,
                status_tx,
                sitzung: Mutex::new(None),
                angefordert: parking_lot::Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Event-Bus der Session
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Aktueller Session-Status
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status_tx.borrow()
    }

    /// Beobachter fuer Statuswechsel
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Registriert einen Handler fuer Statuswechsel
    pub fn on_status<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.inner.bus.on::<StatusChange, _>(handler)
    }

    /// Zugangsdaten der aktiven Session
    pub async fn credentials(&self) -> Option<JoinCredentials> {
        self.inner
            .sitzung
            .lock()
            .await
            .as_ref()
            .map(|s| s.credentials.clone())
    }

    /// Tritt einem Meeting bei
    ///
    /// # Fehler
    /// - `AlreadyJoined` wenn der Status nicht `Disconnected` ist
    /// - `JoinRejected` wenn der REST-Join fehlschlaegt
    /// - `Realtime` bei Verbindungs- oder Subscription-Fehlern
    /// - `AuthTokenInvalid` wenn `validateAuthToken` fehlschlaegt
    ///
    /// Bei jedem Fehler ist der Status danach `Disconnected` und es bleibt
    /// weder Verbindung noch Subscription zurueck.
    pub async fn join(&self, meeting_id: &str, user_name: &str, moderator: bool) -> SessionResult<()> {
        if !self
            .inner
            .status_wechsel(ConnectionStatus::Disconnected, ConnectionStatus::Connecting)
        {
            return Err(SessionError::AlreadyJoined);
        }

        tracing::info!(meeting_id = %meeting_id, user = %user_name, moderator, "Join");

        let credentials = match self.inner.api.join(meeting_id, user_name, moderator).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(fehler = %e, "REST-Join fehlgeschlagen");
                self.inner.status_setzen(ConnectionStatus::Disconnected);
                return Err(SessionError::JoinRejected(e));
            }
        };

        let connection = match Connection::connect(
            &self.inner.config.client_ws_url,
            &credentials.cookies,
            self.inner.config.verbindung.clone(),
            self.inner.bus.clone(),
        )
        .await
        {
            Ok(c) => c,
            Err(e) => {
                self.inner.status_setzen(ConnectionStatus::Disconnected);
                return Err(e.into());
            }
        };

        let mut subs = Vec::new();
        if let Err(e) = self.authentifizieren(&connection, &credentials, &mut subs).await {
            tracing::warn!(fehler = %e, "Join fehlgeschlagen – Rollback");
            for (_, id) in &subs {
                let _ = connection.unsubscribe(id).await;
            }
            connection.close().await;
            self.inner.status_setzen(ConnectionStatus::Disconnected);
            return Err(e);
        }

        let mut sitzung = self.inner.sitzung.lock().await;

        // Von Features angeforderte Publikationen
        let angefordert: Vec<&'static str> = self.inner.angefordert.lock().clone();
        for name in angefordert {
            match connection.subscribe(name, vec![]).await {
                Ok(id) => subs.push((name.to_string(), id)),
                Err(e) => tracing::warn!(publikation = name, fehler = %e, "Subscription fehlgeschlagen"),
            }
        }

        let status_rx = connection.status_watch();
        *sitzung = Some(ActiveSession {
            connection,
            credentials,
            user_name: user_name.to_string(),
            publikationen: subs,
            waechter: None,
        });
        self.inner.status_setzen(ConnectionStatus::Connected);

        let waechter = tokio::spawn(verbindung_beobachten(Arc::downgrade(&self.inner), status_rx));
        if let Some(s) = sitzung.as_mut() {
            s.waechter = Some(waechter);
        }

        Ok(())
    }

    async fn authentifizieren(
        &self,
        connection: &Connection,
        credentials: &JoinCredentials,
        subs: &mut Vec<(String, String)>,
    ) -> SessionResult<()> {
        let id = connection.subscribe(CURRENT_USER, vec![]).await?;
        subs.push((CURRENT_USER.to_string(), id.clone()));
        connection.await_ready(&id).await?;

        connection
            .call(
                "validateAuthToken",
                vec![
                    json!(credentials.internal_meeting_id),
                    json!(credentials.internal_user_id),
                    json!(credentials.auth_token),
                    json!(credentials.internal_user_id),
                ],
            )
            .await
            .map_err(SessionError::AuthTokenInvalid)?;

        tracing::debug!(user_id = %credentials.internal_user_id, "Auth-Token validiert");
        Ok(())
    }

    /// Verlaesst das Meeting
    ///
    /// Laeuft gerade ein Join, wird bis zu `LEAVE_POLL_ATTEMPTS` mal im
    /// Abstand von `LEAVE_POLL_INTERVAL` auf `Connected` gewartet.
    pub async fn leave(&self) -> SessionResult<()> {
        let mut versuche = 0;
        loop {
            match self.status() {
                ConnectionStatus::Connected => break,
                ConnectionStatus::Connecting if versuche < LEAVE_POLL_ATTEMPTS => {
                    versuche += 1;
                    tracing::debug!(versuch = versuche, "Join laeuft noch – warte auf Connected");
                    tokio::time::sleep(LEAVE_POLL_INTERVAL).await;
                }
                _ => return Err(SessionError::NotInMeeting),
            }
        }

        if !self
            .inner
            .status_wechsel(ConnectionStatus::Connected, ConnectionStatus::Disconnecting)
        {
            return Err(SessionError::NotInMeeting);
        }

        let Some(sitzung) = self.inner.sitzung.lock().await.take() else {
            self.inner.status_setzen(ConnectionStatus::Disconnected);
            return Err(SessionError::NotInMeeting);
        };
        if let Some(waechter) = &sitzung.waechter {
            waechter.abort();
        }

        let frist = self.inner.config.verbindung.handshake_timeout;
        for (methode, params) in [
            ("userLeftMeeting", vec![]),
            ("setExitReason", vec![json!("logout")]),
        ] {
            match tokio::time::timeout(frist, sitzung.connection.call(methode, params)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(methode, fehler = %e, "Abmelde-Aufruf fehlgeschlagen"),
                Err(_) => tracing::warn!(methode, "Abmelde-Aufruf ohne Antwort"),
            }
        }

        sitzung.connection.close().await;
        self.inner.status_setzen(ConnectionStatus::Disconnected);
        tracing::info!("Meeting verlassen");
        Ok(())
    }

    /// Verbindung und Identitaet der aktiven Session
    pub(crate) async fn aktive_verbindung(&self) -> SessionResult<(Connection, String, String)> {
        if !self.status().ist_verbunden() {
            return Err(SessionError::NotInMeeting);
        }
        self.inner
            .sitzung
            .lock()
            .await
            .as_ref()
            .map(|s| {
                (
                    s.connection.clone(),
                    s.credentials.internal_user_id.clone(),
                    s.user_name.clone(),
                )
            })
            .ok_or(SessionError::NotInMeeting)
    }

    /// Fordert eine Publikation an (einmal pro Session)
    ///
    /// Ohne aktive Session wird sie beim naechsten Join abonniert.
    pub(crate) async fn publikation_anfordern(&self, name: &'static str) -> SessionResult<()> {
        {
            let mut angefordert = self.inner.angefordert.lock();
            if !angefordert.contains(&name) {
                angefordert.push(name);
            }
        }

        let mut sitzung = self.inner.sitzung.lock().await;
        if let Some(s) = sitzung.as_mut() {
            if !s.hat_publikation(name) {
                let id = s.connection.subscribe(name, vec![]).await?;
                tracing::debug!(publikation = name, sub_id = %id, "Publikation abonniert");
                s.publikationen.push((name.to_string(), id));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("status", &self.status())
            .field("client_url", &self.inner.config.client_url)
            .finish()
    }
}

/// Setzt die Session auf `Disconnected` sobald die Verbindung wegbricht
async fn verbindung_beobachten(
    inner: Weak<ClientInner>,
    mut status_rx: watch::Receiver<ConnectionStatus>,
) {
    let _ = status_rx
        .wait_for(|s| *s == ConnectionStatus::Disconnected)
        .await;

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut sitzung = inner.sitzung.lock().await;
    if inner.status_wechsel(ConnectionStatus::Connected, ConnectionStatus::Disconnected) {
        tracing::warn!("Verbindung verloren – Session beendet");
        sitzung.take();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
