//! Audio-Kanal – Paketweiterleitung aus einer externen Medienquelle
//!
//! Die Quelle (`MediaSource`) liefert Tracks; pro Audio-Track laeuft ein
//! Task der Rohpakete an die registrierten Handler verteilt. Ueber Codecs
//! werden keine Annahmen getroffen.
//!
//! ## Lebenszyklus
//! - `listen_to_audio()` startet die Quelle (nur in einer aktiven Session)
//! - Jeder Track-Task endet bei `close()`, bei Track-Ende oder sobald die
//!   Session `Disconnected` ist

use std::sync::Arc;

use async_trait::async_trait;
use bbbot_core::ConnectionStatus;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::client::Client;
use crate::error::{SessionError, SessionResult};

/// Fehler einer externen Medienquelle
pub type MediaError = Box<dyn std::error::Error + Send + Sync>;

/// Art eines Medien-Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Ein Medien-Track der Quelle
#[async_trait]
pub trait MediaTrack: Send {
    fn kind(&self) -> TrackKind;

    fn id(&self) -> String;

    /// Naechstes Rohpaket; `None` wenn der Track beendet ist
    async fn read_packet(&mut self) -> Result<Option<Bytes>, MediaError>;
}

/// Externe Medienquelle (z.B. WebRTC-Stack)
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Startet die Quelle; neue Tracks kommen ueber den Receiver
    async fn start(&self) -> Result<mpsc::Receiver<Box<dyn MediaTrack>>, MediaError>;

    async fn stop(&self);
}

/// Ein empfangenes Audio-Paket
#[derive(Debug, Clone)]
pub struct AudioPacket {
    pub track_id: String,
    pub data: Bytes,
}

type PacketHandler = Arc<dyn Fn(&AudioPacket) + Send + Sync>;
type HandlerListe = Arc<RwLock<Vec<PacketHandler>>>;

/// An die Session gebundener Audio-Kanal
pub struct AudioChannel {
    client: Client,
    source: Arc<dyn MediaSource>,
    handler: HandlerListe,
    stop_tx: watch::Sender<bool>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Client {
    /// Erstellt einen Audio-Kanal fuer diese Session
    pub fn create_audio_channel(&self, source: Arc<dyn MediaSource>) -> AudioChannel {
        let (stop_tx, _) = watch::channel(false);
        AudioChannel {
            client: self.clone(),
            source,
            handler: Arc::new(RwLock::new(Vec::new())),
            stop_tx,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl AudioChannel {
    /// Registriert einen Handler fuer Audio-Pakete
    pub fn on_packet<F>(&self, handler: F)
    where
        F: Fn(&AudioPacket) + Send + Sync + 'static,
    {
        self.handler.write().push(Arc::new(handler));
    }

    /// Startet die Paketweiterleitung
    pub async fn listen_to_audio(&self) -> SessionResult<()> {
        if !self.client.status().ist_verbunden() {
            return Err(SessionError::NotInMeeting);
        }

        self.stop_tx.send_replace(false);
        let mut tracks = self
            .source
            .start()
            .await
            .map_err(|e| SessionError::Audio(e.to_string()))?;
        tracing::info!("Audio-Empfang gestartet");

        let handler = Arc::clone(&self.handler);
        let tasks = Arc::clone(&self.tasks);
        let status_rx = self.client.status_watch();
        let mut stop_rx = self.stop_tx.subscribe();

        let verteiler = tokio::spawn(async move {
            loop {
                tokio::select! {
                    track = tracks.recv() => {
                        let Some(track) = track else { break };
                        if track.kind() != TrackKind::Audio {
                            tracing::debug!(track_id = %track.id(), "Nicht-Audio-Track ignoriert");
                            continue;
                        }
                        tracing::debug!(track_id = %track.id(), "Audio-Track gestartet");
                        let task = tokio::spawn(track_lesen(
                            track,
                            Arc::clone(&handler),
                            status_rx.clone(),
                            stop_rx.clone(),
                        ));
                        tasks.lock().push(task);
                    }
                    res = stop_rx.changed() => {
                        if res.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
        self.tasks.lock().push(verteiler);
        Ok(())
    }

    /// Stoppt die Weiterleitung und die Quelle
    pub async fn close(&self) {
        self.stop_tx.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
        }
        self.source.stop().await;
        tracing::info!("Audio-Kanal geschlossen");
    }
}

async fn track_lesen(
    mut track: Box<dyn MediaTrack>,
    handler: HandlerListe,
    mut status_rx: watch::Receiver<ConnectionStatus>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let track_id = track.id();
    loop {
        if *stop_rx.borrow() || *status_rx.borrow() == ConnectionStatus::Disconnected {
            break;
        }

        tokio::select! {
            paket = track.read_packet() => match paket {
                Ok(Some(data)) => {
                    let paket = AudioPacket { track_id: track_id.clone(), data };
                    let liste: Vec<PacketHandler> = handler.read().clone();
                    for h in liste {
                        h(&paket);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(track_id = %track_id, fehler = %e, "Audio-Track fehlgeschlagen");
                    break;
                }
            },
            res = status_rx.changed() => {
                if res.is_err() {
                    break;
                }
            }
            res = stop_rx.changed() => {
                if res.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(track_id = %track_id, "Audio-Track beendet");
}
