//! bbbot – Bibliotheks-Root
//!
//! Baut aus der Konfiguration einen Session-Client und betreibt den Bot
//! bis zum Shutdown-Signal.

pub mod config;

use std::sync::Arc;

use anyhow::Result;
use bbbot_api::{ApiRequest, ShaType};
use bbbot_core::ChatMessage;
use bbbot_session::{Client, MAIN_PUBLIC_GROUP_CHAT};
use config::BotConfig;
use tokio::sync::mpsc;

/// Antwort des Bots auf eine Chat-Nachricht
pub fn antwort_auf(nachricht: &str) -> Option<&'static str> {
    nachricht
        .trim()
        .eq_ignore_ascii_case("ping")
        .then_some("pong")
}

/// Haelt den laufenden Bot zusammen
pub struct Bot {
    pub config: BotConfig,
    client: Client,
}

impl Bot {
    /// Erstellt den Bot (REST-Client und Session-Client)
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn neu(config: BotConfig) -> Result<Self> {
        let api = ApiRequest::neu(
            &config.bbb.api.url,
            &config.bbb.api.secret,
            ShaType::from(config.bbb.api.sha.as_str()),
        )?;
        let client = Client::neu(config.client_config(), Arc::new(api));
        Ok(Self { config, client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Tritt dem Meeting bei und laeuft bis Ctrl-C
    ///
    /// Reihenfolge:
    /// 1. Status- und Chat-Handler registrieren
    /// 2. Meeting beitreten
    /// 3. Auf Ctrl-C warten
    /// 4. Meeting verlassen
    pub async fn starten(self) -> Result<()> {
        if self.config.bot.meeting_id.is_empty() {
            anyhow::bail!("Keine Meeting-ID konfiguriert ([bot] meeting_id)");
        }

        self.client.on_status(|s| {
            tracing::info!(von = %s.previous, nach = %s.current, "Statuswechsel");
        });

        let (chat_tx, chat_rx) = mpsc::unbounded_channel::<ChatMessage>();
        self.client
            .on_chat_message(move |m| {
                let _ = chat_tx.send(m.clone());
            })
            .await?;
        let antworter = tokio::spawn(chat_beantworten(self.client.clone(), chat_rx));

        tracing::info!(
            meeting_id = %self.config.bot.meeting_id,
            name = %self.config.bot.name,
            moderator = self.config.bot.moderator,
            "Bot tritt bei"
        );
        self.client
            .join(
                &self.config.bot.meeting_id,
                &self.config.bot.name,
                self.config.bot.moderator,
            )
            .await?;

        tracing::info!("Bot laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Bot verlaesst das Meeting");

        antworter.abort();
        if let Err(e) = self.client.leave().await {
            tracing::warn!(fehler = %e, "Verlassen fehlgeschlagen");
        }
        Ok(())
    }
}

/// Beantwortet Chat-Nachrichten anderer Teilnehmer
async fn chat_beantworten(client: Client, mut rx: mpsc::UnboundedReceiver<ChatMessage>) {
    while let Some(nachricht) = rx.recv().await {
        let eigene_id = client.credentials().await.map(|c| c.internal_user_id);
        if eigene_id.as_deref() == Some(nachricht.sender.as_str()) {
            continue;
        }
        let Some(antwort) = antwort_auf(&nachricht.message) else {
            continue;
        };

        let chat_id = if nachricht.chat_id.is_empty() {
            MAIN_PUBLIC_GROUP_CHAT
        } else {
            nachricht.chat_id.as_str()
        };
        tracing::debug!(von = %nachricht.sender_name, chat_id = %chat_id, "Antworte");
        if let Err(e) = client.send_chat_message(antwort, chat_id).await {
            tracing::warn!(fehler = %e, "Antwort konnte nicht gesendet werden");
        }
    }
}
