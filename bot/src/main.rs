//! bbbot – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Bot.

use anyhow::Result;
use bbbot::{config::BotConfig, Bot};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("BBBOT_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = BotConfig::laden(&config_pfad)?;

    bbbot_observability::logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        api = %config.bbb.api.url,
        "bbbot wird initialisiert"
    );

    Bot::neu(config)?.starten().await
}
