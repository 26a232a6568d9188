//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `BBBOT_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder
//!   `bbbot_realtime=debug,info`), Standard aus der Konfiguration
//! - `BBBOT_LOG_FORMAT`: Format (text/json), Standard aus der Konfiguration

use anyhow::anyhow;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "BBBOT_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "BBBOT_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor `level` / `format`. Ein ungueltiger
/// Filter faellt auf `info` zurueck. Schlaegt fehl wenn bereits ein globaler
/// Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let env_format = std::env::var(LOG_FORMAT_ENV).ok();
    let format = format_waehlen(env_format.as_deref(), format);

    let ergebnis = match format {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|e| anyhow!("Logging konnte nicht initialisiert werden: {e}"))
}

/// Waehlt das Format: gueltiger Env-Wert vor Konfigurationswert, sonst `text`
fn format_waehlen<'a>(env: Option<&'a str>, konfiguriert: &'a str) -> &'a str {
    match env {
        Some(f) if log_format_gueltig(f) => f,
        _ if log_format_gueltig(konfiguriert) => konfiguriert,
        _ => "text",
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
