//! bbbot-session – Session-Orchestrierung
//!
//! Verbindet REST-Join und Echtzeit-Verbindung zu einer Meeting-Session und
//! stellt die Features darauf bereit.
//!
//! ## Module
//! - `client` – Join/Leave, Status, Session-Zustand
//! - `chat` – Gruppen-Chat empfangen und senden
//! - `presence` – Teilnehmer-Aenderungen
//! - `audio` – Paketweiterleitung aus einer externen Medienquelle

pub mod audio;
pub mod chat;
pub mod client;
pub mod error;
pub mod presence;

#[cfg(test)]
mod testserver;

pub use audio::{AudioChannel, AudioPacket, MediaError, MediaSource, MediaTrack, TrackKind};
pub use chat::MAIN_PUBLIC_GROUP_CHAT;
pub use client::{Client, ClientConfig, LEAVE_POLL_ATTEMPTS, LEAVE_POLL_INTERVAL};
pub use error::{SessionError, SessionResult};
