//! bbbot-protocol – Echtzeit-Protokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichten die zwischen Bot und
//! Konferenz-Server ueber die WebSocket-Verbindung ausgetauscht werden,
//! sowie den Codec fuer Text-Frames.

pub mod envelope;
pub mod wire;

pub use envelope::{Envelope, PROTOKOLL_VERSION, UNTERSTUETZTE_VERSIONEN};
pub use wire::{CodecError, EnvelopeCodec, FrameKopf, DEFAULT_MAX_FRAME_SIZE};
