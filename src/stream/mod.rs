//! Streaming session pipeline.
//!
//! ```text
//! ┌───────────┐    ┌───────────┐    ┌────────────┐    ┌────────────┐
//! │  Stream   │───▶│  Message  │───▶│  Session   │───▶│ caller     │
//! │ Transport │    │  Decoder  │    │ Controller │    │ events     │
//! └───────────┘    └───────────┘    └─────┬──────┘    └────────────┘
//!   raw bytes        event lines          │ audio chunks
//!                                   ┌─────▼──────┐    ┌────────────┐
//!                                   │ Reassembly │───▶│  Playback  │───▶ voices
//!                                   │   Buffer   │    │ Scheduler  │
//!                                   └────────────┘    └────────────┘
//!                                    ordered release    gapless, in order
//! ```
//!
//! Text messages are forwarded to the caller directly; audio messages are
//! decoded and buffered until their sequence id comes up, then played.

pub mod buffer;
pub mod controller;
pub mod decoder;
pub mod events;
pub mod message;
pub mod scheduler;
pub mod transport;

pub use buffer::{AddOutcome, ReassemblyBuffer};
pub use controller::{SessionController, SessionHandle, SessionState};
pub use decoder::MessageDecoder;
pub use events::SessionEvent;
pub use message::{StreamMessage, WireEvent};
pub use scheduler::PlaybackScheduler;
pub use transport::{StreamTransport, TransportEvent, TransportHandle};
