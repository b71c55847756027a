//! # yumi-core: Pure Wire Model and Translation for the Ynison Bridge
//!
//! This crate is the **heart** of the bridge. It contains the Ynison wire
//! schemas and the leader-to-participant translation as pure functions with
//! zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Yumi Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/bridge (CLI)                            │   │
//! │  │        config load ──► coordinator run ──► ctrl-c shutdown      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 yumi-sync (Sync Engine)                         │   │
//! │  │    redirect handshake, state sessions, coordinator, metadata    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ yumi-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   model   │  │ translate │  │ snapshot  │  │   error   │  │   │
//! │  │   │ wire types│  │ leader →  │  │ initial   │  │ translate │  │   │
//! │  │   │ (serde)   │  │participant│  │ full state│  │ skip      │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO SOCKETS • NO CLOCK READS • PURE FUNCTIONS        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`model`] - Ynison wire types (strict outbound, lenient inbound)
//! - [`snapshot`] - Initial full-state snapshot construction
//! - [`translate`] - Leader-to-participant state translation
//! - [`error`] - Translation error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: the wall clock and request ids are injected by the
//!    caller, so every function is deterministic
//! 2. **No I/O**: sockets, HTTP, clocks and randomness are FORBIDDEN here
//! 3. **Explicit Schemas**: outbound fields are enumerated exactly; unset
//!    optionals serialize as explicit null, never by omission

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod model;
pub mod snapshot;
pub mod translate;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::TranslateError;
pub use model::{
    DeviceIdentity, InboundMessage, PlaybackStatus, PlayerQueue, PlayerState, QueueTrack, Role,
    StateEnvelope, VersionStamp,
};
pub use snapshot::initial_snapshot;
pub use translate::translate;
