//! # yumi-sync: Sync Engine for the Ynison Bridge
//!
//! Everything between the pure wire model ([`yumi_core`]) and the binary:
//! the two-phase Ynison handshake, one persistent state session per
//! identity, the read-only metadata collaborator and the coordinator that
//! mirrors leader state to participants.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           yumi-sync                                     │
//! │                                                                         │
//! │  ┌───────────┐   fresh redirect    ┌───────────────────────────────┐   │
//! │  │ redirect  │◄────────────────────│ session (one per identity)    │   │
//! │  │ resolver  │  host + ticket ────►│  owns write half              │   │
//! │  └───────────┘                     │  reader task ──► event chan   │   │
//! │                                    └───────────────┬───────────────┘   │
//! │  ┌───────────┐                                     │                   │
//! │  │ metadata  │◄─────────── readouts only           ▼                   │
//! │  │ (HTTP)    │                     ┌───────────────────────────────┐   │
//! │  └───────────┘                     │ coordinator (single consumer) │   │
//! │                                    │  host registry  • rate gate   │   │
//! │  ┌───────────┐                     │  translate + fan out          │   │
//! │  │ config    │────────────────────►│  health-tick reconnects       │   │
//! │  │ TOML+env  │                     └───────────────────────────────┘   │
//! │  └───────────┘                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod metadata;
pub mod readout;
pub mod redirect;
pub mod registry;
pub mod session;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::BridgeConfig;
pub use coordinator::{RunState, SyncCoordinator};
pub use error::{SyncError, SyncResult};
pub use gate::BroadcastGate;
pub use metadata::{AccountInfo, MetadataClient, TrackInfo};
pub use redirect::{RedirectResolver, RoutingTarget};
pub use registry::HostRegistry;
pub use session::{SessionEvent, SessionState, StateSession};
