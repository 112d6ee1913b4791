//! Session Controller Library
//!
//! Everything one room member runs once it holds a room code:
//!
//! - Full-mesh peer connection setup over a broadcast relay
//! - A per-participant cognitive signal model ticked once per second
//! - Hysteresis alerts over the metric stream
//! - Adaptive moderation: warnings, coaching, and host-driven eviction
//!
//! # Architecture
//!
//! ```text
//! SessionActor (one per room membership)
//! ├── RelayLink (room-scoped broadcast, join/heartbeat/probe)
//! ├── PeerMeshOrchestrator
//! │   └── PeerLinkActor (one per remote peer)
//! │       └── MediaTransport
//! └── tick loop, per tracked participant:
//!     CognitiveSignalModel -> AlertLifecycleEngine -> ModerationEngine
//! ```
//!
//! # Key Design Decisions
//!
//! - **No shared mutable state**: each session owns its roster, links and
//!   monitors; links run on their own tasks and report back over a channel
//! - **Loss-tolerant signaling**: the relay keeps nothing, so membership
//!   converges through repeated announcements and heartbeats
//! - **Host authority**: only the host simulates moderation signals and
//!   issues evictions
//! - **Terminal eviction**: a kicked participant never returns to the active
//!   set under the same id
//!
//! # Modules
//!
//! - [`actors`] - Session and peer link actors
//! - [`mesh`] - Orchestrator and link state machine
//! - [`cognitive`] - Signal model, inputs, summaries
//! - [`alerts`] - Alert lifecycle engine
//! - [`moderation`] - Moderation rules and signal simulation
//! - [`relay`] - Relay contract and in-process hub
//! - [`transport`] - Media transport contract and loopback transport

pub mod actors;
pub mod alerts;
pub mod cognitive;
pub mod config;
pub mod errors;
pub mod mesh;
pub mod moderation;
pub mod observability;
pub mod participant;
pub mod probe;
pub mod relay;
pub mod signaling;
pub mod transport;
