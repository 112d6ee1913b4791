//! Full-mesh connection establishment over the room relay.

pub mod candidates;
pub mod link_state;
pub mod orchestrator;

pub use candidates::CandidateBuffer;
pub use link_state::{LinkState, LinkTrigger};
pub use orchestrator::{MeshOutput, PeerMeshOrchestrator};
