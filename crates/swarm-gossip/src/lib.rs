//! # Swarm Gossip
//!
//! Authenticated UDP gossip that lets swarm nodes find each other and migrate
//! their best formulas.
//!
//! ## Threads
//!
//! - The network thread, owned by [`GossipEngine`], receives frames, keeps the
//!   [`NeighborTable`] current and pushes [`SwarmEvent`]s.
//! - The application thread pops events, evolves its pool and sends formulas.
//!   [`SwarmNode`] packages that loop.
//!
//! ## Wire
//!
//! See [`wire`] for the frame layout. Frames that fail authentication or
//! decoding are dropped without a reply.

pub mod config;
pub mod engine;
pub mod events;
pub mod neighbor;
pub mod node;
pub mod stats;
pub mod wire;

pub use config::NodeConfig;
pub use engine::{EngineConfig, GossipEngine};
pub use events::{EventQueue, QueueFull, SwarmEvent};
pub use neighbor::{Neighbor, NeighborTable, Upsert};
pub use node::{DrainReport, StepReport, SwarmNode};
pub use stats::{EngineStats, StatsSnapshot};
pub use wire::{NetMessage, WireCodec};
