//! # Swarm Common
//!
//! Shared errors, constants, and cryptographic primitives for the formula swarm.
//!
//! ## Crypto
//!
//! - [`crypto::auth`]: keyed BLAKE3 tags that authenticate every gossip frame
//!
//! ## Security
//!
//! - [`security::audit`]: the append-only [`AuditSink`] seam used to record
//!   accepted formula migrations

pub mod crypto;
pub mod error;
pub mod security;

// Re-export commonly used types at crate root
pub use crypto::auth::{AuthKey, AUTH_TAG_LEN};
pub use error::{AuditError, NeighborError, PoolError, Result, SwarmError, WireError};
pub use security::audit::{AuditRecord, AuditSink, ChainedAuditLog, ConsoleAuditSink};

/// Swarm crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identifier a node announces in HELLO and MIGRATE_FORMULA frames
pub type NodeId = u32;

/// Number of formulas in every pool
pub const POPULATION_SIZE: usize = 16;

/// Capacity of a pool's labeled-example ring
pub const MAX_EXAMPLES: usize = 32;

/// Longest gene a frame can carry
pub const MAX_GENE_LEN: usize = 32;

/// Gene length used when a pool is built from a seed
pub const DEFAULT_GENE_LEN: usize = 6;

/// Formulas below this fitness are replaced by mutated copies of the elite
pub const SURVIVAL_THRESHOLD: f64 = 0.5;

/// Maximum number of peers one node tracks
pub const NEIGHBOR_CAPACITY: usize = 64;

/// Slots in the network-to-application event ring
pub const EVENT_QUEUE_CAPACITY: usize = 32;

/// Seconds between HELLO broadcasts
pub const DEFAULT_HELLO_INTERVAL_SECS: u64 = 5;

/// Seconds of silence after which a neighbor is evicted
pub const DEFAULT_STALE_AFTER_SECS: u64 = 30;
