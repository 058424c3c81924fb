//! Error types for the swarm
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

use crate::NodeId;

/// Result type alias using SwarmError
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Unified error type for swarm operations
#[derive(Debug, Error)]
pub enum SwarmError {
    // Formula pool errors
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    // Wire codec errors
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    // Neighbor table errors
    #[error("Neighbor error: {0}")]
    Neighbor(#[from] NeighborError),

    // Audit sink errors
    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    // Crypto errors
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Event queue full ({capacity} slots)")]
    QueueFull { capacity: usize },

    #[error("Gossip engine is not running")]
    NotRunning,

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Formula pool errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoolError {
    #[error("Example ring full ({capacity} examples); clear it first")]
    ExamplesFull { capacity: usize },

    #[error("Formula not found in pool")]
    NotFound,

    #[error("Invalid gene: {0}")]
    InvalidGene(String),

    #[error("Feedback delta must be finite, got {0}")]
    InvalidFeedback(f64),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Pool did not converge after {rounds} rounds (best fitness {best_fitness:.3})")]
    NotConverged { rounds: usize, best_fitness: f64 },
}

/// Frame decoding errors
///
/// These stay inside the receiving node; nothing about them is ever sent back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("Frame truncated: {len} bytes")]
    Truncated { len: usize },

    #[error("Frame authentication failed")]
    Authentication,

    #[error("Unknown message tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("Malformed frame: {0}")]
    Malformed(String),
}

/// Neighbor table errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NeighborError {
    #[error("Neighbor table full ({capacity} entries)")]
    TableFull { capacity: usize },

    #[error("Neighbor not found: {0}")]
    NotFound(NodeId),
}

/// Audit sink errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("Audit ledger full ({capacity} records)")]
    LedgerFull { capacity: usize },

    #[error("Audit sink failed: {0}")]
    Sink(String),
}

/// Cryptographic operation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Shared key must not be empty")]
    EmptyKey,

    #[error("Invalid key encoding: {0}")]
    KeyEncoding(String),
}

// Implement From for common external error types
impl From<serde_json::Error> for SwarmError {
    fn from(err: serde_json::Error) -> Self {
        SwarmError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SwarmError {
    fn from(err: std::io::Error) -> Self {
        SwarmError::Network(err.to_string())
    }
}

impl From<anyhow::Error> for SwarmError {
    fn from(err: anyhow::Error) -> Self {
        SwarmError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SwarmError::Neighbor(NeighborError::NotFound(42));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_pool_error() {
        let err = PoolError::ExamplesFull { capacity: 32 };
        assert!(err.to_string().contains("32 examples"));
    }

    #[test]
    fn test_wire_errors_convert() {
        let err: SwarmError = WireError::UnknownTag(0x7f).into();
        assert!(matches!(err, SwarmError::Wire(WireError::UnknownTag(0x7f))));
        assert!(err.to_string().contains("0x7f"));
    }

    #[test]
    fn test_io_error_is_network() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: SwarmError = io.into();
        assert!(matches!(err, SwarmError::Network(_)));
    }
}
