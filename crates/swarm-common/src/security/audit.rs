//! Audit Sinks
//!
//! The swarm core records accepted formula migrations through a narrow
//! append-only seam, [`AuditSink::append`]. The core only ever writes; it
//! never reads a record back or verifies the chain.
//!
//! Two sinks ship with the crate:
//! - [`ConsoleAuditSink`] logs each append through `tracing`
//! - [`ChainedAuditLog`] keeps a bounded in-memory ledger where every record
//!   carries a keyed hash over its predecessor's hash and its own body

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crypto::auth::{AuthKey, AUTH_TAG_LEN};
use crate::error::AuditError;

/// Event type recorded when a migrated formula joins the local pool
pub const EVENT_FORMULA_MIGRATED: &str = "formula_migrated";

/// Append-only audit seam
pub trait AuditSink: Send + Sync {
    /// Append one event
    fn append(&self, event_type: &str, payload: &str) -> Result<(), AuditError>;
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn append(&self, event_type: &str, payload: &str) -> Result<(), AuditError> {
        (**self).append(event_type, payload)
    }
}

impl<T: AuditSink + ?Sized> AuditSink for Box<T> {
    fn append(&self, event_type: &str, payload: &str) -> Result<(), AuditError> {
        (**self).append(event_type, payload)
    }
}

/// Console audit sink (for development)
pub struct ConsoleAuditSink;

impl AuditSink for ConsoleAuditSink {
    fn append(&self, event_type: &str, payload: &str) -> Result<(), AuditError> {
        info!(event_type, payload, "audit");
        Ok(())
    }
}

/// One ledger record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the ledger, starting at 0
    pub index: u64,
    /// Append time (Unix millis)
    pub timestamp: i64,
    /// `hmac` of the previous record, zeroes for the first
    #[serde(with = "hex::serde")]
    pub prev_hash: [u8; AUTH_TAG_LEN],
    /// Keyed hash over `prev_hash` and this record's body
    #[serde(with = "hex::serde")]
    pub hmac: [u8; AUTH_TAG_LEN],
    pub event_type: String,
    pub payload: String,
}

impl AuditRecord {
    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Bounded, hash-chained, in-memory ledger
pub struct ChainedAuditLog {
    key: AuthKey,
    records: RwLock<Vec<AuditRecord>>,
    capacity: usize,
}

impl ChainedAuditLog {
    /// Default number of records kept before appends are rejected
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn new(key: AuthKey) -> Self {
        Self::with_capacity(key, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(key: AuthKey, capacity: usize) -> Self {
        Self {
            key,
            records: RwLock::new(Vec::new()),
            capacity,
        }
    }

    /// Number of records appended so far
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Copy of every record, oldest first
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().clone()
    }

    fn chain_hash(
        &self,
        prev_hash: &[u8; AUTH_TAG_LEN],
        index: u64,
        timestamp: i64,
        event_type: &str,
        payload: &str,
    ) -> [u8; AUTH_TAG_LEN] {
        self.key.tag_parts(&[
            prev_hash,
            &index.to_be_bytes(),
            &timestamp.to_be_bytes(),
            &(event_type.len() as u32).to_be_bytes(),
            event_type.as_bytes(),
            payload.as_bytes(),
        ])
    }
}

impl AuditSink for ChainedAuditLog {
    fn append(&self, event_type: &str, payload: &str) -> Result<(), AuditError> {
        let mut records = self.records.write();
        if records.len() >= self.capacity {
            return Err(AuditError::LedgerFull {
                capacity: self.capacity,
            });
        }

        let index = records.len() as u64;
        let prev_hash = records.last().map(|r| r.hmac).unwrap_or([0u8; AUTH_TAG_LEN]);
        let timestamp = chrono::Utc::now().timestamp_millis();
        let hmac = self.chain_hash(&prev_hash, index, timestamp, event_type, payload);

        records.push(AuditRecord {
            index,
            timestamp,
            prev_hash,
            hmac,
            event_type: event_type.to_string(),
            payload: payload.to_string(),
        });
        debug!(index, event_type, "Appended audit record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(capacity: usize) -> ChainedAuditLog {
        ChainedAuditLog::with_capacity(AuthKey::for_ledger(b"ledger").unwrap(), capacity)
    }

    #[test]
    fn test_console_sink() {
        // Should not fail
        ConsoleAuditSink.append("formula_migrated", "{}").unwrap();
    }

    #[test]
    fn test_records_are_chained() {
        let log = ledger(8);
        log.append(EVENT_FORMULA_MIGRATED, "a").unwrap();
        log.append(EVENT_FORMULA_MIGRATED, "b").unwrap();

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].index, 0);
        assert_eq!(records[0].prev_hash, [0u8; AUTH_TAG_LEN]);
        assert_eq!(records[1].prev_hash, records[0].hmac);
        assert_ne!(records[0].hmac, records[1].hmac);
    }

    #[test]
    fn test_full_ledger_rejects_append() {
        let log = ledger(1);
        log.append("x", "1").unwrap();
        assert_eq!(
            log.append("x", "2"),
            Err(AuditError::LedgerFull { capacity: 1 })
        );
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_record_json() {
        let log = ledger(2);
        log.append(EVENT_FORMULA_MIGRATED, "payload").unwrap();
        let json = log.records()[0].to_json();
        assert!(json.contains("formula_migrated"));
        assert!(json.contains(&"0".repeat(64)));
    }

    #[test]
    fn test_shared_sink_through_arc() {
        let log = Arc::new(ledger(4));
        let sink: Box<dyn AuditSink> = Box::new(log.clone());
        sink.append("x", "y").unwrap();
        assert_eq!(log.len(), 1);
    }
}
