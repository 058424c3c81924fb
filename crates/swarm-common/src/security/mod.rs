//! Security module
//!
//! - Append-only audit sinks

pub mod audit;

pub use audit::{AuditRecord, AuditSink, ChainedAuditLog, ConsoleAuditSink, EVENT_FORMULA_MIGRATED};
