//! Engine counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters shared by the network thread and the application
#[derive(Debug, Default)]
pub struct EngineStats {
    pub datagrams_received: AtomicU64,
    pub datagrams_dropped: AtomicU64,
    pub hellos_sent: AtomicU64,
    pub formulas_sent: AtomicU64,
    pub acks_sent: AtomicU64,
    pub acks_received: AtomicU64,
    pub send_failures: AtomicU64,
    pub events_rejected: AtomicU64,
    pub neighbors_evicted: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub datagrams_received: u64,
    pub datagrams_dropped: u64,
    pub hellos_sent: u64,
    pub formulas_sent: u64,
    pub acks_sent: u64,
    pub acks_received: u64,
    pub send_failures: u64,
    pub events_rejected: u64,
    pub neighbors_evicted: u64,
}

impl EngineStats {
    #[inline]
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            datagrams_received: load(&self.datagrams_received),
            datagrams_dropped: load(&self.datagrams_dropped),
            hellos_sent: load(&self.hellos_sent),
            formulas_sent: load(&self.formulas_sent),
            acks_sent: load(&self.acks_sent),
            acks_received: load(&self.acks_received),
            send_failures: load(&self.send_failures),
            events_rejected: load(&self.events_rejected),
            neighbors_evicted: load(&self.neighbors_evicted),
        }
    }
}
