//! Neighbor table
//!
//! Bounded registry of peers heard from recently. Entries keep insertion
//! order so random selection by index is reproducible for a given table.
//! Every time-dependent operation takes `now` explicitly.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use swarm_common::{NeighborError, NodeId, NEIGHBOR_CAPACITY};

/// A known peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub id: NodeId,
    pub address: SocketAddr,
    pub last_seen: Instant,
    /// Consecutive send failures since the peer was last heard from
    pub failure_count: u32,
}

impl Neighbor {
    pub fn is_stale(&self, now: Instant, stale_after: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > stale_after
    }
}

/// What `upsert` did with the entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Refreshed,
}

#[derive(Debug)]
pub struct NeighborTable {
    entries: Vec<Neighbor>,
    capacity: usize,
}

impl Default for NeighborTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::with_capacity(NEIGHBOR_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record that `id` was heard from at `address`.
    ///
    /// An existing entry takes the new address, is marked seen at `now` and
    /// has its failure count reset. A new id is appended while there is room.
    pub fn upsert(
        &mut self,
        id: NodeId,
        address: SocketAddr,
        now: Instant,
    ) -> Result<Upsert, NeighborError> {
        if let Some(entry) = self.entries.iter_mut().find(|n| n.id == id) {
            entry.address = address;
            entry.last_seen = now;
            entry.failure_count = 0;
            return Ok(Upsert::Refreshed);
        }

        if self.entries.len() >= self.capacity {
            return Err(NeighborError::TableFull {
                capacity: self.capacity,
            });
        }

        self.entries.push(Neighbor {
            id,
            address,
            last_seen: now,
            failure_count: 0,
        });
        Ok(Upsert::Inserted)
    }

    /// Mark whichever entry lives at `address` as seen. Returns its id.
    pub fn touch_address(&mut self, address: SocketAddr, now: Instant) -> Option<NodeId> {
        let entry = self.entries.iter_mut().find(|n| n.address == address)?;
        entry.last_seen = now;
        entry.failure_count = 0;
        Some(entry.id)
    }

    /// Count a failed send to `id`, returning the new failure count
    pub fn record_failure(&mut self, id: NodeId) -> Result<u32, NeighborError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(NeighborError::NotFound(id))?;
        entry.failure_count = entry.failure_count.saturating_add(1);
        Ok(entry.failure_count)
    }

    /// Drop every entry silent for longer than `stale_after`
    pub fn evict_stale(&mut self, now: Instant, stale_after: Duration) -> Vec<Neighbor> {
        let mut evicted = Vec::new();
        self.entries.retain(|n| {
            if n.is_stale(now, stale_after) {
                evicted.push(n.clone());
                false
            } else {
                true
            }
        });
        evicted
    }

    pub fn get(&self, id: NodeId) -> Option<&Neighbor> {
        self.entries.iter().find(|n| n.id == id)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Neighbor> {
        let index = self.entries.iter().position(|n| n.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Entry at `rand mod len`
    pub fn pick(&self, rand: u64) -> Option<&Neighbor> {
        if self.entries.is_empty() {
            return None;
        }
        let index = (rand % self.entries.len() as u64) as usize;
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.entries.iter()
    }

    /// Owned copy of every entry, for callers outside the lock
    pub fn snapshot(&self) -> Vec<Neighbor> {
        self.entries.clone()
    }
}
