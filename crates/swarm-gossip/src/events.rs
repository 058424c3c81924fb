//! Event queue between the network thread and the application.
//!
//! Fixed-capacity FIFO. When full, `push` rejects the new event and hands it
//! back; events already queued are never overwritten.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use swarm_common::{NodeId, EVENT_QUEUE_CAPACITY};
use swarm_darwinian::Formula;
use thiserror::Error;

/// Something the application should react to
#[derive(Debug, Clone, PartialEq)]
pub enum SwarmEvent {
    /// An authenticated HELLO arrived
    Hello { id: NodeId, address: SocketAddr },
    /// A peer migrated a formula to us
    Formula {
        id: NodeId,
        address: SocketAddr,
        formula: Formula,
    },
}

impl SwarmEvent {
    pub fn sender(&self) -> NodeId {
        match self {
            SwarmEvent::Hello { id, .. } | SwarmEvent::Formula { id, .. } => *id,
        }
    }
}

/// Returned by `push` when every slot is taken
#[derive(Debug, Error)]
#[error("Event queue full")]
pub struct QueueFull(pub SwarmEvent);

struct Ring {
    slots: Vec<Option<SwarmEvent>>,
    head: usize,
    len: usize,
}

impl Ring {
    fn push(&mut self, event: SwarmEvent) -> Result<(), SwarmEvent> {
        if self.len == self.slots.len() {
            return Err(event);
        }
        let tail = (self.head + self.len) % self.slots.len();
        self.slots[tail] = Some(event);
        self.len += 1;
        Ok(())
    }

    fn pop(&mut self) -> Option<SwarmEvent> {
        if self.len == 0 {
            return None;
        }
        let event = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        event
    }
}

pub struct EventQueue {
    ring: Mutex<Ring>,
    available: Condvar,
    capacity: usize,
    rejected: AtomicU64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                len: 0,
            }),
            available: Condvar::new(),
            capacity,
            rejected: AtomicU64::new(0),
        }
    }

    pub fn push(&self, event: SwarmEvent) -> Result<(), QueueFull> {
        let pushed = self.ring.lock().push(event);
        match pushed {
            Ok(()) => {
                self.available.notify_one();
                Ok(())
            }
            Err(event) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(QueueFull(event))
            }
        }
    }

    /// Oldest event, without blocking
    pub fn pop(&self) -> Option<SwarmEvent> {
        self.ring.lock().pop()
    }

    /// Oldest event, waiting up to `timeout` for one to arrive
    pub fn pop_timeout(&self, timeout: Duration) -> Option<SwarmEvent> {
        let deadline = Instant::now() + timeout;
        let mut ring = self.ring.lock();
        loop {
            if let Some(event) = ring.pop() {
                return Some(event);
            }
            if self.available.wait_until(&mut ring, deadline).timed_out() {
                return ring.pop();
            }
        }
    }

    /// Everything queued, oldest first
    pub fn drain(&self) -> Vec<SwarmEvent> {
        let mut ring = self.ring.lock();
        let mut events = Vec::with_capacity(ring.len);
        while let Some(event) = ring.pop() {
            events.push(event);
        }
        events
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events turned away because the queue was full
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn hello(id: NodeId) -> SwarmEvent {
        SwarmEvent::Hello {
            id,
            address: SocketAddr::from(([127, 0, 0, 1], 9000)),
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = EventQueue::new();
        for id in 0..5 {
            queue.push(hello(id)).unwrap();
        }
        let ids: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|e| e.sender()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_full_rejects_newest() {
        let queue = EventQueue::new();
        for id in 0..EVENT_QUEUE_CAPACITY as u32 {
            queue.push(hello(id)).unwrap();
        }
        let err = queue.push(hello(999)).unwrap_err();
        assert_eq!(err.0.sender(), 999);
        assert_eq!(queue.rejected(), 1);
        assert_eq!(queue.len(), EVENT_QUEUE_CAPACITY);

        // the oldest event survived
        assert_eq!(queue.pop().unwrap().sender(), 0);
        queue.push(hello(1000)).unwrap();
    }

    #[test]
    fn test_wraps_around() {
        let queue = EventQueue::with_capacity(3);
        for round in 0..10 {
            queue.push(hello(round)).unwrap();
            queue.push(hello(round + 100)).unwrap();
            assert_eq!(queue.pop().unwrap().sender(), round);
            assert_eq!(queue.pop().unwrap().sender(), round + 100);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain() {
        let queue = EventQueue::with_capacity(4);
        queue.push(hello(1)).unwrap();
        queue.push(hello(2)).unwrap();
        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_timeout_expires() {
        let queue = EventQueue::new();
        let started = Instant::now();
        assert!(queue.pop_timeout(Duration::from_millis(30)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_pop_timeout_wakes_on_push() {
        let queue = Arc::new(EventQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(hello(42)).unwrap();
            })
        };
        let event = queue.pop_timeout(Duration::from_secs(5));
        producer.join().unwrap();
        assert_eq!(event.map(|e| e.sender()), Some(42));
    }
}
