//! Fitness: labeled examples and the calculator that scores formulas against them

pub mod calculator;

pub use calculator::FitnessCalculator;

use serde::{Deserialize, Serialize};
use swarm_common::{PoolError, MAX_EXAMPLES};

/// One labeled (input, target) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Example {
    pub input: i32,
    pub target: i32,
}

impl Example {
    pub fn new(input: i32, target: i32) -> Self {
        Self { input, target }
    }
}

/// Array-backed example ring.
///
/// Appends fail once all slots are used; nothing is ever overwritten until
/// [`ExampleRing::clear`] is called.
#[derive(Debug, Clone)]
pub struct ExampleRing {
    slots: [Example; MAX_EXAMPLES],
    len: usize,
}

impl Default for ExampleRing {
    fn default() -> Self {
        Self::new()
    }
}

impl ExampleRing {
    pub fn new() -> Self {
        Self {
            slots: [Example::default(); MAX_EXAMPLES],
            len: 0,
        }
    }

    pub fn push(&mut self, example: Example) -> Result<(), PoolError> {
        if self.len == MAX_EXAMPLES {
            return Err(PoolError::ExamplesFull {
                capacity: MAX_EXAMPLES,
            });
        }
        self.slots[self.len] = example;
        self.len += 1;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    #[inline]
    pub fn as_slice(&self) -> &[Example] {
        &self.slots[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == MAX_EXAMPLES
    }
}
