//! Gene - ordered decimal digits, the sole unit of heredity
//!
//! Stored inline as a fixed 32-slot array plus a length so a gene can be
//! copied into a frame without allocation. Slots past `len` are always zero,
//! which makes the derived equality an exact length-and-bytes match.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use swarm_common::{PoolError, MAX_GENE_LEN};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Gene {
    digits: [u8; MAX_GENE_LEN],
    len: u8,
}

impl Gene {
    /// Build a gene from digit values (each 0-9)
    pub fn from_digits(digits: &[u8]) -> Result<Self, PoolError> {
        if digits.len() > MAX_GENE_LEN {
            return Err(PoolError::InvalidGene(format!(
                "{} digits exceeds the {} digit limit",
                digits.len(),
                MAX_GENE_LEN
            )));
        }
        if let Some(bad) = digits.iter().find(|d| **d > 9) {
            return Err(PoolError::InvalidGene(format!("{} is not a decimal digit", bad)));
        }

        let mut gene = Self {
            digits: [0; MAX_GENE_LEN],
            len: digits.len() as u8,
        };
        gene.digits[..digits.len()].copy_from_slice(digits);
        Ok(gene)
    }

    /// Draw `len` digits from `rng`; `len` is capped at the 32 digit limit
    pub fn random<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Self {
        let len = len.min(MAX_GENE_LEN);
        let mut gene = Self {
            digits: [0; MAX_GENE_LEN],
            len: len as u8,
        };
        for slot in gene.digits[..len].iter_mut() {
            *slot = rng.gen_range(0..10);
        }
        gene
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The meaningful digits
    #[inline]
    pub fn digits(&self) -> &[u8] {
        &self.digits[..self.len()]
    }

    /// All 32 slots, zero-padded past `len`
    #[inline]
    pub fn padded(&self) -> &[u8; MAX_GENE_LEN] {
        &self.digits
    }

    /// Digit at `position`, or 0 past the end
    #[inline]
    pub fn digit(&self, position: usize) -> u8 {
        if position < self.len() {
            self.digits[position]
        } else {
            0
        }
    }

    /// Replace exactly one random digit with a different digit.
    ///
    /// Returns the mutated position, or `None` for an empty gene.
    pub fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let position = rng.gen_range(0..self.len());
        let shift: u8 = rng.gen_range(1..10);
        self.digits[position] = (self.digits[position] + shift) % 10;
        Some(position)
    }
}

impl fmt::Display for Gene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in self.digits() {
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Gene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gene({})", self)
    }
}

impl FromStr for Gene {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .chars()
            .map(|c| {
                c.to_digit(10)
                    .map(|d| d as u8)
                    .ok_or_else(|| PoolError::InvalidGene(format!("'{}' is not a decimal digit", c)))
            })
            .collect::<Result<Vec<u8>, _>>()?;
        Self::from_digits(&digits)
    }
}

impl TryFrom<String> for Gene {
    type Error = PoolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Gene> for String {
    fn from(gene: Gene) -> Self {
        gene.to_string()
    }
}
