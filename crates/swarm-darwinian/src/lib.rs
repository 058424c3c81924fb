//! # Darwinian
//!
//! Elitist formula pool evolved locally on every swarm node.
//!
//! ## Formula
//!
//! ```text
//! y = slope × x + bias        (saturated to i32)
//! ```
//!
//! Where slope and bias are decoded from a gene of decimal digits:
//! - digit 0: |slope|, digit 1: |bias|
//! - parity of digit 2: slope sign, parity of digit 3: bias sign (odd = negative)
//!
//! ## Fitness
//!
//! ```text
//! fitness = clamp(1 / (1 + Σ|y(x) − target|) + feedback, 0, 1)
//! ```
//!
//! ## Culling Policy
//!
//! Every generation, each formula below 0.5 fitness (other than the elite)
//! is overwritten with the elite's gene and has exactly one digit mutated.

pub mod culling;
pub mod fitness;
pub mod formula;
pub mod pool;

pub use culling::CullingPolicy;
pub use fitness::{Example, ExampleRing, FitnessCalculator};
pub use formula::{Coefficients, Formula, Gene};
pub use pool::{AbsorbOutcome, FormulaPool, TickReport};

use swarm_common::{PoolError, DEFAULT_GENE_LEN, MAX_GENE_LEN, POPULATION_SIZE, SURVIVAL_THRESHOLD};

/// Darwinian pool configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Number of formulas; constant for the pool's lifetime
    pub population: usize,
    /// Digits per seeded gene
    pub gene_len: usize,
    /// Culling threshold
    pub survival_threshold: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            population: POPULATION_SIZE,
            gene_len: DEFAULT_GENE_LEN,
            survival_threshold: SURVIVAL_THRESHOLD,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.population == 0 {
            return Err(PoolError::InvalidConfig("population must be at least 1".into()));
        }
        if !(formula::DECODED_DIGITS..=MAX_GENE_LEN).contains(&self.gene_len) {
            return Err(PoolError::InvalidConfig(format!(
                "gene_len must be within {}..={}, got {}",
                formula::DECODED_DIGITS,
                MAX_GENE_LEN,
                self.gene_len
            )));
        }
        if !(0.0..=1.0).contains(&self.survival_threshold) {
            return Err(PoolError::InvalidConfig(
                "survival_threshold must be within [0, 1]".into(),
            ));
        }
        Ok(())
    }
}
