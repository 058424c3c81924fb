//! Fitness calculation: η = clamp(1 / (1 + Σ|y(x) − target|) + feedback, 0, 1)

use super::Example;
use crate::formula::{clamp_unit, Formula};

pub struct FitnessCalculator;

impl FitnessCalculator {
    /// Sum of absolute errors over `examples`, computed without overflow
    pub fn total_abs_error(formula: &Formula, examples: &[Example]) -> f64 {
        let coefficients = formula.coefficients();
        examples
            .iter()
            .map(|e| {
                let y = i64::from(coefficients.apply(e.input));
                (y - i64::from(e.target)).unsigned_abs() as f64
            })
            .sum()
    }

    /// Calculate fitness: η = clamp(1 / (1 + error) + feedback, 0, 1)
    pub fn calculate(formula: &Formula, examples: &[Example]) -> f64 {
        let error = Self::total_abs_error(formula, examples);
        clamp_unit(1.0 / (1.0 + error) + formula.feedback)
    }
}
