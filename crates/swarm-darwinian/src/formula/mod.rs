//! Formula - a gene plus the fitness and feedback attached to it

pub mod gene;

pub use gene::Gene;

use serde::{Deserialize, Serialize};

const SLOPE_DIGIT: usize = 0;
const BIAS_DIGIT: usize = 1;
const SLOPE_SIGN_DIGIT: usize = 2;
const BIAS_SIGN_DIGIT: usize = 3;

/// Number of leading digits that influence decoding
pub const DECODED_DIGITS: usize = 4;

/// Integer affine coefficients decoded from a gene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coefficients {
    pub slope: i32,
    pub bias: i32,
}

impl Coefficients {
    /// Decode: magnitude digits give |slope| and |bias|, odd sign digits negate
    pub fn decode(gene: &Gene) -> Self {
        let signed = |magnitude: u8, sign: u8| {
            let magnitude = i32::from(magnitude);
            if sign % 2 == 1 {
                -magnitude
            } else {
                magnitude
            }
        };
        Self {
            slope: signed(gene.digit(SLOPE_DIGIT), gene.digit(SLOPE_SIGN_DIGIT)),
            bias: signed(gene.digit(BIAS_DIGIT), gene.digit(BIAS_SIGN_DIGIT)),
        }
    }

    /// `slope * input + bias`, saturated to the i32 range
    #[inline]
    pub fn apply(&self, input: i32) -> i32 {
        let y = i64::from(self.slope) * i64::from(input) + i64::from(self.bias);
        y.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}

/// Unit of gossip: gene with fitness in [0, 1] and feedback in [-1, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub gene: Gene,
    pub fitness: f64,
    pub feedback: f64,
}

impl Formula {
    /// Fresh formula with zero fitness and feedback
    pub fn new(gene: Gene) -> Self {
        Self {
            gene,
            fitness: 0.0,
            feedback: 0.0,
        }
    }

    /// Formula carrying a fitness reported by a peer (clamped to [0, 1])
    pub fn with_fitness(gene: Gene, fitness: f64) -> Self {
        Self {
            gene,
            fitness: clamp_unit(fitness),
            feedback: 0.0,
        }
    }

    #[inline]
    pub fn coefficients(&self) -> Coefficients {
        Coefficients::decode(&self.gene)
    }

    /// Evaluate `y = slope * input + bias`, saturated to i32
    #[inline]
    pub fn apply(&self, input: i32) -> i32 {
        self.coefficients().apply(input)
    }
}

/// Pure, saturating evaluation of `formula` at `input`
pub fn apply(formula: &Formula, input: i32) -> i32 {
    formula.apply(input)
}

/// Clamp to [0, 1], mapping NaN to 0
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn formula(digits: &str) -> Formula {
        Formula::new(digits.parse().unwrap())
    }

    #[test]
    fn test_decode_positive() {
        let c = formula("210000").coefficients();
        assert_eq!(c, Coefficients { slope: 2, bias: 1 });
    }

    #[test]
    fn test_decode_signs_from_parity() {
        assert_eq!(formula("2131").coefficients(), Coefficients { slope: -2, bias: -1 });
        assert_eq!(formula("2184").coefficients(), Coefficients { slope: 2, bias: 1 });
        assert_eq!(formula("2118").coefficients(), Coefficients { slope: -2, bias: 1 });
    }

    #[test]
    fn test_short_gene_decodes_missing_digits_as_zero() {
        assert_eq!(formula("7").coefficients(), Coefficients { slope: 7, bias: 0 });
        assert_eq!(formula("").coefficients(), Coefficients { slope: 0, bias: 0 });
    }

    #[test]
    fn test_apply() {
        let f = formula("210000");
        assert_eq!(f.apply(1), 3);
        assert_eq!(f.apply(2), 5);
        assert_eq!(apply(&f, -4), -7);
    }

    #[test]
    fn test_apply_saturates() {
        assert_eq!(formula("9900").apply(i32::MAX), i32::MAX);
        assert_eq!(formula("9900").apply(i32::MIN), i32::MIN);
        assert_eq!(formula("9910").apply(i32::MIN), i32::MAX);
    }

    #[test]
    fn test_with_fitness_clamps() {
        let gene: Gene = "21".parse().unwrap();
        assert_eq!(Formula::with_fitness(gene, 1.7).fitness, 1.0);
        assert_eq!(Formula::with_fitness(gene, -0.2).fitness, 0.0);
        assert_eq!(Formula::with_fitness(gene, f64::NAN).fitness, 0.0);
    }

    proptest! {
        #[test]
        fn prop_apply_matches_wide_arithmetic(digits in proptest::collection::vec(0u8..10, 0..32), x in any::<i32>()) {
            let f = Formula::new(Gene::from_digits(&digits).unwrap());
            let c = f.coefficients();
            let wide = i64::from(c.slope) * i64::from(x) + i64::from(c.bias);
            let y = i64::from(f.apply(x));
            prop_assert!(y >= i64::from(i32::MIN) && y <= i64::from(i32::MAX));
            if wide >= i64::from(i32::MIN) && wide <= i64::from(i32::MAX) {
                prop_assert_eq!(y, wide);
            }
        }
    }
}
