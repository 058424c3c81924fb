//! Formula pool
//!
//! Fixed-size population evolved by elitist mutation against a bounded set of
//! labeled examples. Every random draw comes from one ChaCha8 stream seeded at
//! construction, so identical seeds and inputs give identical populations.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use swarm_common::PoolError;
use tracing::{debug, trace};

use crate::culling::CullingPolicy;
use crate::fitness::{Example, ExampleRing, FitnessCalculator};
use crate::formula::{clamp_unit, Formula, Gene};
use crate::PoolConfig;

/// Result of folding a formula into the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsorbOutcome {
    /// The worst member at `slot` was replaced
    Replaced { slot: usize },
    /// A member with the exact gene already lives at `slot`; nothing changed
    AlreadyPresent { slot: usize },
}

/// Summary of one `tick` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Generations actually run (zero without examples)
    pub generations: usize,
    /// Elite fitness after the last evaluation
    pub best_fitness: f64,
    /// Formulas overwritten by mutated elite copies, summed over generations
    pub replaced: usize,
}

pub struct FormulaPool {
    config: PoolConfig,
    formulas: Vec<Formula>,
    examples: ExampleRing,
    culling: CullingPolicy,
    rng: ChaCha8Rng,
    generation: u64,
}

impl FormulaPool {
    /// Build the reference pool (16 formulas, 6-digit genes) from `seed`
    pub fn init(seed: u64) -> Self {
        let config = PoolConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let formulas = Self::seed_population(&mut rng, &config);
        Self {
            culling: CullingPolicy::new(config.survival_threshold),
            config,
            formulas,
            examples: ExampleRing::new(),
            rng,
            generation: 0,
        }
    }

    /// Build a pool with a custom configuration
    pub fn with_config(seed: u64, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let formulas = Self::seed_population(&mut rng, &config);
        Ok(Self {
            culling: CullingPolicy::new(config.survival_threshold),
            config,
            formulas,
            examples: ExampleRing::new(),
            rng,
            generation: 0,
        })
    }

    fn seed_population(rng: &mut ChaCha8Rng, config: &PoolConfig) -> Vec<Formula> {
        (0..config.population)
            .map(|_| Formula::new(Gene::random(rng, config.gene_len)))
            .collect()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Population size; constant for the pool's lifetime
    #[inline]
    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    pub fn formulas(&self) -> &[Formula] {
        &self.formulas
    }

    /// Generations run since construction
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ============ Examples ============

    /// Append a labeled example; fails when the ring is full
    pub fn add_example(&mut self, input: i32, target: i32) -> Result<(), PoolError> {
        self.examples.push(Example::new(input, target))
    }

    pub fn clear_examples(&mut self) {
        self.examples.clear();
    }

    pub fn examples(&self) -> &[Example] {
        self.examples.as_slice()
    }

    // ============ Evolution ============

    /// Run up to `generations` rounds of evaluate → select elite → cull.
    ///
    /// Without examples there is nothing to score against and the pool is
    /// left untouched.
    pub fn tick(&mut self, generations: usize) -> TickReport {
        if self.examples.is_empty() {
            return TickReport {
                generations: 0,
                best_fitness: self.best().fitness,
                replaced: 0,
            };
        }

        let mut replaced = 0;
        let mut best_fitness = 0.0;
        for _ in 0..generations {
            let examples = self.examples.as_slice();
            for formula in self.formulas.iter_mut() {
                formula.fitness = FitnessCalculator::calculate(formula, examples);
            }

            let elite = self.best_index();
            let elite_gene = self.formulas[elite].gene;
            best_fitness = self.formulas[elite].fitness;

            for (index, formula) in self.formulas.iter_mut().enumerate() {
                if self.culling.should_cull(formula.fitness, index == elite) {
                    let mut gene = elite_gene;
                    gene.mutate(&mut self.rng);
                    *formula = Formula::new(gene);
                    replaced += 1;
                }
            }
            self.generation += 1;
        }

        trace!(
            generation = self.generation,
            best_fitness,
            replaced,
            "Pool ticked"
        );
        TickReport {
            generations,
            best_fitness,
            replaced,
        }
    }

    /// Index of the highest-fitness formula; the first index wins exact ties
    pub fn best_index(&self) -> usize {
        let mut best = 0;
        for (index, formula) in self.formulas.iter().enumerate().skip(1) {
            if formula.fitness > self.formulas[best].fitness {
                best = index;
            }
        }
        best
    }

    /// Highest-fitness formula
    pub fn best(&self) -> &Formula {
        &self.formulas[self.best_index()]
    }

    /// Slot holding exactly `gene`, if any
    pub fn position(&self, gene: &Gene) -> Option<usize> {
        self.formulas.iter().position(|f| f.gene == *gene)
    }

    /// Attach feedback to the member whose gene matches exactly.
    ///
    /// Feedback accumulates in [-1, 1] and shifts fitness immediately.
    pub fn feedback(&mut self, gene: &Gene, delta: f64) -> Result<&Formula, PoolError> {
        if !delta.is_finite() {
            return Err(PoolError::InvalidFeedback(delta));
        }
        let slot = self.position(gene).ok_or(PoolError::NotFound)?;
        let formula = &mut self.formulas[slot];
        formula.feedback = (formula.feedback + delta).clamp(-1.0, 1.0);
        formula.fitness = clamp_unit(formula.fitness + delta);
        Ok(&self.formulas[slot])
    }

    /// Fold a migrated formula into the population.
    ///
    /// An exact gene already present leaves the pool unchanged, so repeated
    /// deliveries of the same formula are harmless. Otherwise the lowest
    /// fitness member is replaced (the last index wins ties, keeping the
    /// first-index elite in place).
    pub fn absorb(&mut self, formula: Formula) -> AbsorbOutcome {
        if let Some(slot) = self.position(&formula.gene) {
            return AbsorbOutcome::AlreadyPresent { slot };
        }

        let mut worst = 0;
        for (index, member) in self.formulas.iter().enumerate() {
            if member.fitness <= self.formulas[worst].fitness {
                worst = index;
            }
        }
        self.formulas[worst] = Formula::with_fitness(formula.gene, formula.fitness);
        AbsorbOutcome::Replaced { slot: worst }
    }

    /// Tick in rounds until the elite reaches `target` fitness.
    ///
    /// Single-digit mutation around the elite can settle on a plateau that no
    /// one-digit step improves. A round that leaves the elite fitness
    /// unchanged redraws every gene from the pool's own PRNG (examples are
    /// kept), so the search stays deterministic for a given seed.
    pub fn train_until(
        &mut self,
        target: f64,
        generations_per_round: usize,
        max_rounds: usize,
    ) -> Result<Formula, PoolError> {
        if self.examples.is_empty() {
            return Err(PoolError::NotConverged {
                rounds: 0,
                best_fitness: self.best().fitness,
            });
        }

        let mut last_best = self.best().fitness;
        for round in 1..=max_rounds {
            let report = self.tick(generations_per_round);
            if report.best_fitness >= target {
                debug!(round, generation = self.generation, fitness = report.best_fitness, "Pool converged");
                return Ok(self.best().clone());
            }
            if report.best_fitness <= last_best {
                debug!(round, fitness = report.best_fitness, "Pool stagnated, reseeding");
                self.reseed();
                last_best = 0.0;
            } else {
                last_best = report.best_fitness;
            }
        }

        Err(PoolError::NotConverged {
            rounds: max_rounds,
            best_fitness: self.best().fitness,
        })
    }

    fn reseed(&mut self) {
        for formula in self.formulas.iter_mut() {
            *formula = Formula::new(Gene::random(&mut self.rng, self.config.gene_len));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_common::MAX_EXAMPLES;

    fn trained_examples(pool: &mut FormulaPool) {
        pool.add_example(1, 3).unwrap();
        pool.add_example(2, 5).unwrap();
    }

    #[test]
    fn test_init_population() {
        let pool = FormulaPool::init(42);
        assert_eq!(pool.len(), 16);
        for f in pool.formulas() {
            assert_eq!(f.gene.len(), 6);
            assert_eq!(f.fitness, 0.0);
            assert_eq!(f.feedback, 0.0);
        }
    }

    #[test]
    fn test_same_seed_same_population() {
        let mut a = FormulaPool::init(7);
        let mut b = FormulaPool::init(7);
        assert_eq!(a.formulas(), b.formulas());

        trained_examples(&mut a);
        trained_examples(&mut b);
        a.tick(25);
        b.tick(25);
        assert_eq!(a.formulas(), b.formulas());
        assert_eq!(a.generation(), 25);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = FormulaPool::init(1);
        let b = FormulaPool::init(2);
        assert_ne!(a.formulas(), b.formulas());
    }

    #[test]
    fn test_population_size_constant() {
        let mut pool = FormulaPool::init(9);
        trained_examples(&mut pool);
        pool.tick(10);
        pool.absorb(Formula::with_fitness("210000".parse().unwrap(), 1.0));
        assert_eq!(pool.len(), 16);
    }

    #[test]
    fn test_add_example_full() {
        let mut pool = FormulaPool::init(1);
        for i in 0..MAX_EXAMPLES as i32 {
            pool.add_example(i, 2 * i + 1).unwrap();
        }
        assert_eq!(
            pool.add_example(100, 201),
            Err(PoolError::ExamplesFull { capacity: MAX_EXAMPLES })
        );
        pool.clear_examples();
        assert!(pool.add_example(100, 201).is_ok());
    }

    #[test]
    fn test_tick_without_examples_is_noop() {
        let mut pool = FormulaPool::init(5);
        let before = pool.formulas().to_vec();
        let report = pool.tick(10);
        assert_eq!(report.generations, 0);
        assert_eq!(pool.formulas(), before.as_slice());
    }

    #[test]
    fn test_tick_keeps_fitness_in_unit_range() {
        let mut pool = FormulaPool::init(11);
        trained_examples(&mut pool);
        pool.tick(30);
        for f in pool.formulas() {
            assert!((0.0..=1.0).contains(&f.fitness));
        }
    }

    #[test]
    fn test_elite_fitness_never_decreases() {
        let mut pool = FormulaPool::init(13);
        trained_examples(&mut pool);
        let mut last = 0.0;
        for _ in 0..40 {
            let report = pool.tick(1);
            assert!(report.best_fitness >= last);
            last = report.best_fitness;
        }
    }

    #[test]
    fn test_best_first_index_wins_ties() {
        let mut pool = FormulaPool::init(3);
        // All fitness values start at zero
        assert_eq!(pool.best_index(), 0);

        let gene = pool.formulas()[5].gene;
        pool.feedback(&gene, 0.3).unwrap();
        let other = pool.formulas()[9].gene;
        if other != gene {
            pool.feedback(&other, 0.3).unwrap();
            assert_eq!(pool.best_index(), 5);
        }
    }

    #[test]
    fn test_feedback_requires_exact_gene() {
        let mut pool = FormulaPool::init(21);
        let member = pool.formulas()[0].gene;

        let mut longer = member.digits().to_vec();
        longer.push(0);
        let longer = Gene::from_digits(&longer).unwrap();
        assert_eq!(pool.feedback(&longer, 0.1).unwrap_err(), PoolError::NotFound);

        let updated = pool.feedback(&member, 0.1).unwrap();
        assert!((updated.feedback - 0.1).abs() < 1e-12);
        assert!((updated.fitness - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_feedback_clamps() {
        let mut pool = FormulaPool::init(21);
        let gene = pool.formulas()[0].gene;
        pool.feedback(&gene, 5.0).unwrap();
        let f = pool.feedback(&gene, 5.0).unwrap();
        assert_eq!(f.feedback, 1.0);
        assert_eq!(f.fitness, 1.0);
        assert!(matches!(
            pool.feedback(&gene, f64::NAN),
            Err(PoolError::InvalidFeedback(_))
        ));
    }

    #[test]
    fn test_absorb_is_idempotent() {
        let mut pool = FormulaPool::init(8);
        trained_examples(&mut pool);
        pool.tick(5);

        let migrant = Formula::with_fitness("2190001".parse().unwrap(), 0.95);
        let first = pool.absorb(migrant.clone());
        let AbsorbOutcome::Replaced { slot } = first else {
            panic!("expected replacement, got {:?}", first);
        };
        let snapshot = pool.formulas().to_vec();

        assert_eq!(pool.absorb(migrant), AbsorbOutcome::AlreadyPresent { slot });
        assert_eq!(pool.formulas(), snapshot.as_slice());
        assert!((pool.formulas()[slot].fitness - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_absorb_replaces_worst_and_spares_elite() {
        let mut pool = FormulaPool::init(8);
        let elite_gene = pool.formulas()[0].gene;
        pool.feedback(&elite_gene, 0.9).unwrap();

        let outcome = pool.absorb(Formula::with_fitness("555555".parse().unwrap(), 0.2));
        assert_eq!(outcome, AbsorbOutcome::Replaced { slot: 15 });
        assert_eq!(pool.formulas()[0].gene, elite_gene);
    }

    #[test]
    fn test_absorbed_formula_accepts_feedback() {
        let mut pool = FormulaPool::init(4);
        let gene: Gene = "21000000".parse().unwrap();
        assert_eq!(pool.feedback(&gene, 0.1).unwrap_err(), PoolError::NotFound);

        pool.absorb(Formula::with_fitness(gene, 0.5));
        assert!(pool.feedback(&gene, 0.1).is_ok());
    }

    #[test]
    fn test_train_until_finds_line() {
        let mut pool = FormulaPool::init(2024);
        trained_examples(&mut pool);
        let best = pool.train_until(0.9, 40, 500).unwrap();
        assert!(best.fitness >= 0.9);
        assert_eq!(best.apply(1), 3);
        assert_eq!(best.apply(2), 5);
        let c = best.coefficients();
        assert_eq!((c.slope, c.bias), (2, 1));
    }

    #[test]
    fn test_train_until_is_deterministic() {
        let mut a = FormulaPool::init(99);
        let mut b = FormulaPool::init(99);
        trained_examples(&mut a);
        trained_examples(&mut b);
        assert_eq!(a.train_until(0.9, 40, 500), b.train_until(0.9, 40, 500));
        assert_eq!(a.formulas(), b.formulas());
    }

    #[test]
    fn test_train_until_without_examples() {
        let mut pool = FormulaPool::init(1);
        assert!(matches!(
            pool.train_until(0.9, 10, 10),
            Err(PoolError::NotConverged { rounds: 0, .. })
        ));
    }

    #[test]
    fn test_with_config_validates() {
        let config = PoolConfig {
            population: 4,
            gene_len: 8,
            ..PoolConfig::default()
        };
        let pool = FormulaPool::with_config(1, config).unwrap();
        assert_eq!(pool.len(), 4);
        assert_eq!(pool.formulas()[0].gene.len(), 8);

        let bad = PoolConfig {
            gene_len: 40,
            ..PoolConfig::default()
        };
        assert!(FormulaPool::with_config(1, bad).is_err());
    }
}
