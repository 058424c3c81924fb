//! Culling policy: non-elite formulas below 0.5 fitness are replaced

pub struct CullingPolicy {
    threshold: f64,
}

impl CullingPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// The elite is never culled, even when it is itself below the threshold
    pub fn should_cull(&self, fitness: f64, is_elite: bool) -> bool {
        !is_elite && fitness < self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_strict() {
        let policy = CullingPolicy::new(0.5);
        assert!(policy.should_cull(0.49, false));
        assert!(!policy.should_cull(0.5, false));
        assert!(!policy.should_cull(0.1, true));
    }
}
