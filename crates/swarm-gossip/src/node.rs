//! Application-side glue between a formula pool and a gossip engine.

use std::net::SocketAddr;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use swarm_common::security::audit::EVENT_FORMULA_MIGRATED;
use swarm_common::{AuditSink, ConsoleAuditSink, NodeId, Result};
use swarm_darwinian::{AbsorbOutcome, Formula, FormulaPool, TickReport};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::engine::GossipEngine;
use crate::events::SwarmEvent;

/// Counts from one `drain_events` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub hellos: usize,
    pub formulas: usize,
    pub absorbed: usize,
    pub duplicates: usize,
    pub audit_failures: usize,
}

/// Result of one `step`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub drained: DrainReport,
    pub tick: TickReport,
    pub shared_with: Option<NodeId>,
}

/// Audit payload for an accepted migration
#[derive(Debug, Serialize)]
struct MigrationRecord {
    from: NodeId,
    address: String,
    gene: String,
    fitness: f64,
    slot: usize,
}

pub struct SwarmNode {
    pool: FormulaPool,
    engine: GossipEngine,
    audit: Option<Box<dyn AuditSink>>,
    rng: ChaCha8Rng,
}

impl SwarmNode {
    pub fn new(pool: FormulaPool, engine: GossipEngine) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(u64::from(engine.node_id()));
        Self {
            pool,
            engine,
            audit: None,
            rng,
        }
    }

    /// Build a node from configuration: pool, examples, engine, static neighbors
    pub fn from_config(config: &NodeConfig) -> Result<Self> {
        let mut pool = FormulaPool::with_config(config.pool.seed, config.pool_config())?;
        for example in &config.examples {
            pool.add_example(example.input, example.target)?;
        }

        let engine = GossipEngine::start_with_config(config.engine_config()?)?;
        for (address, id) in config.resolved_neighbors()? {
            engine.add_static_neighbor(address, id)?;
        }

        let mut node = Self::new(pool, engine);
        if config.audit {
            node = node.with_audit(Box::new(ConsoleAuditSink));
        }
        Ok(node)
    }

    pub fn with_audit(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn pool(&self) -> &FormulaPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut FormulaPool {
        &mut self.pool
    }

    pub fn engine(&self) -> &GossipEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GossipEngine {
        &mut self.engine
    }

    /// Apply every queued event to the pool
    pub fn drain_events(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some(event) = self.engine.next_event() {
            self.handle_event(event, &mut report);
        }
        report
    }

    pub fn handle_event(&mut self, event: SwarmEvent, report: &mut DrainReport) {
        match event {
            SwarmEvent::Hello { id, address } => {
                report.hellos += 1;
                debug!(peer = id, address = %address, "Hello");
            }
            SwarmEvent::Formula {
                id,
                address,
                formula,
            } => {
                report.formulas += 1;
                match self.pool.absorb(formula.clone()) {
                    AbsorbOutcome::Replaced { slot } => {
                        report.absorbed += 1;
                        info!(peer = id, gene = %formula.gene, fitness = formula.fitness, slot, "Absorbed migrated formula");
                        if !self.record_migration(id, address, &formula, slot) {
                            report.audit_failures += 1;
                        }
                    }
                    AbsorbOutcome::AlreadyPresent { slot } => {
                        report.duplicates += 1;
                        debug!(peer = id, gene = %formula.gene, slot, "Formula already in pool");
                    }
                }
            }
        }
    }

    fn record_migration(
        &self,
        from: NodeId,
        address: SocketAddr,
        formula: &Formula,
        slot: usize,
    ) -> bool {
        let Some(sink) = &self.audit else {
            return true;
        };

        let record = MigrationRecord {
            from,
            address: address.to_string(),
            gene: formula.gene.to_string(),
            fitness: formula.fitness,
            slot,
        };
        let appended = serde_json::to_string(&record)
            .map_err(|e| e.to_string())
            .and_then(|payload| {
                sink.append(EVENT_FORMULA_MIGRATED, &payload)
                    .map_err(|e| e.to_string())
            });
        match appended {
            Ok(()) => true,
            Err(e) => {
                warn!(peer = from, error = %e, "Audit append failed");
                false
            }
        }
    }

    /// Send the current best formula to one random neighbor
    pub fn share_best(&mut self) -> Result<Option<NodeId>> {
        let best = self.pool.best().clone();
        self.engine.send_to_random(self.rng.next_u64(), &best)
    }

    /// Drain, evolve, share
    pub fn step(&mut self, generations: usize) -> Result<StepReport> {
        let drained = self.drain_events();
        let tick = self.pool.tick(generations);
        let shared_with = self.share_best()?;
        Ok(StepReport {
            drained,
            tick,
            shared_with,
        })
    }

    /// Stop the engine; the pool is returned for inspection
    pub fn shutdown(mut self) -> FormulaPool {
        self.engine.stop();
        self.pool
    }
}
