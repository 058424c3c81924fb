//! Swarm node binary
//!
//! Usage: `swarm-node [CONFIG_FILE]`. Settings may also come from `SWARM__*`
//! environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use swarm_gossip::{NodeConfig, SwarmNode};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting swarm node v{}", swarm_common::VERSION);

    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = NodeConfig::load(path.as_deref()).context("loading configuration")?;
    info!(
        node_id = config.node_id,
        port = config.port,
        broadcast = config.broadcast,
        examples = config.examples.len(),
        static_neighbors = config.static_neighbors.len(),
        "Loaded configuration"
    );

    let mut node = SwarmNode::from_config(&config).context("starting node")?;
    info!(local_addr = %node.engine().local_addr(), "Node listening");

    let mut ticker = tokio::time::interval(Duration::from_millis(config.share_interval_ms));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!(error = %e, "Signal handler failed");
                }
                info!("Received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                match node.step(config.generations_per_step) {
                    Ok(report) => debug!(
                        absorbed = report.drained.absorbed,
                        best_fitness = report.tick.best_fitness,
                        shared_with = ?report.shared_with,
                        "Step"
                    ),
                    Err(e) => warn!(error = %e, "Step failed"),
                }
            }
        }
    }

    let pool = node.shutdown();
    let best = pool.best();
    info!(gene = %best.gene, fitness = best.fitness, "Swarm node stopped");
    Ok(())
}
