//! Node configuration
//!
//! Layered: built-in defaults, then an optional TOML/JSON/YAML file, then
//! `SWARM__*` environment variables (`SWARM__POOL__SEED=7`). A `.env` file in
//! the working directory is read first.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swarm_common::{
    AuthKey, NodeId, Result, SwarmError, DEFAULT_GENE_LEN, DEFAULT_HELLO_INTERVAL_SECS,
    DEFAULT_STALE_AFTER_SECS, POPULATION_SIZE, SURVIVAL_THRESHOLD,
};
use swarm_darwinian::PoolConfig;

use crate::engine::EngineConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub port: u16,
    pub bind_host: String,
    /// Swarm secret; `hex:`-prefixed values are hex-decoded
    pub shared_key: String,
    pub hello_interval_secs: u64,
    pub stale_after_secs: u64,
    pub poll_timeout_ms: u64,
    pub broadcast: bool,
    pub static_neighbors: Vec<StaticNeighbor>,
    pub pool: PoolSettings,
    pub examples: Vec<ExampleSetting>,
    /// Delay between application steps in the binary
    pub share_interval_ms: u64,
    pub generations_per_step: usize,
    /// Record accepted migrations through the audit sink
    pub audit: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            port: 47_000,
            bind_host: "0.0.0.0".to_string(),
            shared_key: String::new(),
            hello_interval_secs: DEFAULT_HELLO_INTERVAL_SECS,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
            poll_timeout_ms: 250,
            broadcast: true,
            static_neighbors: Vec::new(),
            pool: PoolSettings::default(),
            examples: Vec::new(),
            share_interval_ms: 1_000,
            generations_per_step: 10,
            audit: false,
        }
    }
}

/// A peer outside the broadcast domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticNeighbor {
    pub id: NodeId,
    /// `host:port`
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub seed: u64,
    pub population: usize,
    pub gene_len: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            population: POPULATION_SIZE,
            gene_len: DEFAULT_GENE_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExampleSetting {
    pub input: i32,
    pub target: i32,
}

impl NodeConfig {
    /// Load from defaults, `path` (if given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("SWARM")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: NodeConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.shared_key.is_empty() {
            return Err(SwarmError::Config("shared_key must be set".into()));
        }
        if self.hello_interval_secs == 0 {
            return Err(SwarmError::Config("hello_interval_secs must be positive".into()));
        }
        if self.stale_after_secs <= self.hello_interval_secs {
            return Err(SwarmError::Config(
                "stale_after_secs must exceed hello_interval_secs".into(),
            ));
        }
        if self.share_interval_ms == 0 {
            return Err(SwarmError::Config("share_interval_ms must be positive".into()));
        }
        self.pool_config().validate()?;
        Ok(())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            population: self.pool.population,
            gene_len: self.pool.gene_len,
            survival_threshold: SURVIVAL_THRESHOLD,
        }
    }

    /// Raw secret bytes, shared by frame and ledger key derivation
    pub fn secret(&self) -> Result<Vec<u8>> {
        Ok(AuthKey::secret_from_config(&self.shared_key)?)
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        let bind_addr = resolve(&format!("{}:{}", self.bind_host, self.port))?;
        let key = AuthKey::for_frames(&self.secret()?)?;
        let broadcast = if self.broadcast {
            Some(SocketAddr::from(([255, 255, 255, 255], self.port)))
        } else {
            None
        };

        Ok(EngineConfig::new(self.node_id, self.port, key)
            .with_bind_addr(bind_addr)
            .with_broadcast(broadcast)
            .with_hello_interval(Duration::from_secs(self.hello_interval_secs))
            .with_stale_after(Duration::from_secs(self.stale_after_secs))
            .with_poll_timeout(Duration::from_millis(self.poll_timeout_ms)))
    }

    /// Static neighbors with their addresses resolved
    pub fn resolved_neighbors(&self) -> Result<Vec<(SocketAddr, NodeId)>> {
        self.static_neighbors
            .iter()
            .map(|n| Ok((resolve(&n.address)?, n.id)))
            .collect()
    }
}

fn resolve(address: &str) -> Result<SocketAddr> {
    address
        .to_socket_addrs()
        .map_err(|e| SwarmError::Config(format!("address {}: {}", address, e)))?
        .next()
        .ok_or_else(|| SwarmError::Config(format!("address {} did not resolve", address)))
}

fn config_error(err: ::config::ConfigError) -> SwarmError {
    SwarmError::Config(err.to_string())
}
