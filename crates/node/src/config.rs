// node/src/config.rs
use pool_core::ChainConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub data_dir: String,
    /// Chain preset: "mainnet" or "test"
    pub chain: String,
    pub pool: PoolConfig,
    pub rpc: RpcConfig,
    pub storage: StorageConfig,
    pub clock: ClockConfig,
}

/// Labels of the external accounts that run the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub name: String,
    pub governor: String,
    pub halter: String,
    pub driver: String,
    /// Reports round outcomes to the consensus stand-in
    pub authority: String,
    pub inbox_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub enabled: bool,
    pub listen_addr: SocketAddr,
    pub cors_origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub max_open_files: i32,
    pub pruning: String, // "archive" or "pruned"
    pub keep_transactions: u64,
    pub snapshot_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    pub tick_seconds: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            chain: "mainnet".into(),
            pool: PoolConfig {
                name: "stake-pool".into(),
                governor: "governor".into(),
                halter: "halter".into(),
                driver: "driver".into(),
                authority: "authority".into(),
                inbox_capacity: 1024,
            },
            rpc: RpcConfig {
                enabled: true,
                listen_addr: SocketAddr::from(([127, 0, 0, 1], 8645)),
                cors_origin: "*".into(),
            },
            storage: StorageConfig {
                max_open_files: 1024,
                pruning: "pruned".into(),
                keep_transactions: 100_000,
                snapshot_interval_seconds: 30,
            },
            clock: ClockConfig { tick_seconds: 1 },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn chain_config(&self) -> anyhow::Result<ChainConfig> {
        let config = match self.chain.as_str() {
            "mainnet" => ChainConfig::mainnet(),
            "test" => ChainConfig::test(),
            other => anyhow::bail!("unknown chain preset {:?}", other),
        };
        config.validate()?;
        Ok(config)
    }
}
