//! TOML description of a pool set
//!
//! ```toml
//! name = "network"
//! capacity = 16
//! overflow = true
//! policy = "abort"
//!
//! [[pools]]
//! element_size = 64
//! count = 1024
//! ```
//!
//! Pools are added in file order; that order is the routing order.

use crate::backing::BackingAllocator;
use crate::error::{PoolError, ViolationPolicy};
use crate::pool_set::{PoolSet, DEFAULT_CAPACITY};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSetConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_true")]
    pub overflow: bool,

    #[serde(default)]
    pub policy: ViolationPolicy,

    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub element_size: usize,
    pub count: usize,
}

impl Default for PoolSetConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            capacity: DEFAULT_CAPACITY,
            overflow: true,
            policy: ViolationPolicy::default(),
            pools: Vec::new(),
        }
    }
}

fn default_name() -> String { "pools".to_string() }
fn default_capacity() -> usize { DEFAULT_CAPACITY }
fn default_true() -> bool { true }

impl PoolSetConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Build the described pool set on top of `backing`
    pub fn build<B: BackingAllocator + Clone>(&self, backing: B) -> Result<PoolSet<B>, ConfigError> {
        let mut set = PoolSet::new(self.name.clone(), backing)
            .with_capacity(self.capacity)
            .with_policy(self.policy);

        if !self.overflow {
            set = set.without_overflow();
        }

        for pool in &self.pools {
            set.add_pool(pool.element_size, pool.count)?;
        }

        info!(target: "poolset", set = %self.name, pools = set.len(), "pool set built from config");
        Ok(set)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Build(PoolError),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "Failed to read config: {}", msg),
            Self::Parse(msg) => write!(f, "Failed to parse config: {}", msg),
            Self::Build(err) => write!(f, "Failed to build pool set: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Build(err) => Some(err),
            _ => None,
        }
    }
}

impl From<PoolError> for ConfigError {
    fn from(err: PoolError) -> Self {
        Self::Build(err)
    }
}
