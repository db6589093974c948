//! Store configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatecapError};

/// Named databases the LMDB store creates
pub(crate) const REQUIRED_DBS: u32 = 4;

/// Where and how the LMDB-backed store opens its environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Maximum size of the memory map in bytes
    pub map_size: usize,
    pub max_dbs: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("statecap_data"), map_size: 1 << 30, max_dbs: 8 }
    }
}

impl StoreConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), ..Self::default() }
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let c: StoreConfig = serde_json::from_str(json).map_err(|e| StatecapError::Config(e.to_string()))?;
        c.validate()?;
        Ok(c)
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(StatecapError::Config("path is empty".into()));
        }
        if self.map_size == 0 {
            return Err(StatecapError::Config("map_size must be positive".into()));
        }
        if self.max_dbs < REQUIRED_DBS {
            return Err(StatecapError::Config(format!("max_dbs must be at least {}", REQUIRED_DBS)));
        }
        Ok(())
    }
}
