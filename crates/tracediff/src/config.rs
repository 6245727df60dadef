//! TOML configuration describing the interpreters under test.
//!
//! ```toml
//! timeout_secs = 60
//!
//! [[evm]]
//! kind = "geth"
//! path = "/usr/local/bin/evm"
//!
//! [[evm]]
//! kind = "parity"
//! path = "/usr/local/bin/parity-evm"
//! name = "openethereum"
//! timeout_secs = 120
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::evms::{Evm, EvmBinary, EvmKind};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceDiffConfig {
    /// Deadline applied to every interpreter without its own.
    pub timeout_secs: Option<u64>,
    #[serde(rename = "evm")]
    pub evms: Vec<EvmEntry>,
}

/// One interpreter binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmEntry {
    pub kind: EvmKind,
    pub path: PathBuf,
    /// Defaults to the family name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl EvmEntry {
    pub fn new(kind: EvmKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            name: None,
            timeout_secs: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.kind.as_str())
    }
}

impl TraceDiffConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Validate configuration values, returning an error message on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == Some(0) {
            return Err("timeout_secs must be greater than 0".to_string());
        }
        let mut names = HashSet::new();
        for entry in &self.evms {
            if entry.path.as_os_str().is_empty() {
                return Err(format!("evm `{}` has an empty path", entry.display_name()));
            }
            if entry.timeout_secs == Some(0) {
                return Err(format!(
                    "evm `{}`: timeout_secs must be greater than 0",
                    entry.display_name()
                ));
            }
            if !names.insert(entry.display_name()) {
                return Err(format!(
                    "duplicate evm name `{}`, set `name` to tell them apart",
                    entry.display_name()
                ));
            }
        }
        Ok(())
    }

    /// Add or replace the entry for `kind`. Used for command-line overrides.
    pub fn set_binary(&mut self, kind: EvmKind, path: impl Into<PathBuf>) {
        let path = path.into();
        match self
            .evms
            .iter_mut()
            .find(|entry| entry.kind == kind && entry.name.is_none())
        {
            Some(entry) => entry.path = path,
            None => self.evms.push(EvmEntry::new(kind, path)),
        }
    }

    fn binary(&self, entry: &EvmEntry) -> EvmBinary {
        let mut binary = EvmBinary::new(&entry.path);
        if let Some(name) = &entry.name {
            binary = binary.with_name(name);
        }
        if let Some(secs) = entry.timeout_secs.or(self.timeout_secs) {
            binary = binary.with_timeout(Duration::from_secs(secs));
        }
        binary
    }

    /// Build one adapter per configured interpreter, in file order.
    pub fn build_evms(&self) -> Vec<Box<dyn Evm>> {
        self.evms
            .iter()
            .map(|entry| entry.kind.build(self.binary(entry)))
            .collect()
    }
}
