use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DebugBarError, Result};

/// Environment variable holding the path of the TOML config file.
pub const CONFIG_ENV: &str = "DEBUGBAR_CONFIG";

// ─── Top-level config ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugBarConfig {
    /// Prefix of the delivered headers (`<prefix>` and `<prefix>-id`).
    pub header_name: String,
    /// Session key holding the stacked batch.
    pub stack_session_namespace: String,
    /// Keep full records in session even when storage is configured.
    pub stack_always_use_session: bool,
    /// Abort `collect()` on the first collector failure.
    pub strict: bool,
    pub log_level: String,
    pub sql: SqlConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
}

impl Default for DebugBarConfig {
    fn default() -> Self {
        Self {
            header_name: "debugbar".into(),
            stack_session_namespace: "DEBUGBAR_STACK_DATA".into(),
            stack_always_use_session: false,
            strict: false,
            log_level: "info".into(),
            sql: SqlConfig::default(),
            storage: StorageConfig::default(),
            session: SessionConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl DebugBarConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| DebugBarError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DebugBarError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reads the file named by `DEBUGBAR_CONFIG`, or returns defaults when unset.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }
}

// ─── Sections ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// One char for both sides, or an even-length string split in half.
    pub quotation_char: String,
    /// Report statements with parameters substituted back in.
    pub render_with_params: bool,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            quotation_char: "<>".into(),
            render_with_params: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    None,
    Memory,
    File,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory used by the file backend.
    pub path: PathBuf,
    pub redis_url: String,
    /// Hash prefix used by the redis backend.
    pub redis_hash: String,
    /// Records the memory backend keeps before evicting the oldest.
    pub memory_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("debugbar-data"),
            redis_url: "redis://127.0.0.1:6379/".into(),
            redis_hash: "debugbar".into(),
            memory_capacity: crate::storage::DEFAULT_MEMORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".into(),
        }
    }
}
