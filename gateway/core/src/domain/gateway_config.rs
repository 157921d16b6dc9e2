// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration
//
// Settings for the nfsg daemon: where volumes live, where the HTTP API
// listens, how `exportfs` is located and whether the host NFS server is
// prepared at startup. Loaded from YAML, then environment overrides, then
// command-line flags (applied by the binary).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "NFSG_CONFIG_PATH";

/// File name of the record database inside the data root
pub const DATABASE_FILE: &str = "volumes.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Address the HTTP API binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Data root; volumes live under `<root>/nfs`, records in `<root>/volumes.db`
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Explicit `exportfs` binary. Looked up on `PATH` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exportfs_path: Option<PathBuf>,

    /// Load nfsd, mount its filesystem and start the RPC daemons at startup
    #[serde(default = "default_true")]
    pub bootstrap_nfsd: bool,

    /// How long to wait for the record database lock at startup
    #[serde(default = "default_db_open_timeout", with = "humantime_serde")]
    pub db_open_timeout: Duration,
}

fn default_listen_addr() -> String {
    "127.0.0.1:80".to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from("/var/lib/nfsg")
}

fn default_true() -> bool {
    true
}

fn default_db_open_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            root: default_root(),
            exportfs_path: None,
            bootstrap_nfsd: true,
            db_open_timeout: default_db_open_timeout(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Render as YAML
    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. NFSG_CONFIG_PATH environment variable
    /// 2. ./nfsg-config.yaml (working directory)
    /// 3. /etc/nfsg/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./nfsg-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        let system_config = PathBuf::from("/etc/nfsg/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load from an explicit path (must exist), else discovery, else defaults.
    /// Environment overrides are applied in every case.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else {
            tracing::debug!("No configuration file found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NFSG_BOOTSTRAP_NFSD") {
            match parse_bool(&val) {
                Some(enabled) => {
                    tracing::info!("Environment override: NFSG_BOOTSTRAP_NFSD={}", enabled);
                    self.bootstrap_nfsd = enabled;
                }
                None => {
                    tracing::warn!(
                        "Invalid value for NFSG_BOOTSTRAP_NFSD: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("NFSG_EXPORTFS_PATH") {
            if !val.is_empty() {
                tracing::info!("Environment override: NFSG_EXPORTFS_PATH={}", val);
                self.exportfs_path = Some(PathBuf::from(val));
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.root.is_absolute() {
            anyhow::bail!("root must be an absolute path, got {:?}", self.root);
        }

        self.listen_socket_addr()?;

        if let Some(path) = &self.exportfs_path {
            if path.as_os_str().is_empty() {
                anyhow::bail!("exportfs_path cannot be empty");
            }
        }

        Ok(())
    }

    pub fn listen_socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen_addr '{}': {}", self.listen_addr, e))
    }

    /// Directory holding one subdirectory per volume
    pub fn nfs_dir(&self) -> PathBuf {
        self.root.join(crate::domain::volume::NFS_DIR)
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
