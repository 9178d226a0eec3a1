//! TOML configuration for the Tessera daemon.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Node identity and addresses.
    pub node: NodeSection,
    /// Cluster membership.
    pub cluster: ClusterSection,
    /// Checkpoint signing.
    pub signing: SigningSection,
    /// Log entry storage backend.
    pub storage: StorageSection,
    /// Record retention.
    pub retention: RetentionSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Directory for persistent data (log DB, record store, key files).
    pub data_dir: PathBuf,
    /// Address for the public HTTP API.
    pub api_listen_addr: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".tessera"))
            .unwrap_or_else(|| PathBuf::from(".tessera"));
        Self {
            data_dir,
            api_listen_addr: "0.0.0.0:4920".to_string(),
        }
    }
}

/// `[cluster]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// Shared secret for cluster authentication.
    ///
    /// If not set (empty), a random secret is generated at startup and
    /// displayed so the operator can pass it to other nodes.
    pub secret: String,
    /// Peer nodes to contact on startup (`"endpoint-id"` or
    /// `"endpoint-id@host:port"`).
    pub peers: Vec<String>,
}

/// `[signing]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SigningSection {
    /// This node's signer index (1-based). Omit on non-signer nodes.
    pub signer_index: Option<u16>,
    /// Path to this node's secret share (hex). Relative paths are resolved
    /// against the data directory. Defaults to `signer.key`.
    pub share_file: Option<PathBuf>,
    /// Path to the signer roster (group key + public shares). Relative
    /// paths are resolved against the data directory. Defaults to
    /// `roster.toml`.
    pub roster_file: Option<PathBuf>,
    /// Seconds between checkpoint attempts.
    pub checkpoint_interval_secs: Option<u64>,
    /// Seconds a signing session accepts shares before expiring.
    pub session_ttl_secs: Option<u64>,
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Backend type: `"disk"` (default) or `"memory"`.
    pub backend: String,
    /// Maximum accepted event payload size in bytes.
    pub max_payload_bytes: Option<usize>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "disk".to_string(),
            max_payload_bytes: None,
        }
    }
}

/// `[retention]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetentionSection {
    /// Statutory retention window in days. Records are kept at least this
    /// long; nothing evicts them earlier.
    pub days: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        // 5 years.
        Self { days: 1825 }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Effective retention window in seconds.
    pub fn retention_secs(&self) -> u64 {
        self.retention.days * 24 * 60 * 60
    }

    /// Effective payload cap (64 KB default).
    pub fn max_payload_bytes(&self) -> usize {
        self.storage.max_payload_bytes.unwrap_or(64 * 1024)
    }

    /// Seconds between checkpoint attempts (30 default).
    pub fn checkpoint_interval_secs(&self) -> u64 {
        self.signing.checkpoint_interval_secs.unwrap_or(30)
    }

    /// Seconds a signing session stays open (30 default).
    pub fn session_ttl_secs(&self) -> u64 {
        self.signing.session_ttl_secs.unwrap_or(30)
    }

    /// Path to this node's secret share file.
    pub fn share_file(&self) -> PathBuf {
        self.resolve(self.signing.share_file.as_deref(), "signer.key")
    }

    /// Path to the signer roster file.
    pub fn roster_file(&self) -> PathBuf {
        self.resolve(self.signing.roster_file.as_deref(), "roster.toml")
    }

    fn resolve(&self, configured: Option<&Path>, default_name: &str) -> PathBuf {
        let path = configured
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(default_name));
        if path.is_absolute() {
            path
        } else {
            self.node.data_dir.join(path)
        }
    }
}
