//! TOML configuration for `ternd`.
//!
//! Every section and field is optional; missing values fall back to the
//! library defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tern_engine::{RefreshConfig, TernNodeConfig};
use tern_rescue::RescueConfig;
use tern_trust::TrustValues;
use tern_visibility::VisibilityPolicy;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub node: NodeSection,
    pub rescue: RescueSection,
    pub trust: TrustSection,
    pub refresh: RefreshSection,
    pub log: LogSection,
}

/// `[node]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Directory holding the identity key and the document store.
    pub data_dir: PathBuf,
}

impl Default for NodeSection {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .map(|h| h.join(".tern"))
            .unwrap_or_else(|| PathBuf::from(".tern"));
        Self { data_dir }
    }
}

/// `[rescue]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RescueSection {
    /// Give up waiting for an identity's update lock after this many
    /// milliseconds. Unset waits forever.
    pub lock_timeout_ms: Option<u64>,
    /// Treat a fetch as failed after this many milliseconds.
    pub fetch_timeout_ms: Option<u64>,
}

/// `[trust]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TrustSection {
    /// Explicit value written by `trust`.
    pub positive: i32,
    /// Explicit value written by `distrust`.
    pub negative: i32,
    /// Hide content from identities with no trust path.
    pub hide_trustless: bool,
}

impl Default for TrustSection {
    fn default() -> Self {
        let values = TrustValues::default();
        Self {
            positive: values.positive,
            negative: values.negative,
            hide_trustless: VisibilityPolicy::default().hide_trustless,
        }
    }
}

/// `[refresh]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RefreshSection {
    /// Editions probed past the current one per refresh.
    pub max_probe: u64,
    /// Seconds between two refresh passes.
    pub interval_secs: u64,
}

impl Default for RefreshSection {
    fn default() -> Self {
        let defaults = RefreshConfig::default();
        Self {
            max_probe: defaults.max_probe,
            interval_secs: defaults.interval.as_secs(),
        }
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
            level: "warn".to_string(),
        }
    }
}

impl CliConfig {
    /// Read `path`, or fall back to the built-in defaults when there is none.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    #[cfg(test)]
    fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Directory of the on-disk document store.
    pub fn store_dir(&self) -> PathBuf {
        self.node.data_dir.join("store")
    }

    /// Path of the local identity's signing key.
    pub fn key_path(&self) -> PathBuf {
        self.node.data_dir.join("identity.key")
    }

    /// Path of the list of tracked remote identities.
    pub fn identities_path(&self) -> PathBuf {
        self.node.data_dir.join("identities")
    }

    pub fn node_config(&self) -> TernNodeConfig {
        TernNodeConfig {
            rescue: RescueConfig {
                lock_timeout: self.rescue.lock_timeout_ms.map(Duration::from_millis),
                fetch_timeout: self.rescue.fetch_timeout_ms.map(Duration::from_millis),
            },
            refresh: RefreshConfig {
                max_probe: self.refresh.max_probe.max(1),
                interval: Duration::from_secs(self.refresh.interval_secs.max(1)),
            },
            visibility: VisibilityPolicy {
                hide_trustless: self.trust.hide_trustless,
            },
            trust_values: TrustValues {
                positive: self.trust.positive,
                negative: self.trust.negative,
            },
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
