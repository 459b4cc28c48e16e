//! `divaift.toml` configuration
//!
//! Every field is optional; command-line flags override whatever the file
//! sets. Missing sections fall back to the defaults below.

use crate::error::{IftError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_ROOT_PATH: &str = "/ldut";
pub const DEFAULT_RESET_DOMAIN: &str = "tile_reset_domain";
pub const DEFAULT_HARNESS_PREFIX: &str = "/Testbench/testHarness";
pub const DEFAULT_HANDSHAKE_SUFFIX: &str = "_valid";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct IftConfig {
    pub instrument: InstrumentConfig,
    pub summary: SummaryConfig,
    pub sinks: SinkConfig,
}

/// Shadow instrumentation settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Number of taint channels
    pub taint_num: Option<u32>,
    /// Signals never instrumented
    pub ignore_ports: Vec<String>,
    /// Sink designation file
    pub vec_anno: Option<PathBuf>,
}

/// Coverage/summary reducer settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SummaryConfig {
    /// Keep a separate accumulator for sink registers
    pub split_sinks: Option<bool>,
    /// Only count memory arrays
    pub array_only: Option<bool>,
    /// Fingerprint seed; selects the hash reducer
    pub seed: Option<u64>,
}

/// Sink location and harness command settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SinkConfig {
    /// Hierarchy root
    pub top: Option<String>,
    /// Path prefix of the root instance
    pub root_path: Option<String>,
    /// Only sinks under an instance path containing this are emitted
    pub reset_domain: Option<String>,
    /// Prefix of every emitted harness path
    pub harness_prefix: Option<String>,
    /// Port name suffixes that mark a handshake interface
    pub handshake_suffixes: Vec<String>,
}

impl IftConfig {
    /// Load configuration from a specific path, resolving relative paths
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&content)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: IftConfig = toml::from_str(content)?;
        if config.instrument.taint_num == Some(0) {
            return Err(IftError::Config("taint_num must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        if let Some(p) = &mut self.instrument.vec_anno {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }

    pub fn taint_num(&self) -> u32 {
        self.instrument.taint_num.unwrap_or(1)
    }
}

impl SinkConfig {
    pub fn root_path(&self) -> &str {
        self.root_path.as_deref().unwrap_or(DEFAULT_ROOT_PATH)
    }

    pub fn reset_domain(&self) -> &str {
        self.reset_domain.as_deref().unwrap_or(DEFAULT_RESET_DOMAIN)
    }

    pub fn harness_prefix(&self) -> &str {
        self.harness_prefix
            .as_deref()
            .unwrap_or(DEFAULT_HARNESS_PREFIX)
    }

    pub fn handshake_suffixes(&self) -> Vec<String> {
        if self.handshake_suffixes.is_empty() {
            vec![DEFAULT_HANDSHAKE_SUFFIX.to_string()]
        } else {
            self.handshake_suffixes.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config() {
        let config = IftConfig::parse("").unwrap();
        assert_eq!(config.taint_num(), 1);
        assert!(config.instrument.ignore_ports.is_empty());
        assert_eq!(config.sinks.root_path(), "/ldut");
        assert_eq!(config.sinks.handshake_suffixes(), vec!["_valid"]);
    }

    #[test]
    fn test_full_config() {
        let config = IftConfig::parse(
            r#"
[instrument]
taint_num = 3
ignore_ports = ["clock", "reset"]

[summary]
split_sinks = true
seed = 7

[sinks]
top = "TestHarness"
reset_domain = "core_domain"
handshake_suffixes = ["_valid", "_ready"]
"#,
        )
        .unwrap();
        assert_eq!(config.taint_num(), 3);
        assert_eq!(config.instrument.ignore_ports, vec!["clock", "reset"]);
        assert_eq!(config.summary.split_sinks, Some(true));
        assert_eq!(config.summary.seed, Some(7));
        assert_eq!(config.sinks.top.as_deref(), Some("TestHarness"));
        assert_eq!(config.sinks.reset_domain(), "core_domain");
        assert_eq!(config.sinks.harness_prefix(), "/Testbench/testHarness");
        assert_eq!(config.sinks.handshake_suffixes().len(), 2);
    }

    #[test]
    fn test_zero_channels_rejected() {
        let err = IftConfig::parse("[instrument]\ntaint_num = 0\n").unwrap_err();
        assert!(matches!(err, IftError::Config(_)));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("divaift.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[instrument]\nvec_anno = \"sinks.txt\"").unwrap();

        let config = IftConfig::load(&path).unwrap();
        assert_eq!(
            config.instrument.vec_anno.unwrap(),
            dir.path().join("sinks.txt")
        );
    }
}
