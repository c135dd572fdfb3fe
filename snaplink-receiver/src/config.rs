//! Receiver configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use snaplink_core::{CodecConfig, ReceiverConfig};

/// Top-level configuration for the receiver binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverAppConfig {
    pub network: NetworkConfig,
    /// Frame variant and accept-loop timing.
    pub receiver: ReceiverConfig,
    /// Delta codec settings; must match the sender.
    pub codec: CodecConfig,
    /// Recording and reporting.
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to listen on (`host:port`).
    pub listen: String,
    /// Wait per readiness check in milliseconds.
    pub poll_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Capture file to record into. Empty disables recording.
    pub record: PathBuf,
    /// Interval between stats log lines in seconds (0 = off).
    pub report_interval_secs: u64,
    /// Stop after this many snapshots (0 = run until stopped).
    pub max_snapshots: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:7000".into(),
            poll_ms: 100,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            record: PathBuf::new(),
            report_interval_secs: 5,
            max_snapshots: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ReceiverAppConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Recording target, if enabled.
    pub fn record_path(&self) -> Option<&Path> {
        let path = self.output.record.as_path();
        (!path.as_os_str().is_empty()).then_some(path)
    }
}

// ── Tests ────────────────────────────────────────────────────────
