//! Configuration for the sender binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use snaplink_core::{AsyncSenderConfig, CodecConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderAppConfig {
    /// Where to connect.
    pub network: NetworkConfig,
    /// Sender flavour and pacing.
    pub sender: SenderConfig,
    /// Delta codec settings; must match the receiver.
    pub codec: CodecConfig,
    /// Queue settings for `mode = "async"`.
    pub queue: AsyncSenderConfig,
    /// Where snapshots come from.
    pub source: SourceConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Receiver address (`host:port`).
    pub peer: String,
    /// Delay between connection attempts in milliseconds.
    pub reconnect_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderMode {
    /// Blocking sends, paired-length frames.
    #[default]
    Sync,
    /// Queued sends, single-length frames.
    Async,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub mode: SenderMode,
    /// Snapshots per second.
    pub rate_hz: u32,
    /// Stop after this many snapshots (0 = run until stopped).
    pub max_snapshots: u64,
    /// Interval between stats log lines in seconds (0 = off).
    pub report_interval_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Synthetic,
    File,
}

/// Snapshot source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Capture file for `kind = "file"`.
    pub path: PathBuf,
    /// Synthetic snapshot size in bytes.
    pub snapshot_len: usize,
    /// Bytes changed per synthetic snapshot.
    pub changed_bytes: usize,
    /// Seed for the synthetic generator.
    pub seed: u64,
}

/// Logging settings.
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
            peer: "127.0.0.1:7000".into(),
            reconnect_ms: 1000,
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            mode: SenderMode::Sync,
            rate_hz: 60,
            max_snapshots: 0,
            report_interval_secs: 5,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            path: PathBuf::from("snapshots.cap"),
            snapshot_len: 4000,
            changed_bytes: 10,
            seed: 0x5eed,
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

impl SenderAppConfig {
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

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use snaplink_core::Compression;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&SenderAppConfig::default()).unwrap();
        assert!(text.contains("peer"));
        assert!(text.contains("compress_threshold"));
        assert!(text.contains("mode = \"sync\""));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: SenderAppConfig = toml::from_str(
            r#"
            [sender]
            mode = "async"

            [codec.compression]
            backend = "zstd"
            level = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sender.mode, SenderMode::Async);
        assert_eq!(cfg.sender.rate_hz, 60);
        assert_eq!(cfg.codec.compression, Compression::Zstd { level: 3 });
        assert_eq!(cfg.network.peer, "127.0.0.1:7000");
    }

    #[test]
    fn missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SenderAppConfig::load(&dir.path().join("absent.toml"));
        assert_eq!(cfg.source.snapshot_len, 4000);
    }

    #[test]
    fn write_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sender.toml");
        SenderAppConfig::write_default(&path).unwrap();
        let cfg = SenderAppConfig::load(&path);
        assert_eq!(cfg.source.kind, SourceKind::Synthetic);
        assert_eq!(cfg.codec.compress_threshold, 1500);
    }
}
