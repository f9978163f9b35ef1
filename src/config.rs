//! Configuration System using Figment
//!
//! Strongly-typed configuration for a merge run. Values are layered:
//! 1. Built-in defaults (`TelemergeConfig::default()`)
//! 2. An optional TOML file (`telemerge.toml` or the `--config` path)
//! 3. Environment variables prefixed with `TELEMERGE_`, `__` separating sections
//!
//! # Example
//! ```no_run
//! use telemerge::config::TelemergeConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TelemergeConfig::load()?;
//! println!("Byte cap: {}", config.reader.byte_cap);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::error::{AppResult, TelemetryError};
use crate::logging::OutputFormat;

/// Default file looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "telemerge.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TELEMERGE_";

/// Byte budget observed in the field. Well below a full clip; raise it for real footage.
pub const DEFAULT_BYTE_CAP: usize = 26_843;

/// Largest accepted read size; the reader allocates one chunk up front.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemergeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Bounded reader settings
    pub reader: ReaderConfig,
    /// Channel merge settings
    pub merge: MergeConfig,
    /// ffmpeg extraction settings
    pub extractor: ExtractorConfig,
    /// gpmd2csv rendering settings
    pub renderer: RendererConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: OutputFormat,
    /// Emit span close events with stage timings
    pub log_span_timings: bool,
    /// Include source file and line in log lines
    pub log_source_location: bool,
    /// Colorize pretty output
    pub log_ansi: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: OutputFormat::Pretty,
            log_span_timings: false,
            log_source_location: false,
            log_ansi: true,
        }
    }
}

/// Input ingestion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Stop accumulating once this many bytes are buffered
    pub byte_cap: usize,
    /// Size of each read from the input stream
    pub chunk_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            byte_cap: DEFAULT_BYTE_CAP,
            chunk_size: 64 * 1024,
        }
    }
}

/// How channel tables are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Row `i` of every channel lands on output row `i`
    #[default]
    RowIndex,
    /// Outer join on a shared timestamp column
    Timestamp,
}

/// Channel merge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Channels to merge, in output column order
    pub channels: Vec<String>,
    /// Merge strategy
    pub strategy: MergeStrategy,
    /// Join column used by the timestamp strategy
    pub timestamp_column: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            channels: vec![
                "Camera-ACCL".to_string(),
                "Camera-GYRO".to_string(),
                "Camera-GPS5".to_string(),
            ],
            strategy: MergeStrategy::RowIndex,
            timestamp_column: "Milliseconds".to_string(),
        }
    }
}

/// Extraction collaborator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// ffmpeg executable
    pub ffmpeg: String,
    /// `-map` selector of the GoPro metadata track
    pub stream_map: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            stream_map: "0:2".to_string(),
        }
    }
}

/// Rendering collaborator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// gpmd2csv executable
    pub gpmd2csv: String,
    /// Output file suffix -> channel name
    pub channel_files: BTreeMap<String, String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let channel_files = [
            ("accl", "Camera-ACCL"),
            ("gyro", "Camera-GYRO"),
            ("gps", "Camera-GPS5"),
        ]
        .into_iter()
        .map(|(suffix, channel)| (suffix.to_string(), channel.to_string()))
        .collect();

        Self {
            gpmd2csv: "gpmd2csv".to_string(),
            channel_files,
        }
    }
}

impl TelemergeConfig {
    /// Load defaults, `telemerge.toml` if present, then `TELEMERGE_` environment overrides
    ///
    /// Example: `TELEMERGE_READER__BYTE_CAP=65536`
    pub fn load() -> AppResult<Self> {
        Self::figment(Path::new(DEFAULT_CONFIG_FILE)).extract().map_err(Into::into)
    }

    /// Load configuration from a specific file path. The file must exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TelemetryError::Configuration(format!(
                "config file '{}' does not exist",
                path.display()
            )));
        }
        Self::figment(path).extract().map_err(Into::into)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(TelemergeConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(TelemetryError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.reader.byte_cap == 0 {
            return Err(TelemetryError::Configuration(
                "reader.byte_cap must be greater than 0".to_string(),
            ));
        }
        if self.reader.chunk_size == 0 {
            return Err(TelemetryError::Configuration(
                "reader.chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.reader.chunk_size > MAX_CHUNK_SIZE {
            return Err(TelemetryError::Configuration(format!(
                "reader.chunk_size {} exceeds the maximum of {MAX_CHUNK_SIZE} bytes",
                self.reader.chunk_size
            )));
        }

        if self.merge.channels.is_empty() {
            return Err(TelemetryError::Configuration(
                "merge.channels must name at least one channel".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for channel in &self.merge.channels {
            if !seen.insert(channel) {
                return Err(TelemetryError::Configuration(format!(
                    "Duplicate channel: {channel}"
                )));
            }
        }

        if self.merge.strategy == MergeStrategy::Timestamp
            && self.merge.timestamp_column.trim().is_empty()
        {
            return Err(TelemetryError::Configuration(
                "merge.timestamp_column must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
