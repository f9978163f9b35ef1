//! Telemetry Collaborators
//!
//! Decoding the GoPro metadata track and rendering it as text tables is done by
//! external tools. This module defines the two seams the pipeline talks to:
//!
//! - [`TelemetryExtractor`] turns the raw clip bytes into an opaque [`DecodedTelemetry`]
//! - [`ChannelRenderer`] turns a [`DecodedTelemetry`] into one text table per channel
//!
//! Both are async and complete exactly once. A failure from either one ends the run.
//!
//! Implementations:
//! - [`external`]: `ffmpeg` + `gpmd2csv` subprocesses (the default)
//! - [`mock`]: in-process stand-ins for tests and dry runs

pub mod external;
pub mod mock;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::AppResult;

pub use external::{FfmpegExtractor, Gpmd2CsvRenderer};
pub use mock::{MockExtractor, MockRenderer};

/// Decoded telemetry handle.
///
/// Opaque to the pipeline: produced by an extractor and consumed only by a renderer.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedTelemetry {
    payload: Bytes,
}

impl DecodedTelemetry {
    /// Wrap an extracted payload.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Extracted payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl fmt::Debug for DecodedTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedTelemetry")
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Rendering mode selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Comma-separated text tables, header row first
    #[default]
    Csv,
}

/// Renderer output: channel name -> table text (newline-separated rows).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedChannels {
    tables: BTreeMap<String, String>,
}

impl RenderedChannels {
    /// Empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a channel table.
    pub fn insert(&mut self, channel: impl Into<String>, table: impl Into<String>) {
        self.tables.insert(channel.into(), table.into());
    }

    /// Table text for a channel.
    pub fn get(&self, channel: &str) -> Option<&str> {
        self.tables.get(channel).map(String::as_str)
    }

    /// Channel names present, sorted.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no channel was rendered.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for RenderedChannels
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut rendered = RenderedChannels::new();
        for (channel, table) in iter {
            rendered.insert(channel, table);
        }
        rendered
    }
}

/// Capability: locate and decode the telemetry stream embedded in a clip.
///
/// # Contract
/// - Receives the complete bounded input buffer
/// - Completes once, with a handle or an `Extraction` error
/// - An empty buffer must fail
#[async_trait]
pub trait TelemetryExtractor: Send + Sync {
    /// Decode `raw` into a telemetry handle.
    async fn extract(&self, raw: Bytes) -> AppResult<DecodedTelemetry>;
}

/// Capability: render decoded telemetry into per-channel text tables.
///
/// # Contract
/// - Completes once, with every channel it could render or a `Rendering` error
/// - Tables use `\n` between rows and `,` between fields, header row first
#[async_trait]
pub trait ChannelRenderer: Send + Sync {
    /// Render `telemetry` in `mode`.
    async fn render(
        &self,
        telemetry: &DecodedTelemetry,
        mode: RenderMode,
    ) -> AppResult<RenderedChannels>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_channels_collects_and_looks_up() {
        let rendered: RenderedChannels =
            [("Camera-GYRO", "g\n1"), ("Camera-ACCL", "a\n1")].into_iter().collect();

        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered.get("Camera-ACCL"), Some("a\n1"));
        assert_eq!(rendered.get("Camera-GPS5"), None);
        assert_eq!(
            rendered.channel_names().collect::<Vec<_>>(),
            vec!["Camera-ACCL", "Camera-GYRO"]
        );
    }

    #[test]
    fn decoded_telemetry_debug_hides_payload() {
        let decoded = DecodedTelemetry::new(vec![1u8, 2, 3]);
        assert_eq!(format!("{decoded:?}"), "DecodedTelemetry { payload_len: 3 }");
        assert_eq!(decoded.len(), 3);
    }
}
