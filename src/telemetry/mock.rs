//! Mock Collaborator Implementations
//!
//! In-process extractor and renderer with the same contracts as the external tools.
//! Useful for tests and for exercising the merge without ffmpeg installed.
//!
//! - `MockExtractor` - passes the buffer through, fails on empty input
//! - `MockRenderer` - returns a preset channel mapping, or a preset failure

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ChannelRenderer, DecodedTelemetry, RenderMode, RenderedChannels, TelemetryExtractor};
use crate::error::{AppResult, TelemetryError};

// =============================================================================
// MockExtractor
// =============================================================================

/// Extractor that treats the input buffer itself as the decoded payload.
#[derive(Debug, Default)]
pub struct MockExtractor {
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockExtractor {
    /// Pass-through extractor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor that always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `extract` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TelemetryExtractor for MockExtractor {
    async fn extract(&self, raw: Bytes) -> AppResult<DecodedTelemetry> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(TelemetryError::Extraction(message.clone()));
        }
        if raw.is_empty() {
            return Err(TelemetryError::Extraction(
                "input buffer is empty, no telemetry to locate".to_string(),
            ));
        }
        Ok(DecodedTelemetry::new(raw))
    }
}

// =============================================================================
// MockRenderer
// =============================================================================

/// Renderer returning a fixed set of channel tables.
#[derive(Debug, Default)]
pub struct MockRenderer {
    channels: RenderedChannels,
    failure: Option<String>,
    calls: AtomicUsize,
}

impl MockRenderer {
    /// Renderer that returns `channels` on every call.
    pub fn new(channels: RenderedChannels) -> Self {
        Self {
            channels,
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Renderer that always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            channels: RenderedChannels::new(),
            failure: Some(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times `render` has been called.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelRenderer for MockRenderer {
    async fn render(
        &self,
        telemetry: &DecodedTelemetry,
        mode: RenderMode,
    ) -> AppResult<RenderedChannels> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(TelemetryError::Rendering(message.clone()));
        }
        tracing::debug!(payload = telemetry.len(), ?mode, "mock render");
        Ok(self.channels.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extractor_rejects_empty_buffer() {
        let extractor = MockExtractor::new();
        let err = extractor.extract(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Extraction(_)));
        assert_eq!(extractor.calls(), 1);
    }

    #[tokio::test]
    async fn extractor_passes_bytes_through() {
        let extractor = MockExtractor::new();
        let decoded = extractor
            .extract(Bytes::from_static(b"DEVC"))
            .await
            .unwrap();
        assert_eq!(decoded.payload().as_ref(), b"DEVC");
    }

    #[tokio::test]
    async fn renderer_returns_preset_or_failure() {
        let channels: RenderedChannels = [("Camera-ACCL", "h\n1")].into_iter().collect();
        let renderer = MockRenderer::new(channels.clone());
        let decoded = DecodedTelemetry::new(vec![0u8]);
        assert_eq!(
            renderer.render(&decoded, RenderMode::Csv).await.unwrap(),
            channels
        );

        let broken = MockRenderer::failing("no GPS lock");
        let err = broken.render(&decoded, RenderMode::Csv).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Rendering(m) if m == "no GPS lock"));
    }
}
