//! End-to-end pipeline tests with in-process collaborators.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use telemerge::telemetry::{MockExtractor, MockRenderer};
use telemerge::{
    AppResult, ChannelRenderer, DecodedTelemetry, MergeStrategy, Pipeline, RenderMode,
    RenderedChannels, TelemergeConfig, TelemetryError, TelemetryExtractor,
};

fn gopro_channels() -> RenderedChannels {
    [
        (
            "Camera-ACCL",
            "Milliseconds,AcclX,AcclY,AcclZ\n0,9.81,0.1,0.2\n5,9.80,0.1,0.3\n10,9.79,0.2,0.3",
        ),
        (
            "Camera-GYRO",
            "Milliseconds,GyroX,GyroY,GyroZ\n0,0.01,0.02,0.03\n5,0.02,0.02,0.03\n10,0.02,0.01,0.03",
        ),
        (
            "Camera-GPS5",
            "Milliseconds,Latitude,Longitude,Altitude\n0,47.37,8.54,408\n10,47.38,8.55,409",
        ),
    ]
    .into_iter()
    .collect()
}

fn mock_pipeline(config: TelemergeConfig, channels: RenderedChannels) -> Pipeline {
    Pipeline::new(
        config,
        Arc::new(MockExtractor::new()),
        Arc::new(MockRenderer::new(channels)),
    )
}

/// Records stage order and the buffer size it was handed.
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
    channels: RenderedChannels,
}

#[async_trait]
impl TelemetryExtractor for Recorder {
    async fn extract(&self, raw: Bytes) -> AppResult<DecodedTelemetry> {
        self.events
            .lock()
            .unwrap()
            .push(format!("extract:{}", raw.len()));
        Ok(DecodedTelemetry::new(raw))
    }
}

#[async_trait]
impl ChannelRenderer for Recorder {
    async fn render(
        &self,
        telemetry: &DecodedTelemetry,
        _mode: RenderMode,
    ) -> AppResult<RenderedChannels> {
        self.events
            .lock()
            .unwrap()
            .push(format!("render:{}", telemetry.len()));
        Ok(self.channels.clone())
    }
}

#[tokio::test]
async fn test_concrete_two_channel_scenario() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("GX010001.MP4");
    let output = dir.path().join("merged.csv");
    std::fs::write(&input, b"\x00\x00\x00\x18ftypmp41")?;

    let mut config = TelemergeConfig::default();
    config.merge.channels = vec!["A".into(), "B".into()];
    let channels: RenderedChannels = [("A", "h1\na0\na1"), ("B", "h2\nb0")].into_iter().collect();

    let summary = mock_pipeline(config, channels).run(&input, &output).await?;

    assert_eq!(std::fs::read_to_string(&output)?, "h1,h2\na0,b0\na1");
    assert_eq!(summary.data_rows, 2);
    assert_eq!(summary.partial_rows, 1);
    Ok(())
}

#[tokio::test]
async fn test_default_channel_order_is_accl_gyro_gps() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("clip.mp4");
    let output = dir.path().join("merged.csv");
    std::fs::write(&input, vec![7u8; 128])?;

    mock_pipeline(TelemergeConfig::default(), gopro_channels())
        .run(&input, &output)
        .await?;

    let content = std::fs::read_to_string(&output)?;
    let lines: Vec<&str> = content.split('\n').collect();
    assert_eq!(
        lines[0],
        "Milliseconds,AcclX,AcclY,AcclZ,Milliseconds,GyroX,GyroY,GyroZ,Milliseconds,Latitude,Longitude,Altitude"
    );
    assert_eq!(lines[1], "0,9.81,0.1,0.2,0,0.01,0.02,0.03,0,47.37,8.54,408");
    assert_eq!(lines[3], "10,9.79,0.2,0.3,10,0.02,0.01,0.03");
    assert_eq!(lines.len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_existing_output_is_fully_overwritten() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("clip.mp4");
    let output = dir.path().join("merged.csv");
    std::fs::write(&input, b"GPMF")?;
    std::fs::write(&output, "old,table\n".repeat(500))?;

    mock_pipeline(TelemergeConfig::default(), gopro_channels())
        .run(&input, &output)
        .await?;

    let content = std::fs::read_to_string(&output)?;
    assert!(!content.contains("old,table"));
    assert!(content.starts_with("Milliseconds,AcclX"));
    Ok(())
}

#[tokio::test]
async fn test_empty_input_fails_extraction_without_output() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("empty.mp4");
    let output = dir.path().join("merged.csv");
    std::fs::write(&input, b"")?;

    let extractor = Arc::new(MockExtractor::new());
    let renderer = Arc::new(MockRenderer::new(gopro_channels()));
    let pipeline = Pipeline::new(
        TelemergeConfig::default(),
        extractor.clone(),
        renderer.clone(),
    );

    let err = pipeline.run(&input, &output).await.unwrap_err();

    assert!(matches!(err, TelemetryError::Extraction(_)));
    assert_eq!(extractor.calls(), 1);
    assert_eq!(renderer.calls(), 0);
    assert!(!output.exists());
    Ok(())
}

#[tokio::test]
async fn test_rendering_failure_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("clip.mp4");
    let output = dir.path().join("merged.csv");
    std::fs::write(&input, b"GPMF")?;

    let pipeline = Pipeline::new(
        TelemergeConfig::default(),
        Arc::new(MockExtractor::new()),
        Arc::new(MockRenderer::failing("unsupported firmware")),
    );

    let err = pipeline.run(&input, &output).await.unwrap_err();
    assert!(matches!(err, TelemetryError::Rendering(_)));
    assert!(!output.exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_channel_writes_nothing() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("clip.mp4");
    let output = dir.path().join("merged.csv");
    std::fs::write(&input, b"GPMF")?;

    let channels: RenderedChannels = [("Camera-ACCL", "h\n1"), ("Camera-GYRO", "h\n1")]
        .into_iter()
        .collect();
    let err = mock_pipeline(TelemergeConfig::default(), channels)
        .run(&input, &output)
        .await
        .unwrap_err();

    assert!(matches!(err, TelemetryError::MissingChannel(name) if name == "Camera-GPS5"));
    assert!(!output.exists());
    Ok(())
}

#[tokio::test]
async fn test_stages_run_in_order_with_capped_buffer() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("clip.mp4");
    let output = dir.path().join("merged.csv");
    std::fs::write(&input, vec![0xAB; 10_000])?;

    let mut config = TelemergeConfig::default();
    config.reader.byte_cap = 1_000;
    config.reader.chunk_size = 256;

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::new(Recorder {
        events: events.clone(),
        channels: gopro_channels(),
    });
    let pipeline = Pipeline::new(config, recorder.clone(), recorder);

    let summary = pipeline.run(&input, &output).await?;

    // 4 chunks of 256 cross the 1000-byte cap; the straddling chunk is kept whole.
    assert_eq!(summary.bytes_read, 1_024);
    assert_eq!(summary.bytes_discarded, 10_000 - 1_024);
    assert_eq!(
        *events.lock().unwrap(),
        vec!["extract:1024".to_string(), "render:1024".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_timestamp_strategy_joins_on_milliseconds() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("clip.mp4");
    let output = dir.path().join("merged.csv");
    std::fs::write(&input, b"GPMF")?;

    let mut config = TelemergeConfig::default();
    config.merge.strategy = MergeStrategy::Timestamp;

    let summary = mock_pipeline(config, gopro_channels())
        .run(&input, &output)
        .await?;

    let content = std::fs::read_to_string(&output)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines[0],
        "Milliseconds,AcclX,AcclY,AcclZ,GyroX,GyroY,GyroZ,Latitude,Longitude,Altitude"
    );
    assert_eq!(lines[2], "5,9.80,0.1,0.3,0.02,0.02,0.03,,,");
    assert_eq!(summary.data_rows, 3);
    assert_eq!(summary.partial_rows, 1);
    Ok(())
}
