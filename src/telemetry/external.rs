//! Subprocess-backed collaborators.
//!
//! - `FfmpegExtractor` copies the GoPro metadata track out of the clip with
//!   `ffmpeg -codec copy -map 0:2 -f rawvideo`, streaming the clip in on stdin
//! - `Gpmd2CsvRenderer` hands the raw track to `gpmd2csv`, which writes one
//!   `<out>-<sensor>.csv` file per sensor
//!
//! Neither tool is retried. A missing executable is reported as `ToolNotFound`.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{ChannelRenderer, DecodedTelemetry, RenderMode, RenderedChannels, TelemetryExtractor};
use crate::config::{ExtractorConfig, RendererConfig};
use crate::error::{AppResult, TelemetryError};

/// Stem of the files gpmd2csv writes into the scratch directory.
const RENDER_STEM: &str = "telemetry";

fn spawn_error(program: &str, err: io::Error, wrap: fn(String) -> TelemetryError) -> TelemetryError {
    if err.kind() == io::ErrorKind::NotFound {
        TelemetryError::ToolNotFound(program.to_string())
    } else {
        wrap(format!("failed to start '{program}': {err}"))
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        "no diagnostic output".to_string()
    } else {
        text.lines().last().unwrap_or(text).to_string()
    }
}

/// Outcome of streaming the clip into ffmpeg. An early close on ffmpeg's side is not an error.
fn check_stdin_write(result: io::Result<()>) -> AppResult<()> {
    match result {
        Ok(()) => Ok(()),
        // ffmpeg may stop reading once it has what it needs
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("ffmpeg closed stdin early");
            Ok(())
        }
        Err(e) => Err(TelemetryError::Extraction(format!(
            "failed to stream input into ffmpeg: {e}"
        ))),
    }
}

fn render_io(context: &'static str) -> impl Fn(io::Error) -> TelemetryError {
    move |e| TelemetryError::Rendering(format!("{context}: {e}"))
}

// =============================================================================
// FfmpegExtractor
// =============================================================================

/// Extracts the raw GPMF track with ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    program: String,
    stream_map: String,
}

impl FfmpegExtractor {
    /// Extractor using `program` and the `-map` selector `stream_map`.
    pub fn new(program: impl Into<String>, stream_map: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            stream_map: stream_map.into(),
        }
    }

    /// Extractor from configuration.
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self::new(config.ffmpeg.clone(), config.stream_map.clone())
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-i", "pipe:0"])
            .args(["-codec", "copy"])
            .args(["-map", self.stream_map.as_str()])
            .args(["-f", "rawvideo", "pipe:1"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl TelemetryExtractor for FfmpegExtractor {
    #[instrument(skip(self, raw), fields(program = %self.program, input = raw.len()))]
    async fn extract(&self, raw: Bytes) -> AppResult<DecodedTelemetry> {
        if raw.is_empty() {
            return Err(TelemetryError::Extraction(
                "input buffer is empty, no telemetry to locate".to_string(),
            ));
        }

        let mut child = self
            .command()
            .spawn()
            .map_err(|e| spawn_error(&self.program, e, TelemetryError::Extraction))?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            TelemetryError::Extraction("ffmpeg stdin was not captured".to_string())
        })?;

        // Feed stdin while stdout drains, otherwise a full pipe deadlocks both sides.
        let feeder = tokio::spawn(async move {
            let result = stdin.write_all(&raw).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| TelemetryError::Extraction(format!("ffmpeg did not finish: {e}")))?;

        let fed = feeder.await.map_err(|e| {
            TelemetryError::Extraction(format!("stdin feeder task failed: {e}"))
        })?;

        if !output.status.success() {
            return Err(TelemetryError::Extraction(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_excerpt(&output.stderr)
            )));
        }
        check_stdin_write(fed)?;
        if output.stdout.is_empty() {
            return Err(TelemetryError::Extraction(format!(
                "no telemetry stream at map '{}'",
                self.stream_map
            )));
        }

        debug!(payload = output.stdout.len(), "telemetry track extracted");
        Ok(DecodedTelemetry::new(output.stdout))
    }
}

// =============================================================================
// Gpmd2CsvRenderer
// =============================================================================

/// Renders per-sensor CSV tables with gpmd2csv.
#[derive(Debug, Clone)]
pub struct Gpmd2CsvRenderer {
    program: String,
    channel_files: BTreeMap<String, String>,
}

impl Gpmd2CsvRenderer {
    /// Renderer using `program`; `channel_files` maps file suffix to channel name.
    pub fn new(program: impl Into<String>, channel_files: BTreeMap<String, String>) -> Self {
        Self {
            program: program.into(),
            channel_files,
        }
    }

    /// Renderer from configuration.
    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(config.gpmd2csv.clone(), config.channel_files.clone())
    }

    /// Channel name for a gpmd2csv file suffix such as `accl`.
    pub fn channel_name(&self, suffix: &str) -> String {
        self.channel_files
            .get(suffix)
            .cloned()
            .unwrap_or_else(|| format!("Camera-{}", suffix.to_uppercase()))
    }

    async fn collect_tables(&self, dir: &Path) -> AppResult<RenderedChannels> {
        let mut rendered = RenderedChannels::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(render_io("scratch directory unreadable"))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(render_io("scratch directory unreadable"))?
        {
            let file_name = entry.file_name();
            let Some(suffix) = file_name.to_str().and_then(table_suffix) else {
                continue;
            };
            let text = tokio::fs::read_to_string(entry.path()).await.map_err(|e| {
                TelemetryError::Rendering(format!("unreadable table '{suffix}': {e}"))
            })?;
            let channel = self.channel_name(suffix);
            debug!(%channel, bytes = text.len(), "channel table rendered");
            rendered.insert(channel, normalize_table(&text));
        }
        Ok(rendered)
    }
}

/// `telemetry-accl.csv` -> `accl`
fn table_suffix(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix(RENDER_STEM)?
        .strip_prefix('-')?
        .strip_suffix(".csv")
        .filter(|suffix| !suffix.is_empty())
}

/// CRLF to LF, and drop one trailing line terminator so the last row is not empty.
fn normalize_table(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    match text.strip_suffix('\n') {
        Some(trimmed) => trimmed.to_string(),
        None => text,
    }
}

#[async_trait]
impl ChannelRenderer for Gpmd2CsvRenderer {
    #[instrument(skip(self, telemetry), fields(program = %self.program, payload = telemetry.len()))]
    async fn render(
        &self,
        telemetry: &DecodedTelemetry,
        mode: RenderMode,
    ) -> AppResult<RenderedChannels> {
        match mode {
            RenderMode::Csv => {}
        }

        let scratch = tempfile::tempdir()
            .map_err(|e| TelemetryError::Rendering(format!("no scratch directory: {e}")))?;
        let input = scratch.path().join(format!("{RENDER_STEM}.bin"));
        let output = scratch.path().join(format!("{RENDER_STEM}.csv"));
        tokio::fs::write(&input, telemetry.payload())
            .await
            .map_err(render_io("failed to stage telemetry for gpmd2csv"))?;

        let result = Command::new(&self.program)
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error(&self.program, e, TelemetryError::Rendering))?;

        if !result.status.success() {
            return Err(TelemetryError::Rendering(format!(
                "gpmd2csv exited with {}: {}",
                result.status,
                stderr_excerpt(&result.stderr)
            )));
        }

        let rendered = self.collect_tables(scratch.path()).await?;
        if rendered.is_empty() {
            return Err(TelemetryError::Rendering(
                "gpmd2csv produced no channel tables".to_string(),
            ));
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_suffix_matches_sensor_files_only() {
        assert_eq!(table_suffix("telemetry-accl.csv"), Some("accl"));
        assert_eq!(table_suffix("telemetry-gps.csv"), Some("gps"));
        assert_eq!(table_suffix("telemetry.csv"), None);
        assert_eq!(table_suffix("telemetry-.csv"), None);
        assert_eq!(table_suffix("telemetry.bin"), None);
        assert_eq!(table_suffix("other-accl.csv"), None);
    }

    #[test]
    fn normalize_table_strips_one_terminator() {
        assert_eq!(normalize_table("h\r\n1\r\n2\r\n"), "h\n1\n2");
        assert_eq!(normalize_table("h\n1\n\n"), "h\n1\n");
        assert_eq!(normalize_table("h\n1"), "h\n1");
    }

    #[test]
    fn unmapped_suffixes_get_camera_prefix() {
        let renderer = Gpmd2CsvRenderer::from_config(&RendererConfig::default());
        assert_eq!(renderer.channel_name("gps"), "Camera-GPS5");
        assert_eq!(renderer.channel_name("temp"), "Camera-TEMP");
    }

    #[test]
    fn stdin_write_errors_other_than_early_close_fail_extraction() {
        assert!(check_stdin_write(Ok(())).is_ok());
        assert!(check_stdin_write(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))).is_ok());

        let err = check_stdin_write(Err(io::Error::new(io::ErrorKind::Other, "short write")))
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Extraction(ref msg) if msg.contains("short write")));
        assert_eq!(err.stage(), "extract");
    }

    #[tokio::test]
    async fn ffmpeg_refuses_empty_buffer_without_spawning() {
        let extractor = FfmpegExtractor::new("telemerge-no-such-ffmpeg", "0:2");
        let err = extractor.extract(Bytes::new()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Extraction(_)));
    }

    #[tokio::test]
    async fn missing_executables_are_reported() {
        let extractor = FfmpegExtractor::new("telemerge-no-such-ffmpeg", "0:2");
        let err = extractor
            .extract(Bytes::from_static(b"ftyp"))
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::ToolNotFound(p) if p == "telemerge-no-such-ffmpeg"));

        let renderer = Gpmd2CsvRenderer::new("telemerge-no-such-gpmd2csv", BTreeMap::new());
        let err = renderer
            .render(&DecodedTelemetry::new(vec![1u8]), RenderMode::Csv)
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::ToolNotFound(_)));
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use serial_test::serial;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, name: &str, body: &str) -> String {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        #[tokio::test]
        #[serial]
        async fn ffmpeg_stdout_becomes_payload() {
            let dir = tempfile::tempdir().unwrap();
            let fake = script(dir.path(), "ffmpeg", "cat");
            let extractor = FfmpegExtractor::new(fake, "0:3");

            let decoded = extractor
                .extract(Bytes::from_static(b"DEVC\x00\x01"))
                .await
                .unwrap();
            assert_eq!(decoded.payload().as_ref(), b"DEVC\x00\x01");
        }

        #[tokio::test]
        #[serial]
        async fn ffmpeg_failure_carries_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let fake = script(
                dir.path(),
                "ffmpeg",
                "cat >/dev/null; echo 'Stream map 0:2 matches no streams.' >&2; exit 1",
            );
            let extractor = FfmpegExtractor::new(fake, "0:2");

            let err = extractor
                .extract(Bytes::from_static(b"ftyp"))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("matches no streams"));
        }

        #[tokio::test]
        #[serial]
        async fn gpmd2csv_tables_are_collected_by_suffix() {
            let dir = tempfile::tempdir().unwrap();
            let body = r#"out="${4%.csv}"
printf 'Milliseconds,AcclX\r\n0,9.8\r\n' > "$out-accl.csv"
printf 'Milliseconds,GyroX\n0,0.1\n' > "$out-gyro.csv"
printf 'summary\n' > "$4""#;
            let fake = script(dir.path(), "gpmd2csv", body);
            let renderer = Gpmd2CsvRenderer::from_config(&RendererConfig {
                gpmd2csv: fake,
                ..RendererConfig::default()
            });

            let rendered = renderer
                .render(&DecodedTelemetry::new(vec![0u8; 8]), RenderMode::Csv)
                .await
                .unwrap();
            assert_eq!(rendered.len(), 2);
            assert_eq!(rendered.get("Camera-ACCL"), Some("Milliseconds,AcclX\n0,9.8"));
            assert_eq!(rendered.get("Camera-GYRO"), Some("Milliseconds,GyroX\n0,0.1"));
        }

        #[tokio::test]
        #[serial]
        async fn unreadable_scratch_directory_is_a_rendering_error() {
            let dir = tempfile::tempdir().unwrap();
            let fake = script(dir.path(), "gpmd2csv", r#"rm -rf "$(dirname "$4")""#);
            let renderer = Gpmd2CsvRenderer::new(fake, BTreeMap::new());

            let err = renderer
                .render(&DecodedTelemetry::new(vec![0u8]), RenderMode::Csv)
                .await
                .unwrap_err();
            assert!(matches!(err, TelemetryError::Rendering(ref msg) if msg.contains("scratch")));
            assert_eq!(err.stage(), "render");
        }

        #[tokio::test]
        #[serial]
        async fn gpmd2csv_without_tables_is_a_rendering_error() {
            let dir = tempfile::tempdir().unwrap();
            let fake = script(dir.path(), "gpmd2csv", "exit 0");
            let renderer = Gpmd2CsvRenderer::new(fake, BTreeMap::new());

            let err = renderer
                .render(&DecodedTelemetry::new(vec![0u8]), RenderMode::Csv)
                .await
                .unwrap_err();
            assert!(matches!(err, TelemetryError::Rendering(_)));
        }
    }
}
