//! Merge pipeline orchestration.
//!
//! One run is a strict sequence, each stage starting only once the previous one has
//! completed:
//!
//! ```text
//! bounded read -> extract -> render -> merge -> write
//! ```
//!
//! Every stage failure is terminal and nothing is retried. Failures before the write
//! stage leave the output path untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{debug, error, info, instrument};

use crate::config::{MergeStrategy, TelemergeConfig};
use crate::data::merge::{merge_by_row_index, MergedTable};
use crate::data::reader::read_bounded;
use crate::data::storage::TableWriter;
use crate::data::timestamp::join_on_timestamp;
use crate::error::{AppResult, TelemetryError};
use crate::telemetry::{
    ChannelRenderer, FfmpegExtractor, Gpmd2CsvRenderer, RenderMode, RenderedChannels,
    TelemetryExtractor,
};

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Bytes kept by the bounded reader
    pub bytes_read: usize,
    /// Bytes seen after the cap was reached
    pub bytes_discarded: u64,
    /// Channels merged
    pub channels: usize,
    /// Data rows in the output
    pub data_rows: usize,
    /// Data rows lacking at least one channel
    pub partial_rows: usize,
    /// Size of the output file
    pub bytes_written: usize,
}

/// Telemetry merge pipeline.
pub struct Pipeline {
    config: TelemergeConfig,
    extractor: Arc<dyn TelemetryExtractor>,
    renderer: Arc<dyn ChannelRenderer>,
}

impl Pipeline {
    /// Pipeline with explicit collaborators.
    pub fn new(
        config: TelemergeConfig,
        extractor: Arc<dyn TelemetryExtractor>,
        renderer: Arc<dyn ChannelRenderer>,
    ) -> Self {
        Self {
            config,
            extractor,
            renderer,
        }
    }

    /// Pipeline backed by the ffmpeg and gpmd2csv executables named in `config`.
    pub fn with_external_tools(config: TelemergeConfig) -> Self {
        let extractor = Arc::new(FfmpegExtractor::from_config(&config.extractor));
        let renderer = Arc::new(Gpmd2CsvRenderer::from_config(&config.renderer));
        Self::new(config, extractor, renderer)
    }

    /// Run the pipeline on the file at `input`, writing the merged table to `output`.
    #[instrument(skip(self, input, output), fields(input = %input.display(), output = %output.display()))]
    pub async fn run(&self, input: &Path, output: &Path) -> AppResult<RunSummary> {
        let result = match tokio::fs::File::open(input).await {
            Ok(file) => self.execute(file, input, output).await,
            Err(source) => Err(TelemetryError::Input {
                path: input.to_path_buf(),
                source,
            }),
        };
        report(result)
    }

    /// Run the pipeline on an arbitrary byte stream.
    pub async fn run_reader<R>(&self, reader: R, output: &Path) -> AppResult<RunSummary>
    where
        R: AsyncRead + Unpin + Send,
    {
        report(self.execute(reader, Path::new("<stream>"), output).await)
    }

    async fn execute<R>(&self, reader: R, input: &Path, output: &Path) -> AppResult<RunSummary>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.config.validate()?;
        let reader_config = &self.config.reader;
        let raw = read_bounded(reader, reader_config.byte_cap, reader_config.chunk_size)
            .await
            .map_err(|source| TelemetryError::Input {
                path: input.to_path_buf(),
                source,
            })?;
        let bytes_read = raw.len();
        let bytes_discarded = raw.discarded();
        info!(bytes_read, bytes_discarded, "finished reading");

        let decoded = self.extractor.extract(raw.freeze()).await?;
        info!(payload = decoded.len(), "telemetry extracted");

        let rendered = self.renderer.render(&decoded, RenderMode::Csv).await?;
        info!(channels = rendered.len(), "channels rendered");
        debug!(
            available = ?rendered.channel_names().collect::<Vec<_>>(),
            "rendered channel names"
        );

        let merged = self.merge(&rendered)?;
        let bytes_written = TableWriter::new(PathBuf::from(output)).write(&merged).await?;

        let summary = RunSummary {
            bytes_read,
            bytes_discarded,
            channels: merged.channel_count(),
            data_rows: merged.rows().len(),
            partial_rows: merged.partial_rows(),
            bytes_written,
        };
        info!(
            rows = summary.data_rows,
            partial_rows = summary.partial_rows,
            "telemetry saved as CSV"
        );
        Ok(summary)
    }

    fn merge(&self, rendered: &RenderedChannels) -> AppResult<MergedTable> {
        let merge = &self.config.merge;
        match merge.strategy {
            MergeStrategy::RowIndex => merge_by_row_index(&merge.channels, rendered),
            MergeStrategy::Timestamp => {
                join_on_timestamp(&merge.channels, rendered, &merge.timestamp_column)
            }
        }
    }
}

fn report(result: AppResult<RunSummary>) -> AppResult<RunSummary> {
    if let Err(e) = &result {
        error!(stage = e.stage(), error = %e, "pipeline aborted");
    }
    result
}
