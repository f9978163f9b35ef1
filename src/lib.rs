//! # Telemerge Core Library
//!
//! Pulls the sensor telemetry out of a GoPro clip and merges the accelerometer,
//! gyroscope and GPS channels into one comma-separated table. Decoding the embedded
//! metadata track is left to external tools; this crate owns the bounded input read,
//! the sequencing of the two tool calls, and the channel merge.
//!
//! ## Crate Structure
//!
//! - **`config`**: `TelemergeConfig`, loaded from defaults, an optional TOML file and
//!   `TELEMERGE_` environment variables.
//! - **`data`**: the bounded reader, the row-index merge, the timestamp join, and the
//!   output writer.
//! - **`error`**: the `TelemetryError` enum shared by every stage.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`pipeline`**: `Pipeline`, which runs read -> extract -> render -> merge -> write.
//! - **`telemetry`**: the `TelemetryExtractor` and `ChannelRenderer` seams, with
//!   subprocess-backed and mock implementations.

pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod telemetry;

pub use config::{MergeStrategy, TelemergeConfig};
pub use data::merge::{merge_by_row_index, ChannelTable, MergedTable, RowIndexMerger};
pub use error::{AppResult, TelemetryError};
pub use pipeline::{Pipeline, RunSummary};
pub use telemetry::{ChannelRenderer, DecodedTelemetry, RenderMode, RenderedChannels, TelemetryExtractor};
