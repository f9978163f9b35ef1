//! Merge by row index.
//!
//! Channels are combined in a caller-fixed order. Each channel's header row is kept as
//! one opaque segment of the output header, and data row `i` of every channel is
//! appended, comma-separated, to output row `i`. There is no timestamp alignment and no
//! field-level parsing.
//!
//! Channels with differing row counts are not padded: a longer later channel opens
//! new output rows holding only its own segment, and a shorter later channel leaves the
//! trailing rows of earlier channels untouched. Such rows are *partial*.
//!
//! ```
//! use telemerge::data::merge::{ChannelTable, RowIndexMerger};
//!
//! let mut merger = RowIndexMerger::new();
//! merger.push(ChannelTable::parse("A", "h1\na0\na1"));
//! merger.push(ChannelTable::parse("B", "h2\nb0"));
//! let merged = merger.finish();
//!
//! assert_eq!(merged.header_line(), "h1,h2");
//! assert_eq!(merged.to_text(), "h1,h2\na0,b0\na1");
//! ```

use tracing::{debug, warn};

use crate::error::{AppResult, TelemetryError};
use crate::telemetry::RenderedChannels;

/// Separator between segments of a merged row.
pub const SEGMENT_SEPARATOR: char = ',';

/// One channel's table: a header row and data rows, all kept as raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTable {
    /// Channel name
    pub name: String,
    /// Row 0, unsplit
    pub header: String,
    /// Rows 1..N, unsplit
    pub rows: Vec<String>,
}

impl ChannelTable {
    /// Split `text` on `\n`; the first line is the header.
    pub fn parse(name: impl Into<String>, text: &str) -> Self {
        let mut lines = text.split('\n');
        let header = lines.next().unwrap_or_default().to_string();
        let rows = lines.map(str::to_string).collect();
        Self {
            name: name.into(),
            header,
            rows,
        }
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A row of the merged table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    /// Row text
    pub text: String,
    /// Number of channels that contributed to this row
    pub segments: usize,
}

/// Result of a merge: a header line and data rows ready to serialise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedTable {
    headers: Vec<String>,
    rows: Vec<MergedRow>,
    channels: usize,
}

impl MergedTable {
    /// Assemble a table from already-built parts.
    pub fn from_parts(headers: Vec<String>, rows: Vec<MergedRow>, channels: usize) -> Self {
        Self {
            headers,
            rows,
            channels,
        }
    }

    /// Data rows in order.
    pub fn rows(&self) -> &[MergedRow] {
        &self.rows
    }

    /// Number of channels merged.
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Rows missing at least one channel's contribution.
    pub fn partial_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.segments < self.channels)
            .count()
    }

    /// Header segments joined by commas.
    pub fn header_line(&self) -> String {
        self.headers.join(",")
    }

    /// Full output text: header line, `\n`, rows joined by `\n`. No trailing newline.
    pub fn to_text(&self) -> String {
        let body_len: usize = self.rows.iter().map(|row| row.text.len() + 1).sum();
        let mut text = String::with_capacity(body_len + 64);
        text.push_str(&self.header_line());
        text.push('\n');
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                text.push('\n');
            }
            text.push_str(&row.text);
        }
        text
    }
}

/// Accumulates channel tables into a [`MergedTable`].
///
/// All merge state lives here; nothing is shared between merges.
#[derive(Debug, Default)]
pub struct RowIndexMerger {
    headers: Vec<String>,
    rows: Vec<MergedRow>,
    channels: usize,
}

impl RowIndexMerger {
    /// Empty merger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `table`'s header and rows after the channels pushed so far.
    pub fn push(&mut self, table: ChannelTable) {
        if self.channels > 0 && table.row_count() != self.rows.len() {
            warn!(
                channel = %table.name,
                rows = table.row_count(),
                merged_rows = self.rows.len(),
                "channel row count differs from earlier channels, merged rows will be ragged"
            );
        }

        let ChannelTable { name, header, rows } = table;
        debug!(channel = %name, rows = rows.len(), "merging channel");
        self.headers.push(header);

        for (i, row) in rows.into_iter().enumerate() {
            match self.rows.get_mut(i) {
                Some(merged) => {
                    merged.text.push(SEGMENT_SEPARATOR);
                    merged.text.push_str(&row);
                    merged.segments += 1;
                }
                None => self.rows.push(MergedRow {
                    text: row,
                    segments: 1,
                }),
            }
        }
        self.channels += 1;
    }

    /// Finish the merge.
    pub fn finish(self) -> MergedTable {
        MergedTable::from_parts(self.headers, self.rows, self.channels)
    }
}

/// Merge the named channels of `rendered` by row index, in `order`.
///
/// Every channel in `order` must be present in `rendered`.
pub fn merge_by_row_index(order: &[String], rendered: &RenderedChannels) -> AppResult<MergedTable> {
    let mut merger = RowIndexMerger::new();
    for name in order {
        let text = rendered
            .get(name)
            .ok_or_else(|| TelemetryError::MissingChannel(name.clone()))?;
        merger.push(ChannelTable::parse(name.as_str(), text));
    }
    Ok(merger.finish())
}
