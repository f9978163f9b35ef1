//! Merged table output.
use std::path::PathBuf;
use tracing::info;

use super::merge::MergedTable;
use crate::error::{AppResult, TelemetryError};

/// Writes merged tables to a text file, replacing any existing content.
#[derive(Debug, Clone)]
pub struct TableWriter {
    path: PathBuf,
}

impl TableWriter {
    /// Writer targeting `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Serialise `table` and overwrite-create the destination. Returns bytes written.
    pub async fn write(&self, table: &MergedTable) -> AppResult<usize> {
        let text = table.to_text();
        tokio::fs::write(&self.path, text.as_bytes())
            .await
            .map_err(|source| TelemetryError::Output {
                path: self.path.clone(),
                source,
            })?;
        info!(path = %self.path.display(), bytes = text.len(), "merged table written");
        Ok(text.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::merge::{ChannelTable, RowIndexMerger};

    fn sample() -> MergedTable {
        let mut merger = RowIndexMerger::new();
        merger.push(ChannelTable::parse("A", "h1\na0\na1"));
        merger.push(ChannelTable::parse("B", "h2\nb0"));
        merger.finish()
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.csv");
        std::fs::write(&path, "stale content that is much longer than the new table\n").unwrap();

        let written = TableWriter::new(&path).write(&sample()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "h1,h2\na0,b0\na1");
        assert_eq!(written, content.len());
    }

    #[tokio::test]
    async fn unwritable_destination_is_an_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("merged.csv");

        let err = TableWriter::new(&path).write(&sample()).await.unwrap_err();
        assert!(matches!(err, TelemetryError::Output { .. }));
        assert_eq!(err.stage(), "write");
    }
}
