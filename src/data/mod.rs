//! Data ingestion, merging, and storage modules.
pub mod merge;
pub mod reader;
pub mod storage;
pub mod timestamp;
