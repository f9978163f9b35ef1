//! Bounded input ingestion.
//!
//! The telemetry container sits near the start of a clip, so only the first
//! `byte_cap` bytes are kept. The stream is still consumed to end-of-data: a read
//! error anywhere in the input aborts the run, and completion is signalled by EOF
//! rather than by reaching the cap.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument};

/// Append-only byte buffer that stops growing once it holds `cap` bytes.
///
/// A chunk that straddles the cap is kept whole, so the final length may exceed the
/// cap by less than one chunk. Chunks arriving after that are counted and dropped.
#[derive(Debug)]
pub struct RawBuffer {
    bytes: BytesMut,
    cap: usize,
    discarded: u64,
}

impl RawBuffer {
    /// Create an empty buffer with the given byte cap.
    pub fn new(cap: usize) -> Self {
        Self {
            bytes: BytesMut::with_capacity(cap.min(1 << 20)),
            cap,
            discarded: 0,
        }
    }

    /// Append a chunk unless the cap has already been reached.
    ///
    /// Returns `true` if the chunk was kept.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> bool {
        if self.is_full() {
            self.discarded += chunk.len() as u64;
            return false;
        }
        self.bytes.extend_from_slice(chunk);
        true
    }

    /// Whether the cap has been reached.
    pub fn is_full(&self) -> bool {
        self.bytes.len() >= self.cap
    }

    /// Bytes currently held.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether no bytes have been kept.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bytes seen after the cap was reached.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Freeze into an immutable, cheaply clonable byte buffer.
    pub fn freeze(self) -> Bytes {
        self.bytes.freeze()
    }
}

/// Read `reader` to end-of-data in `chunk_size` reads, keeping at most about `cap` bytes.
///
/// I/O errors are returned as-is; nothing read so far is surfaced in that case.
#[instrument(skip(reader), level = "debug")]
pub async fn read_bounded<R>(
    mut reader: R,
    cap: usize,
    chunk_size: usize,
) -> std::io::Result<RawBuffer>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = RawBuffer::new(cap);
    let mut chunk = vec![0u8; chunk_size.max(1)];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let kept = buffer.push_chunk(&chunk[..n]);
        if kept && buffer.is_full() {
            debug!(kept = buffer.len(), cap, "byte cap reached, draining remaining input");
        }
    }

    debug!(
        kept = buffer.len(),
        discarded = buffer.discarded(),
        "input stream finished"
    );
    Ok(buffer)
}
