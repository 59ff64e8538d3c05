//! Chunked AES-256-GCM streams
//!
//! Stream format (binary), no header and no trailer:
//! ```text
//! frame 0: [12 bytes: nonce][chunk_size bytes: ciphertext][16 bytes: tag]
//! frame 1: [12 bytes: nonce][chunk_size bytes: ciphertext][16 bytes: tag]
//! ...
//! last:    [12 bytes: nonce][1..=chunk_size bytes: ciphertext][16 bytes: tag]
//! ```
//!
//! Every frame is sealed independently under a fresh random nonce. The chunk
//! size is not recorded; [`ChunkedReader`] must be opened with the chunk size
//! the [`ChunkedWriter`] used.

pub mod reader;
pub mod writer;

pub use reader::ChunkedReader;
pub use writer::ChunkedWriter;

use cryptio_core::{CryptoError, CryptoResult};

/// Lifecycle shared by writer and reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accepting writes / serving reads.
    Active,
    /// Writer finished, or reader reached a clean end of stream.
    Closed,
    /// A call failed; the stream refuses further work.
    Failed,
}

impl StreamState {
    fn ensure_active(self) -> CryptoResult<()> {
        match self {
            StreamState::Active => Ok(()),
            StreamState::Closed | StreamState::Failed => Err(CryptoError::StreamClosed),
        }
    }
}
