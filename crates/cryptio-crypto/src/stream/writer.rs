//! Chunked stream encryption
//!
//! [`ChunkedWriter`] accumulates plaintext in the middle of its frame buffer.
//! When `chunk_size` bytes are buffered it draws a nonce, seals the chunk in
//! place and writes the whole frame to the sink before accepting more input.
//! [`ChunkedWriter::finish`] seals the trailing partial chunk; a stream that
//! is never finished loses it.

use std::io::{self, Write};
use std::sync::Arc;

use cryptio_core::{CryptoError, CryptoResult, StreamConfig};
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::aead::Cipher;
use crate::keys::Key;
use crate::nonce::{NonceSource, OsNonceSource};
use crate::stream::StreamState;
use crate::{NONCE_SIZE, TAG_SIZE};

pub struct ChunkedWriter<W> {
    sink: W,
    cipher: Cipher,
    nonces: Arc<dyn NonceSource>,
    chunk_size: usize,
    /// `[nonce][plaintext, then ciphertext][tag]`
    frame: Zeroizing<Vec<u8>>,
    /// Plaintext bytes currently held in `frame[NONCE_SIZE..]`.
    buffered: usize,
    frames_written: u64,
    state: StreamState,
}

impl<W: Write> ChunkedWriter<W> {
    /// Open a writer over `sink`. `chunk_size` defaults to 1024 bytes.
    pub fn new(sink: W, key: &Key, chunk_size: Option<usize>) -> CryptoResult<Self> {
        let cipher = Cipher::new(key)?;
        let config = StreamConfig::with_chunk_size(chunk_size)?;
        Self::with_cipher(sink, cipher, config.chunk_size)
    }

    /// Open a writer using the chunk size and seal limit from `config`.
    pub fn from_config(sink: W, key: &Key, config: &StreamConfig) -> CryptoResult<Self> {
        let cipher = Cipher::new(key)?.with_seal_limit(config.seal_limit);
        config.validate()?;
        Self::with_cipher(sink, cipher, config.chunk_size)
    }

    /// Open a writer sharing an existing cipher (and its seal budget).
    pub fn with_cipher(sink: W, cipher: Cipher, chunk_size: usize) -> CryptoResult<Self> {
        let config = StreamConfig {
            chunk_size,
            ..StreamConfig::default()
        };
        config.validate()?;

        debug!(chunk_size, "chunked writer opened");

        Ok(Self {
            sink,
            cipher,
            nonces: Arc::new(OsNonceSource),
            chunk_size,
            frame: Zeroizing::new(vec![0u8; config.frame_size()]),
            buffered: 0,
            frames_written: 0,
            state: StreamState::Active,
        })
    }

    /// Replace the OS nonce source.
    pub fn with_nonce_source(mut self, nonces: Arc<dyn NonceSource>) -> Self {
        self.nonces = nonces;
        self
    }

    /// Buffer `bytes`, emitting a frame every time a chunk fills up.
    ///
    /// Either all of `bytes` is accepted (the return value is always
    /// `bytes.len()`) or the call fails and the stream is closed.
    pub fn write_chunked(&mut self, bytes: &[u8]) -> CryptoResult<usize> {
        self.state.ensure_active()?;

        let mut input = bytes;
        while !input.is_empty() {
            let start = NONCE_SIZE + self.buffered;
            let take = (self.chunk_size - self.buffered).min(input.len());
            self.frame[start..start + take].copy_from_slice(&input[..take]);
            self.buffered += take;
            input = &input[take..];

            if self.buffered == self.chunk_size {
                self.emit_frame()?;
            }
        }

        Ok(bytes.len())
    }

    /// Seal any buffered remainder as the final frame and flush the sink.
    ///
    /// Must be called once all plaintext has been written. Afterwards the
    /// writer rejects further calls with `StreamClosed`.
    pub fn finish(&mut self) -> CryptoResult<()> {
        self.state.ensure_active()?;

        if self.buffered > 0 {
            self.emit_frame()?;
        }

        if let Err(source) = self.sink.flush() {
            self.state = StreamState::Failed;
            return Err(CryptoError::SinkWrite {
                frame: self.frames_written.saturating_sub(1),
                source,
            });
        }

        self.state = StreamState::Closed;
        debug!(
            frames = self.frames_written,
            chunk_size = self.chunk_size,
            "chunked writer finished"
        );
        Ok(())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Plaintext bytes waiting for the current chunk to fill.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Give back the sink. Buffered plaintext that was not finished is dropped.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn emit_frame(&mut self) -> CryptoResult<()> {
        let result = self.seal_and_write();
        if result.is_err() {
            self.state = StreamState::Failed;
        }
        result
    }

    fn seal_and_write(&mut self) -> CryptoResult<()> {
        let n = self.buffered;
        let index = self.frames_written;

        let mut nonce = [0u8; NONCE_SIZE];
        self.nonces.fill(&mut nonce)?;
        self.frame[..NONCE_SIZE].copy_from_slice(&nonce);

        let (body, tail) = self.frame[NONCE_SIZE..].split_at_mut(n);
        let tag = self.cipher.seal_in_place(&nonce, body)?;
        tail[..TAG_SIZE].copy_from_slice(&tag);

        let frame_len = NONCE_SIZE + n + TAG_SIZE;
        self.sink
            .write_all(&self.frame[..frame_len])
            .map_err(|source| CryptoError::SinkWrite {
                frame: index,
                source,
            })?;

        trace!(frame = index, len = n, "frame sealed");
        self.frames_written += 1;
        self.buffered = 0;
        Ok(())
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_chunked(buf)?)
    }

    /// Flushes the sink only. A partial chunk stays buffered: emitting it
    /// here would put a short frame in the middle of the stream.
    fn flush(&mut self) -> io::Result<()> {
        if self.state == StreamState::Failed {
            return Err(CryptoError::StreamClosed.into());
        }
        self.sink.flush()
    }
}
