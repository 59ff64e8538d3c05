//! Chunked stream decryption
//!
//! [`ChunkedReader`] pulls one frame at a time from its source, looping over
//! short reads until the frame is complete or the source is exhausted, and
//! opens it in place. A frame shorter than the configured maximum is only
//! accepted as the last one.

use std::io::{self, Read};
use std::ops::Range;

use cryptio_core::{CryptoError, CryptoResult, StreamConfig};
use tracing::{debug, trace};
use zeroize::Zeroizing;

use crate::aead::Cipher;
use crate::keys::Key;
use crate::stream::StreamState;
use crate::{NONCE_SIZE, TAG_SIZE};

pub struct ChunkedReader<R> {
    source: R,
    cipher: Cipher,
    chunk_size: usize,
    /// `[nonce][ciphertext, then plaintext][tag]`
    frame: Zeroizing<Vec<u8>>,
    /// Decrypted bytes of `frame` not yet handed out.
    pending: Range<usize>,
    frames_read: u64,
    state: StreamState,
}

impl<R: Read> ChunkedReader<R> {
    /// Open a reader over `source`. `chunk_size` must match the writer's and
    /// defaults to 1024 bytes.
    pub fn new(source: R, key: &Key, chunk_size: Option<usize>) -> CryptoResult<Self> {
        let cipher = Cipher::new(key)?;
        let config = StreamConfig::with_chunk_size(chunk_size)?;
        Self::with_cipher(source, cipher, config.chunk_size)
    }

    pub fn from_config(source: R, key: &Key, config: &StreamConfig) -> CryptoResult<Self> {
        let cipher = Cipher::new(key)?;
        config.validate()?;
        Self::with_cipher(source, cipher, config.chunk_size)
    }

    pub fn with_cipher(source: R, cipher: Cipher, chunk_size: usize) -> CryptoResult<Self> {
        let config = StreamConfig {
            chunk_size,
            ..StreamConfig::default()
        };
        config.validate()?;

        debug!(chunk_size, "chunked reader opened");

        Ok(Self {
            source,
            cipher,
            chunk_size,
            frame: Zeroizing::new(vec![0u8; config.frame_size()]),
            pending: 0..0,
            frames_read: 0,
            state: StreamState::Active,
        })
    }

    /// Decrypt the next frame into `dst` and return its plaintext length.
    ///
    /// Returns `Ok(0)` once the source ends cleanly on a frame boundary.
    /// `dst` must hold the whole chunk; a smaller buffer fails with
    /// `DestinationTooSmall` before anything is written to it. Every error
    /// closes the stream.
    pub fn read_chunk(&mut self, dst: &mut [u8]) -> CryptoResult<usize> {
        if !self.pending.is_empty() {
            let n = self.pending.len();
            if dst.len() < n {
                return Err(self.fail(CryptoError::DestinationTooSmall {
                    needed: n,
                    available: dst.len(),
                }));
            }
            dst[..n].copy_from_slice(&self.frame[self.pending.clone()]);
            self.pending = 0..0;
            return Ok(n);
        }

        match self.state {
            StreamState::Closed => return Ok(0),
            StreamState::Failed => return Err(CryptoError::StreamClosed),
            StreamState::Active => {}
        }

        match self.next_frame(Some(dst.len())) {
            Ok(Some(n)) => {
                dst[..n].copy_from_slice(&self.frame[NONCE_SIZE..NONCE_SIZE + n]);
                Ok(n)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    fn fail(&mut self, err: CryptoError) -> CryptoError {
        self.state = StreamState::Failed;
        self.pending = 0..0;
        err
    }

    /// Read and open one frame. On success the plaintext sits at
    /// `frame[NONCE_SIZE..NONCE_SIZE + n]`.
    ///
    /// A tail too short to hold any ciphertext is `TruncatedFrame`. A short
    /// final frame that fails to open is `TruncatedFrame` only if restoring a
    /// single lost trailing byte makes it verify; every other failure,
    /// including a final frame cut by more than one byte, is
    /// `AuthenticationFailure`.
    fn next_frame(&mut self, capacity: Option<usize>) -> CryptoResult<Option<usize>> {
        let index = self.frames_read;
        let filled = self.fill_frame()?;

        if filled == 0 {
            self.state = StreamState::Closed;
            debug!(frames = index, "chunked reader reached end of stream");
            return Ok(None);
        }

        // A frame carries at least one byte of ciphertext.
        if filled <= NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::TruncatedFrame {
                frame: index,
                len: filled,
            });
        }

        let n = filled - NONCE_SIZE - TAG_SIZE;
        if let Some(available) = capacity {
            if available < n {
                return Err(CryptoError::DestinationTooSmall {
                    needed: n,
                    available,
                });
            }
        }

        let is_final = filled < self.frame.len();

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&self.frame[..NONCE_SIZE]);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&self.frame[NONCE_SIZE + n..filled]);

        let body = &mut self.frame[NONCE_SIZE..NONCE_SIZE + n];
        if self.cipher.open_in_place(&nonce, body, &tag).is_err() {
            return Err(if is_final && self.lost_final_byte(&nonce, filled) {
                CryptoError::TruncatedFrame {
                    frame: index,
                    len: filled,
                }
            } else {
                CryptoError::AuthenticationFailure { frame: Some(index) }
            });
        }

        trace!(frame = index, len = n, "frame opened");
        self.frames_read += 1;

        if is_final {
            self.state = StreamState::Closed;
            debug!(frames = self.frames_read, "chunked reader consumed final frame");
        }
        Ok(Some(n))
    }

    /// Try every value for one missing byte at the end of `frame[..filled]`.
    ///
    /// The frame buffer is left untouched by a failed open, so each attempt
    /// sees the bytes as read. The recovered plaintext is never handed out.
    fn lost_final_byte(&mut self, nonce: &[u8; NONCE_SIZE], filled: usize) -> bool {
        let split = filled - (TAG_SIZE - 1);
        let mut tag = [0u8; TAG_SIZE];
        tag[..TAG_SIZE - 1].copy_from_slice(&self.frame[split..filled]);

        let cipher = &self.cipher;
        let body = &mut self.frame[NONCE_SIZE..split];
        (0..=u8::MAX).any(|last| {
            tag[TAG_SIZE - 1] = last;
            cipher.open_in_place(nonce, body, &tag).is_ok()
        })
    }

    /// Accumulate up to one full frame, tolerating short reads.
    fn fill_frame(&mut self) -> CryptoResult<usize> {
        let mut filled = 0;
        while filled < self.frame.len() {
            match self.source.read(&mut self.frame[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(CryptoError::SourceRead {
                        frame: self.frames_read,
                        source,
                    })
                }
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Read for ChunkedReader<R> {
    /// Serves decrypted chunks across as many calls as `buf` requires.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            match self.state {
                StreamState::Closed => return Ok(0),
                StreamState::Failed => return Err(CryptoError::StreamClosed.into()),
                StreamState::Active => {}
            }
            match self.next_frame(None) {
                Ok(Some(n)) => self.pending = NONCE_SIZE..NONCE_SIZE + n,
                Ok(None) => return Ok(0),
                Err(e) => return Err(self.fail(e).into()),
            }
        }

        let n = buf.len().min(self.pending.len());
        let start = self.pending.start;
        buf[..n].copy_from_slice(&self.frame[start..start + n]);
        self.pending.start += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::testing::{FailingReader, TrickleReader};
    use crate::stream::ChunkedWriter;
    use cryptio_core::ErrorKind;

    fn test_key() -> Key {
        Key::from_bytes([0xC3u8; 32])
    }

    fn seal_stream(data: &[u8], chunk_size: usize) -> Vec<u8> {
        let mut writer = ChunkedWriter::new(Vec::new(), &test_key(), Some(chunk_size)).unwrap();
        writer.write_chunked(data).unwrap();
        writer.finish().unwrap();
        writer.into_inner()
    }

    fn read_all_chunks<R: Read>(reader: &mut ChunkedReader<R>) -> CryptoResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; reader.chunk_size()];
        loop {
            let n = reader.read_chunk(&mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    #[test]
    fn test_read_chunk_roundtrip() {
        let data: Vec<u8> = (0..100u8).collect();
        let stream = seal_stream(&data, 16);

        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(16)).unwrap();
        assert_eq!(read_all_chunks(&mut reader).unwrap(), data);
        assert_eq!(reader.frames_read(), 7);
        assert_eq!(reader.state(), StreamState::Closed);
    }

    #[test]
    fn test_each_call_returns_one_chunk() {
        let stream = seal_stream(&[5u8; 40], 16);
        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(16)).unwrap();
        let mut buf = [0u8; 64];

        assert_eq!(reader.read_chunk(&mut buf).unwrap(), 16);
        assert_eq!(reader.read_chunk(&mut buf).unwrap(), 16);
        assert_eq!(reader.read_chunk(&mut buf).unwrap(), 8);
        assert_eq!(reader.read_chunk(&mut buf).unwrap(), 0);
        assert_eq!(reader.read_chunk(&mut buf).unwrap(), 0, "EOF is sticky");
    }

    #[test]
    fn test_empty_stream_is_clean_eof() {
        let mut reader = ChunkedReader::new(&[][..], &test_key(), Some(16)).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(reader.read_chunk(&mut buf).unwrap(), 0);
        assert_eq!(reader.state(), StreamState::Closed);
    }

    #[test]
    fn test_trickling_source_with_interrupts() {
        let data: Vec<u8> = (0..=255u8).cycle().take(777).collect();
        let stream = seal_stream(&data, 64);

        for step in [1usize, 3, 13, 91] {
            let source = TrickleReader::new(&stream, step).interrupting();
            let mut reader = ChunkedReader::new(source, &test_key(), Some(64)).unwrap();
            assert_eq!(read_all_chunks(&mut reader).unwrap(), data, "step {step}");
        }
    }

    #[test]
    fn test_tail_shorter_than_overhead_is_truncated() {
        let mut stream = seal_stream(&[1u8; 32], 16);
        stream.extend_from_slice(&[0u8; 20]);

        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(16)).unwrap();
        let err = read_all_chunks(&mut reader).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::TruncatedFrame { frame: 2, len: 20 }
        ));
    }

    #[test]
    fn test_removing_last_byte_is_truncated() {
        for len in [1usize, 5, 16, 17, 20, 32, 100, 1000] {
            let data = vec![0xEEu8; len];
            let mut stream = seal_stream(&data, 16);
            stream.pop();

            let mut reader =
                ChunkedReader::new(stream.as_slice(), &test_key(), Some(16)).unwrap();
            let err = read_all_chunks(&mut reader).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TruncatedFrame, "len {len}: {err}");
        }
    }

    #[test]
    fn test_tampered_full_frame_fails_authentication() {
        let stream = seal_stream(&[0x11u8; 48], 16);

        // Every bit of the first two (full) frames.
        for bit in 0..2 * 44 * 8 {
            let mut tampered = stream.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);

            let mut reader =
                ChunkedReader::new(tampered.as_slice(), &test_key(), Some(16)).unwrap();
            let err = read_all_chunks(&mut reader).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AuthenticationFailure, "bit {bit}");
        }
    }

    #[test]
    fn test_single_short_frame_missing_last_byte_is_truncated() {
        let mut stream = seal_stream(&[7u8; 5], 16);
        stream.pop();

        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(16)).unwrap();
        let mut buf = [0u8; 16];
        let err = reader.read_chunk(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::TruncatedFrame { frame: 0, len: 32 }
        ));
        assert!(buf.iter().all(|&b| b == 0), "no plaintext on truncation");
        assert_eq!(reader.state(), StreamState::Failed);
    }

    #[test]
    fn test_final_frame_cut_by_several_bytes_fails() {
        let mut stream = seal_stream(&[7u8; 20], 16);
        stream.truncate(stream.len() - 3);

        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(16)).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(reader.read_chunk(&mut buf).unwrap(), 16);

        buf = [0u8; 16];
        let err = reader.read_chunk(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::AuthenticationFailure { frame: Some(1) }
        ));
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tampered_short_final_frame_fails_authentication() {
        let stream = seal_stream(&[7u8; 20], 16);
        let first_frame = NONCE_SIZE + 16 + TAG_SIZE;

        for bit in first_frame * 8..stream.len() * 8 {
            let mut tampered = stream.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);

            let mut reader =
                ChunkedReader::new(tampered.as_slice(), &test_key(), Some(16)).unwrap();
            let mut buf = [0u8; 16];
            assert_eq!(reader.read_chunk(&mut buf).unwrap(), 16);

            buf = [0u8; 16];
            let err = reader.read_chunk(&mut buf).unwrap_err();
            assert!(
                matches!(err, CryptoError::AuthenticationFailure { frame: Some(1) }),
                "bit {bit}: {err}"
            );
            assert!(buf.iter().all(|&b| b == 0), "bit {bit}: no plaintext on failure");
        }
    }

    #[test]
    fn test_tampered_single_short_frame_fails_authentication() {
        let stream = seal_stream(b"short secret", 1024);

        for bit in 0..stream.len() * 8 {
            let mut tampered = stream.clone();
            tampered[bit / 8] ^= 1 << (bit % 8);

            let mut reader = ChunkedReader::new(tampered.as_slice(), &test_key(), None).unwrap();
            let mut buf = [0u8; 1024];
            let err = reader.read_chunk(&mut buf).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AuthenticationFailure, "bit {bit}");
            assert!(buf.iter().all(|&b| b == 0), "no plaintext on failure");
        }
    }

    #[test]
    fn test_authentication_failure_is_terminal() {
        let mut stream = seal_stream(&[0x22u8; 48], 16);
        stream[20] ^= 0x80;

        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(16)).unwrap();
        let mut buf = [0u8; 16];
        let err = reader.read_chunk(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::AuthenticationFailure { frame: Some(0) }
        ));

        let err = reader.read_chunk(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamClosed);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let stream = seal_stream(b"for the right key only", 1024);
        let other = Key::from_bytes([0x3Cu8; 32]);

        let mut reader = ChunkedReader::new(stream.as_slice(), &other, None).unwrap();
        let mut buf = [0u8; 1024];
        let err = reader.read_chunk(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    }

    #[test]
    fn test_destination_too_small() {
        let stream = seal_stream(&[9u8; 16], 16);
        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(16)).unwrap();

        let mut small = [0u8; 15];
        let err = reader.read_chunk(&mut small).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::DestinationTooSmall {
                needed: 16,
                available: 15
            }
        ));
        assert!(small.iter().all(|&b| b == 0));
        assert_eq!(reader.state(), StreamState::Failed);
    }

    #[test]
    fn test_short_final_frame_fits_small_destination() {
        let stream = seal_stream(&[4u8; 20], 16);
        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(16)).unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(reader.read_chunk(&mut buf).unwrap(), 16);
        let mut small = [0u8; 4];
        assert_eq!(reader.read_chunk(&mut small).unwrap(), 4);
        assert_eq!(small, [4u8; 4]);
    }

    #[test]
    fn test_source_error_carries_frame_index() {
        let stream = seal_stream(&[0u8; 32], 16);
        let source = FailingReader {
            data: &stream[..44 + 10],
        };
        let mut reader = ChunkedReader::new(source, &test_key(), Some(16)).unwrap();
        let mut buf = [0u8; 16];

        assert_eq!(reader.read_chunk(&mut buf).unwrap(), 16);
        match reader.read_chunk(&mut buf).unwrap_err() {
            CryptoError::SourceRead { frame, source } => {
                assert_eq!(frame, 1);
                assert_eq!(source.kind(), io::ErrorKind::ConnectionReset);
            }
            other => panic!("expected SourceRead, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_chunk_size_fails() {
        let stream = seal_stream(&[0x77u8; 256], 64);

        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(32)).unwrap();
        let err = read_all_chunks(&mut reader).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);

        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(128)).unwrap();
        let err = read_all_chunks(&mut reader).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    }

    #[test]
    fn test_io_read_small_buffers() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let stream = seal_stream(&data, 64);
        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(64)).unwrap();

        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
    }

    #[test]
    fn test_io_read_to_end() {
        let data = vec![0xABu8; 5000];
        let stream = seal_stream(&data, 1024);
        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), None).unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_io_read_surfaces_crypto_error() {
        let mut stream = seal_stream(&[1u8; 64], 64);
        stream[30] ^= 0x01;
        let mut reader = ChunkedReader::new(stream.as_slice(), &test_key(), Some(64)).unwrap();

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(out.is_empty());

        let inner = err
            .get_ref()
            .and_then(|e| e.downcast_ref::<CryptoError>())
            .expect("CryptoError inside io::Error");
        assert_eq!(inner.kind(), ErrorKind::AuthenticationFailure);
    }
}
