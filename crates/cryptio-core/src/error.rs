use std::io;

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Every failure the codecs can report. None of them is retried internally.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("secure random source failed: {0}")]
    RandomSourceExhausted(String),

    #[error("malformed input: {len} bytes (minimum {min})")]
    MalformedInput { len: usize, min: usize },

    #[error("truncated frame {frame}: stream ended after {len} bytes of an incomplete frame")]
    TruncatedFrame { frame: u64, len: usize },

    #[error("authentication failed{}", at_frame(.frame))]
    AuthenticationFailure { frame: Option<u64> },

    #[error("sink rejected frame {frame}: {source}")]
    SinkWrite {
        frame: u64,
        #[source]
        source: io::Error,
    },

    #[error("source failed while reading frame {frame}: {source}")]
    SourceRead {
        frame: u64,
        #[source]
        source: io::Error,
    },

    #[error("destination too small: chunk needs {needed} bytes, buffer holds {available}")]
    DestinationTooSmall { needed: usize, available: usize },

    #[error("plaintext of {0} bytes exceeds the AEAD message limit")]
    PlaintextTooLong(usize),

    #[error("invalid chunk size {0}: must be greater than zero")]
    InvalidChunkSize(usize),

    #[error("key usage exhausted: {limit} seals already performed with this key")]
    KeyUsageExhausted { limit: u64 },

    #[error("stream is closed")]
    StreamClosed,

    #[error("config error: {0}")]
    Config(String),
}

fn at_frame(frame: &Option<u64>) -> String {
    match frame {
        Some(index) => format!(" on frame {index}"),
        None => String::new(),
    }
}

/// Fieldless discriminant of [`CryptoError`], handy for matching in callers
/// and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidKey,
    RandomSourceExhausted,
    MalformedInput,
    TruncatedFrame,
    AuthenticationFailure,
    SinkWrite,
    SourceRead,
    DestinationTooSmall,
    PlaintextTooLong,
    InvalidChunkSize,
    KeyUsageExhausted,
    StreamClosed,
    Config,
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidKey(_) => ErrorKind::InvalidKey,
            CryptoError::RandomSourceExhausted(_) => ErrorKind::RandomSourceExhausted,
            CryptoError::MalformedInput { .. } => ErrorKind::MalformedInput,
            CryptoError::TruncatedFrame { .. } => ErrorKind::TruncatedFrame,
            CryptoError::AuthenticationFailure { .. } => ErrorKind::AuthenticationFailure,
            CryptoError::SinkWrite { .. } => ErrorKind::SinkWrite,
            CryptoError::SourceRead { .. } => ErrorKind::SourceRead,
            CryptoError::DestinationTooSmall { .. } => ErrorKind::DestinationTooSmall,
            CryptoError::PlaintextTooLong(_) => ErrorKind::PlaintextTooLong,
            CryptoError::InvalidChunkSize(_) => ErrorKind::InvalidChunkSize,
            CryptoError::KeyUsageExhausted { .. } => ErrorKind::KeyUsageExhausted,
            CryptoError::StreamClosed => ErrorKind::StreamClosed,
            CryptoError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Used by the `std::io::Read`/`Write` adapters. The original `CryptoError`
/// stays reachable through `io::Error::get_ref` / `into_inner`.
impl From<CryptoError> for io::Error {
    fn from(err: CryptoError) -> Self {
        let kind = match &err {
            CryptoError::SinkWrite { source, .. } | CryptoError::SourceRead { source, .. } => {
                source.kind()
            }
            CryptoError::TruncatedFrame { .. } => io::ErrorKind::UnexpectedEof,
            CryptoError::MalformedInput { .. } | CryptoError::AuthenticationFailure { .. } => {
                io::ErrorKind::InvalidData
            }
            CryptoError::InvalidKey(_)
            | CryptoError::DestinationTooSmall { .. }
            | CryptoError::PlaintextTooLong(_)
            | CryptoError::InvalidChunkSize(_)
            | CryptoError::Config(_) => io::ErrorKind::InvalidInput,
            CryptoError::RandomSourceExhausted(_)
            | CryptoError::KeyUsageExhausted { .. }
            | CryptoError::StreamClosed => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
