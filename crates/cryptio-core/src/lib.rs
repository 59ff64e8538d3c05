//! cryptio-core: error taxonomy and configuration shared by the cryptio crates

pub mod config;
pub mod error;

pub use config::{
    CodecConfig, StreamConfig, DEFAULT_CHUNK_SIZE, DEFAULT_SEAL_LIMIT, NONCE_SIZE, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult, ErrorKind};
