use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CryptoError, CryptoResult};

/// Plaintext bytes per frame when nothing else is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Seals allowed under one key before the cipher refuses to encrypt.
///
/// With random 96-bit nonces the collision probability after 2^32 seals is
/// about 2^-33, the bound NIST SP 800-38D sets for random GCM nonces.
pub const DEFAULT_SEAL_LIMIT: u64 = 1 << 32;

/// Size of an AES-GCM nonce
pub const NONCE_SIZE: usize = 12;

/// Size of an AES-GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Top-level codec configuration (loaded from cryptio.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub stream: StreamConfig,
}

/// Chunked stream configuration. Reader and writer must use the same
/// `chunk_size`; it is not recorded in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Plaintext bytes per frame (default: 1024)
    pub chunk_size: usize,
    /// Seals allowed per key (default: 2^32)
    pub seal_limit: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            seal_limit: DEFAULT_SEAL_LIMIT,
        }
    }
}

impl StreamConfig {
    /// Config with the given chunk size, or the default when `None`.
    pub fn with_chunk_size(chunk_size: Option<usize>) -> CryptoResult<Self> {
        let config = Self {
            chunk_size: chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CryptoResult<()> {
        if self.chunk_size == 0 {
            return Err(CryptoError::InvalidChunkSize(self.chunk_size));
        }
        if self.chunk_size > usize::MAX - NONCE_SIZE - TAG_SIZE {
            return Err(CryptoError::InvalidChunkSize(self.chunk_size));
        }
        if self.seal_limit == 0 {
            return Err(CryptoError::Config("seal_limit must be greater than zero".into()));
        }
        Ok(())
    }

    /// Size of a full frame on the wire: nonce + chunk + tag.
    pub fn frame_size(&self) -> usize {
        NONCE_SIZE + self.chunk_size + TAG_SIZE
    }
}

impl CodecConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: CodecConfig =
            toml::from_str(content).map_err(|e| anyhow::anyhow!("parsing config: {e}"))?;
        config.stream.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        Self::from_toml_str(&content)
            .map_err(|e| anyhow::anyhow!("config {}: {e}", path.display()))
    }
}
