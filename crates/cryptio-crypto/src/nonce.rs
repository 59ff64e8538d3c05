//! Random nonce generation
//!
//! Every seal draws a fresh 96-bit nonce from the operating system CSPRNG.
//! Nonces are never counter-derived and there is no fallback RNG: if the OS
//! source fails, the seal fails with `RandomSourceExhausted`.

use cryptio_core::{CryptoError, CryptoResult};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::NONCE_SIZE;

/// Source of nonce bytes. Implementations must be cryptographically secure.
pub trait NonceSource: Send + Sync {
    fn fill(&self, dst: &mut [u8]) -> CryptoResult<()>;
}

/// Reads from the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsNonceSource;

impl NonceSource for OsNonceSource {
    fn fill(&self, dst: &mut [u8]) -> CryptoResult<()> {
        OsRng
            .try_fill_bytes(dst)
            .map_err(|e| CryptoError::RandomSourceExhausted(e.to_string()))
    }
}

/// Draw one nonce from the OS CSPRNG.
pub fn generate_nonce() -> CryptoResult<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsNonceSource.fill(&mut nonce)?;
    Ok(nonce)
}
