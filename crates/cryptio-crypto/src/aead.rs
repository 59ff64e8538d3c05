//! AES-256-GCM cipher built once per key
//!
//! A [`Cipher`] is immutable apart from its seal counter, which is shared by
//! every clone so the per-key budget holds across streams and threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use cryptio_core::{CryptoError, CryptoResult, DEFAULT_SEAL_LIMIT};

use crate::keys::Key;
use crate::{NONCE_SIZE, TAG_SIZE};

#[derive(Clone)]
pub struct Cipher {
    inner: Aes256Gcm,
    seals: Arc<AtomicU64>,
    seal_limit: u64,
}

impl Cipher {
    /// Build the AEAD from a 256-bit key.
    pub fn new(key: &Key) -> CryptoResult<Self> {
        let inner = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        Ok(Self {
            inner,
            seals: Arc::new(AtomicU64::new(0)),
            seal_limit: DEFAULT_SEAL_LIMIT,
        })
    }

    /// Override how many seals this key may perform.
    pub fn with_seal_limit(mut self, limit: u64) -> Self {
        self.seal_limit = limit;
        self
    }

    /// Seals performed so far by this cipher and all of its clones.
    pub fn seals(&self) -> u64 {
        self.seals.load(Ordering::Acquire)
    }

    pub fn nonce_size(&self) -> usize {
        NONCE_SIZE
    }

    pub fn tag_size(&self) -> usize {
        TAG_SIZE
    }

    /// Bytes added to every sealed message: nonce + tag.
    pub fn overhead(&self) -> usize {
        NONCE_SIZE + TAG_SIZE
    }

    /// Encrypt `plaintext`, returning `ciphertext || tag`.
    pub fn seal(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.reserve_seal()?;
        self.inner
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(|_| CryptoError::PlaintextTooLong(plaintext.len()))
    }

    /// Verify and decrypt `ciphertext || tag`. No plaintext is returned unless
    /// the tag verifies.
    pub fn open(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.inner
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailure { frame: None })
    }

    /// Encrypt `buf` in place and return the detached tag.
    pub fn seal_in_place(
        &self,
        nonce: &[u8; NONCE_SIZE],
        buf: &mut [u8],
    ) -> CryptoResult<[u8; TAG_SIZE]> {
        self.reserve_seal()?;
        let tag = self
            .inner
            .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", buf)
            .map_err(|_| CryptoError::PlaintextTooLong(buf.len()))?;

        let mut out = [0u8; TAG_SIZE];
        out.copy_from_slice(tag.as_slice());
        Ok(out)
    }

    /// Verify `tag` over `buf` and decrypt it in place.
    ///
    /// On failure `buf` still holds ciphertext and must not be used as plaintext.
    pub fn open_in_place(
        &self,
        nonce: &[u8; NONCE_SIZE],
        buf: &mut [u8],
        tag: &[u8; TAG_SIZE],
    ) -> CryptoResult<()> {
        self.inner
            .decrypt_in_place_detached(Nonce::from_slice(nonce), b"", buf, Tag::from_slice(tag))
            .map_err(|_| CryptoError::AuthenticationFailure { frame: None })
    }

    fn reserve_seal(&self) -> CryptoResult<()> {
        let limit = self.seal_limit;
        self.seals
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| CryptoError::KeyUsageExhausted { limit })
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("algorithm", &"AES-256-GCM")
            .field("seals", &self.seals())
            .field("seal_limit", &self.seal_limit)
            .finish()
    }
}
