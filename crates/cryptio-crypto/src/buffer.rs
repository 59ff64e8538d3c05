//! One-shot AES-256-GCM encryption of an in-memory buffer
//!
//! Encrypted buffer format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```

use cryptio_core::{CryptoError, CryptoResult};

use crate::aead::Cipher;
use crate::keys::Key;
use crate::nonce::generate_nonce;
use crate::{NONCE_SIZE, TAG_SIZE};

/// Encrypt `plaintext` under `key`.
///
/// Returns: `[12-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt(plaintext: &[u8], key: &Key) -> CryptoResult<Vec<u8>> {
    let cipher = Cipher::new(key)?;
    encrypt_with(&cipher, plaintext)
}

/// Decrypt the output of [`encrypt`].
pub fn decrypt(ciphertext: &[u8], key: &Key) -> CryptoResult<Vec<u8>> {
    let cipher = Cipher::new(key)?;
    decrypt_with(&cipher, ciphertext)
}

/// Encrypt with an already-built cipher.
pub fn encrypt_with(cipher: &Cipher, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let nonce = generate_nonce()?;
    let sealed = cipher.seal(&nonce, plaintext)?;

    let mut result = Vec::with_capacity(NONCE_SIZE + sealed.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&sealed);
    Ok(result)
}

/// Decrypt with an already-built cipher.
pub fn decrypt_with(cipher: &Cipher, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    let Some((nonce, sealed)) = ciphertext.split_first_chunk::<NONCE_SIZE>() else {
        return Err(CryptoError::MalformedInput {
            len: ciphertext.len(),
            min: NONCE_SIZE,
        });
    };

    // GCM cannot verify anything shorter than a tag; report it the same way
    // as a tag mismatch.
    if sealed.len() < TAG_SIZE {
        return Err(CryptoError::AuthenticationFailure { frame: None });
    }

    cipher.open(nonce, sealed)
}
