//! cryptio-crypto: AES-256-GCM encryption for buffers and unbounded streams
//!
//! Two codecs share one [`Cipher`] per key:
//! ```text
//! buffer:  [nonce 12][ciphertext N][tag 16]
//! stream:  frame || frame || ... || frame
//!          frame = [nonce 12][ciphertext <= chunk_size][tag 16]
//! ```
//!
//! Every seal uses a fresh random 96-bit nonce from the OS CSPRNG. Stream
//! frames are authenticated independently; the chunk size is agreed out of
//! band and is not written to the stream.

pub mod aead;
pub mod buffer;
pub mod keys;
pub mod nonce;
pub mod stream;

pub use aead::Cipher;
pub use buffer::{decrypt, decrypt_with, encrypt, encrypt_with};
pub use cryptio_core::{
    CodecConfig, CryptoError, CryptoResult, ErrorKind, StreamConfig, DEFAULT_CHUNK_SIZE,
    NONCE_SIZE, TAG_SIZE,
};
pub use keys::Key;
pub use nonce::{generate_nonce, NonceSource, OsNonceSource};
pub use stream::{ChunkedReader, ChunkedWriter, StreamState};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;
