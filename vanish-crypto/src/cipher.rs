//! ChaCha20-Poly1305 content encryption under one-time session keys.

use crate::error::{CryptoError, CryptoResult};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand_core::{OsRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Session key size in bytes (256 bits).
pub const KEY_SIZE: usize = 32;
/// ChaCha20-Poly1305 nonce size in bytes.
pub const NONCE_SIZE: usize = 12;
/// Poly1305 tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// One-time symmetric key. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Draws a fresh key from the OS random source.
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::Encryption(format!("randomness unavailable: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Nonce plus ciphertext (tag appended).
#[derive(Debug)]
pub(crate) struct EncryptedBody {
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Encrypts `plaintext` under `key` with a fresh random nonce, binding `aad`
/// into the authentication tag.
pub(crate) fn encrypt_with_aad(
    key: &SessionKey,
    plaintext: &[u8],
    aad: &[u8],
) -> CryptoResult<EncryptedBody> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::Encryption(format!("randomness unavailable: {e}")))?;

    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::Encryption(format!("aead seal failed: {e}")))?;

    Ok(EncryptedBody { nonce, ciphertext })
}

pub(crate) fn decrypt_parts(
    key: &SessionKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::Decryption)
}
