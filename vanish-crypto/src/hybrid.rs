//! Hybrid sealing and opening of message envelopes.
//!
//! `seal` encrypts the message body under a one-time session key and wraps
//! that key for the receiver with an anonymous X25519 + XSalsa20-Poly1305
//! box. The wrapped key is laid out as:
//!
//! ```text
//! ephemeral public key (32) || box nonce (24) || boxed session key (32 + 16)
//! ```
//!
//! The wrapped key is bound into the body's authentication tag as associated
//! data, so no byte of it can change without `open` failing.
//!
//! `open` reverses both steps. Any failure after input parsing collapses to
//! [`CryptoError::Decryption`], and the AEAD step runs even when unwrapping
//! failed so both failure paths do the same work.

use crate::cipher::{self, SessionKey, KEY_SIZE, TAG_SIZE};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{IdentityKeyPair, RecipientKey, PUBLIC_KEY_SIZE};
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand_core::{OsRng, RngCore};
use vanish_types::{MessageEnvelope, SealedPayload};
use zeroize::Zeroizing;

const BOX_NONCE_SIZE: usize = 24;

/// Size of a wrapped session key.
pub const WRAPPED_KEY_SIZE: usize = PUBLIC_KEY_SIZE + BOX_NONCE_SIZE + KEY_SIZE + TAG_SIZE;

/// Seals `plaintext` for the holder of the private key matching
/// `recipient_spki` (X25519 SubjectPublicKeyInfo DER).
///
/// A malformed or truncated public key yields [`CryptoError::Encryption`].
pub fn seal(plaintext: &[u8], recipient_spki: &[u8]) -> CryptoResult<SealedPayload> {
    let recipient = RecipientKey::from_spki_der(recipient_spki)
        .map_err(|e| CryptoError::Encryption(format!("malformed recipient public key: {e}")))?;
    seal_for(plaintext, &recipient)
}

/// Seals `plaintext` for an already parsed recipient key.
pub fn seal_for(plaintext: &[u8], recipient: &RecipientKey) -> CryptoResult<SealedPayload> {
    let session_key = SessionKey::generate()?;
    let wrapped_key = wrap_session_key(&session_key, recipient)?;
    let encrypted = cipher::encrypt_with_aad(&session_key, plaintext, &wrapped_key)?;

    Ok(SealedPayload {
        ciphertext: encrypted.ciphertext,
        wrapped_key,
        nonce: encrypted.nonce,
    })
}

/// Opens an envelope with the receiver's identity keypair.
///
/// Pure: no I/O, no state. Callers must not retry on error.
pub fn open(envelope: &MessageEnvelope, keypair: &IdentityKeyPair) -> CryptoResult<Vec<u8>> {
    open_payload(envelope.payload(), keypair)
}

/// Opens a sealed payload with the receiver's identity keypair.
pub fn open_payload(payload: &SealedPayload, keypair: &IdentityKeyPair) -> CryptoResult<Vec<u8>> {
    let unwrapped = unwrap_session_key(&payload.wrapped_key, keypair.secret());
    let unwrap_ok = unwrapped.is_some();
    let session_key = unwrapped.unwrap_or_else(|| SessionKey::from_bytes([0u8; KEY_SIZE]));

    let body = cipher::decrypt_parts(
        &session_key,
        &payload.nonce,
        &payload.ciphertext,
        &payload.wrapped_key,
    );
    match body {
        Ok(plaintext) if unwrap_ok => Ok(plaintext),
        Ok(plaintext) => {
            drop(Zeroizing::new(plaintext));
            Err(CryptoError::Decryption)
        }
        Err(_) => Err(CryptoError::Decryption),
    }
}

fn wrap_session_key(session_key: &SessionKey, recipient: &RecipientKey) -> CryptoResult<Vec<u8>> {
    let mut ephemeral_bytes = Zeroizing::new([0u8; KEY_SIZE]);
    let mut nonce = [0u8; BOX_NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut ephemeral_bytes[..])
        .and_then(|_| OsRng.try_fill_bytes(&mut nonce))
        .map_err(|e| CryptoError::Encryption(format!("randomness unavailable: {e}")))?;

    let ephemeral = SecretKey::from(*ephemeral_bytes);
    let salsa_box = SalsaBox::new(&recipient.to_public_key(), &ephemeral);

    let boxed = salsa_box
        .encrypt(
            crypto_box::Nonce::from_slice(&nonce),
            session_key.as_bytes().as_slice(),
        )
        .map_err(|e| CryptoError::Encryption(format!("key wrap failed: {e}")))?;

    let mut wrapped = Vec::with_capacity(WRAPPED_KEY_SIZE);
    wrapped.extend_from_slice(ephemeral.public_key().as_bytes());
    wrapped.extend_from_slice(&nonce);
    wrapped.extend_from_slice(&boxed);
    Ok(wrapped)
}

fn unwrap_session_key(wrapped: &[u8], secret: &SecretKey) -> Option<SessionKey> {
    if wrapped.len() != WRAPPED_KEY_SIZE {
        return None;
    }
    let (ephemeral, rest) = wrapped.split_at(PUBLIC_KEY_SIZE);
    let (nonce, boxed) = rest.split_at(BOX_NONCE_SIZE);

    let ephemeral: [u8; PUBLIC_KEY_SIZE] = ephemeral.try_into().ok()?;
    let salsa_box = SalsaBox::new(&PublicKey::from(ephemeral), secret);
    let raw = Zeroizing::new(
        salsa_box
            .decrypt(crypto_box::Nonce::from_slice(nonce), boxed)
            .ok()?,
    );
    let key: [u8; KEY_SIZE] = raw.as_slice().try_into().ok()?;
    Some(SessionKey::from_bytes(key))
}
