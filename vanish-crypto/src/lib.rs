//! Hybrid end-to-end encryption for Vanish.
//!
//! Every message is protected by a two-tier scheme:
//!
//! 1. **Session Key**: a fresh random 256-bit key per message. The message
//!    body is encrypted once with ChaCha20-Poly1305 under this key and the
//!    key is then discarded.
//!
//! 2. **Identity Key**: the receiver's long-lived X25519 keypair. The session
//!    key is wrapped for the receiver's public key with an anonymous
//!    X25519 + XSalsa20-Poly1305 box, so only the receiver can unwrap it.
//!
//! Only the ciphertext, the wrapped key and the nonce ever leave the
//! client. Public keys travel as X25519 SubjectPublicKeyInfo DER.

mod cipher;
mod error;
pub mod hybrid;
mod keys;

pub use cipher::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use hybrid::{open, open_payload, seal, seal_for, WRAPPED_KEY_SIZE};
pub use keys::{IdentityKeyPair, RecipientKey, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE, SPKI_DER_LEN};
