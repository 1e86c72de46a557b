//! Long-lived identity keys and their public export format.

use crate::error::{CryptoError, CryptoResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use crypto_box::{PublicKey, SecretKey};
use rand_core::{OsRng, RngCore};
use std::fmt;
use zeroize::Zeroizing;

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const SECRET_KEY_SIZE: usize = 32;

/// DER header of an X25519 SubjectPublicKeyInfo (OID 1.3.101.110), followed
/// by the 32 raw key bytes.
const X25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x6e, 0x03, 0x21, 0x00,
];

/// Length of an encoded X25519 SubjectPublicKeyInfo.
pub const SPKI_DER_LEN: usize = X25519_SPKI_PREFIX.len() + PUBLIC_KEY_SIZE;

/// X25519 identity keypair.
///
/// The secret key implements `ZeroizeOnDrop` (from crypto_box). `Debug`
/// only shows the public half.
pub struct IdentityKeyPair {
    secret: SecretKey,
    public: RecipientKey,
}

impl IdentityKeyPair {
    /// Generates a new keypair from the OS random source.
    pub fn generate() -> CryptoResult<Self> {
        let mut bytes = Zeroizing::new([0u8; SECRET_KEY_SIZE]);
        OsRng
            .try_fill_bytes(&mut bytes[..])
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self::from_secret_bytes(*bytes))
    }

    /// Reconstructs a keypair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        let secret = SecretKey::from(bytes);
        let public = RecipientKey(*secret.public_key().as_bytes());
        Self { secret, public }
    }

    /// Like [`from_secret_bytes`](Self::from_secret_bytes) but checks the length.
    pub fn from_secret_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; SECRET_KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: SECRET_KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self::from_secret_bytes(arr))
    }

    /// Secret key bytes for local persistence. Wiped when dropped.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; SECRET_KEY_SIZE]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    pub fn public_key(&self) -> &RecipientKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Public half of an identity key, as published in the directory.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecipientKey([u8; PUBLIC_KEY_SIZE]);

impl RecipientKey {
    /// Parses an X25519 SubjectPublicKeyInfo DER blob.
    pub fn from_spki_der(der: &[u8]) -> CryptoResult<Self> {
        if der.len() != SPKI_DER_LEN {
            return Err(CryptoError::InvalidPublicKey(format!(
                "expected {SPKI_DER_LEN} bytes of SPKI DER, got {}",
                der.len()
            )));
        }
        let (prefix, raw) = der.split_at(X25519_SPKI_PREFIX.len());
        if prefix != X25519_SPKI_PREFIX {
            return Err(CryptoError::InvalidPublicKey(
                "not an X25519 SubjectPublicKeyInfo".into(),
            ));
        }
        let mut key = [0u8; PUBLIC_KEY_SIZE];
        key.copy_from_slice(raw);
        Self::from_raw(key)
    }

    /// Accepts raw key bytes, rejecting the all-zero point.
    pub fn from_raw(bytes: [u8; PUBLIC_KEY_SIZE]) -> CryptoResult<Self> {
        if bytes == [0u8; PUBLIC_KEY_SIZE] {
            return Err(CryptoError::InvalidPublicKey("all-zero key".into()));
        }
        Ok(Self(bytes))
    }

    pub fn to_spki_der(&self) -> Vec<u8> {
        let mut der = Vec::with_capacity(SPKI_DER_LEN);
        der.extend_from_slice(&X25519_SPKI_PREFIX);
        der.extend_from_slice(&self.0);
        der
    }

    /// Base64 of the SPKI DER, the form stored in the directory.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_spki_der())
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let der = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidPublicKey(format!("bad base64: {e}")))?;
        Self::from_spki_der(&der)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub(crate) fn to_public_key(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl fmt::Debug for RecipientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecipientKey({}..)", &STANDARD.encode(self.0)[..8])
    }
}
