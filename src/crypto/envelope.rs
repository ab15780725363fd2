// Envelope encryption for MFA secrets and backup codes
// AES-256-GCM with explicit nonce/tag fields and a format version tag

use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Current envelope format version. Bumped whenever the at-rest layout
/// changes; `open` refuses anything it does not recognize.
pub const ENVELOPE_VERSION: u8 = 1;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Envelope codec errors
#[derive(Debug, Clone)]
pub enum EnvelopeError {
    /// The key is missing or is not a base64-encoded 256-bit value
    InvalidKey,
    /// The envelope could not be opened: unknown version, malformed
    /// fields, or authentication tag mismatch
    Invalid,
    /// Sealing failed
    Encrypt,
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvelopeError::InvalidKey => {
                write!(f, "envelope key must be a base64-encoded 256-bit value")
            }
            EnvelopeError::Invalid => write!(f, "envelope could not be opened"),
            EnvelopeError::Encrypt => write!(f, "envelope sealing failed"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

/// 256-bit key used to seal and open envelopes. Zeroed on drop, never
/// serialized.
pub struct EnvelopeKey([u8; KEY_LEN]);

impl EnvelopeKey {
    /// Create a key from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create a key from a base64-encoded 256-bit value
    pub fn from_base64(encoded: &str) -> Result<Self, EnvelopeError> {
        let bytes = STANDARD_NO_PAD
            .decode(encoded.trim().as_bytes())
            .map_err(|_| EnvelopeError::InvalidKey)?;

        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| EnvelopeError::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Load the key from an environment variable
    pub fn from_env(var: &str) -> Result<Self, EnvelopeError> {
        let encoded = std::env::var(var).map_err(|_| EnvelopeError::InvalidKey)?;
        Self::from_base64(&encoded)
    }

    fn sealing_key(&self) -> Result<LessSafeKey, EnvelopeError> {
        let unbound =
            UnboundKey::new(&aead::AES_256_GCM, &self.0).map_err(|_| EnvelopeError::InvalidKey)?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl Clone for EnvelopeKey {
    fn clone(&self) -> Self {
        Self(self.0)
    }
}

impl Drop for EnvelopeKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for EnvelopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EnvelopeKey(..)")
    }
}

/// At-rest representation of an encrypted secret. Immutable once created;
/// replacing a secret means replacing the whole envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Base64-encoded ciphertext (without the tag)
    pub ciphertext: String,
    /// Base64-encoded 96-bit nonce
    pub nonce: String,
    /// Base64-encoded 128-bit authentication tag
    pub tag: String,
    /// Envelope format version
    pub version: u8,
}

/// Seal a plaintext into a fresh envelope with a random nonce.
pub fn seal(plaintext: &[u8], key: &EnvelopeKey) -> Result<EncryptedEnvelope, EnvelopeError> {
    let sealing_key = key.sealing_key()?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| EnvelopeError::Encrypt)?;

    let nonce = Nonce::assume_unique_for_key(nonce_bytes);
    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| EnvelopeError::Encrypt)?;

    let tag = in_out.split_off(in_out.len() - aead::AES_256_GCM.tag_len());

    Ok(EncryptedEnvelope {
        ciphertext: STANDARD_NO_PAD.encode(&in_out),
        nonce: STANDARD_NO_PAD.encode(nonce_bytes),
        tag: STANDARD_NO_PAD.encode(&tag),
        version: ENVELOPE_VERSION,
    })
}

/// Open an envelope, failing closed on any mismatch.
///
/// The version is checked before the ciphertext or tag are interpreted, so
/// a record written by a future format is rejected outright rather than
/// misread. Tag mismatch, wrong key, and malformed fields all collapse into
/// the same `EnvelopeError::Invalid`; no partial plaintext ever escapes.
pub fn open(envelope: &EncryptedEnvelope, key: &EnvelopeKey) -> Result<Vec<u8>, EnvelopeError> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(EnvelopeError::Invalid);
    }

    let opening_key = key.sealing_key()?;

    let mut buffer = STANDARD_NO_PAD
        .decode(envelope.ciphertext.as_bytes())
        .map_err(|_| EnvelopeError::Invalid)?;
    let nonce_bytes = STANDARD_NO_PAD
        .decode(envelope.nonce.as_bytes())
        .map_err(|_| EnvelopeError::Invalid)?;
    let tag = STANDARD_NO_PAD
        .decode(envelope.tag.as_bytes())
        .map_err(|_| EnvelopeError::Invalid)?;

    if nonce_bytes.len() != NONCE_LEN || tag.len() != aead::AES_256_GCM.tag_len() {
        return Err(EnvelopeError::Invalid);
    }

    buffer.extend_from_slice(&tag);

    let nonce =
        Nonce::try_assume_unique_for_key(&nonce_bytes).map_err(|_| EnvelopeError::Invalid)?;
    let plaintext = opening_key
        .open_in_place(nonce, Aad::empty(), &mut buffer)
        .map_err(|_| EnvelopeError::Invalid)?;

    Ok(plaintext.to_vec())
}
