// Cryptographic primitives for credential material at rest

pub mod envelope;

pub use envelope::{EncryptedEnvelope, EnvelopeError, EnvelopeKey, open, seal};
