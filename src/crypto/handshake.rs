//! Ephemeral handshake key pair.
//!
//! The handshake establishes the shared symmetric key: the client generates
//! a fresh RSA-2048 key pair, sends the public key to the companion app,
//! and unwraps the shared key the companion returns (RSA-OAEP with a SHA-1
//! digest, as the wire protocol mandates). The pair lives only for the
//! duration of one handshake attempt.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs8::EncodePublicKey;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use thiserror::Error;

use super::keys::KeyMaterial;
use super::HANDSHAKE_KEY_BITS;

/// Errors from handshake key operations
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Key generation failed
    #[error("Key generation failed: {0}")]
    GenerationFailed(String),

    /// Public key DER encoding failed
    #[error("Public key encoding failed: {0}")]
    EncodingFailed(String),
}

/// An ephemeral RSA key pair for one handshake attempt.
pub struct HandshakeKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl HandshakeKeyPair {
    /// Generate a fresh key pair
    pub fn generate() -> Result<Self, HandshakeError> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, HANDSHAKE_KEY_BITS)
            .map_err(|e| HandshakeError::GenerationFailed(e.to_string()))?;
        let public = RsaPublicKey::from(&private);

        Ok(Self { private, public })
    }

    /// The public key as base64-encoded SPKI DER, ready for the handshake payload
    pub fn public_key_base64(&self) -> Result<String, HandshakeError> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|e| HandshakeError::EncodingFailed(e.to_string()))?;
        Ok(BASE64.encode(der.as_bytes()))
    }

    /// Unwrap the shared key the companion app encrypted to our public key.
    ///
    /// Returns `None` on any failure (bad base64, wrong key, corrupted
    /// ciphertext) so the caller can surface a single decryption-failed
    /// error instead of distinguishing causes an attacker controls.
    pub fn decrypt_shared_key(&self, encrypted_base64: &str) -> Option<KeyMaterial> {
        let wrapped = BASE64.decode(encrypted_base64).ok()?;
        self.private
            .decrypt(Oaep::new::<Sha1>(), &wrapped)
            .ok()
            .map(KeyMaterial::new)
    }
}

impl std::fmt::Debug for HandshakeKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeKeyPair")
            .field("private", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rsa::pkcs8::DecodePublicKey;

    use super::*;
    use crate::crypto::SHARED_KEY_SIZE;

    #[test]
    fn test_handshake_unwrap_roundtrip() {
        let pair = HandshakeKeyPair::generate().unwrap();

        // The companion app parses our SPKI DER public key and wraps the
        // shared key with it
        let der = BASE64.decode(pair.public_key_base64().unwrap()).unwrap();
        let companion_view = RsaPublicKey::from_public_key_der(&der).unwrap();

        let shared_key = vec![0x5Au8; SHARED_KEY_SIZE];
        let mut rng = rand::thread_rng();
        let wrapped = companion_view
            .encrypt(&mut rng, Oaep::new::<Sha1>(), &shared_key)
            .unwrap();

        let unwrapped = pair.decrypt_shared_key(&BASE64.encode(wrapped)).unwrap();
        assert_eq!(unwrapped.as_bytes(), shared_key.as_slice());

        // Garbage inputs never panic, only fail
        assert!(pair.decrypt_shared_key("not base64!!").is_none());
        assert!(pair.decrypt_shared_key(&BASE64.encode([0u8; 256])).is_none());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let pair = HandshakeKeyPair::generate().unwrap();
        let debug = format!("{:?}", pair);
        assert!(debug.contains("REDACTED"));
    }
}
