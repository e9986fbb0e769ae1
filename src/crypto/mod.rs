//! Session cryptography for the native-messaging channel.
//!
//! Two operations back the protocol:
//!
//! 1. **Handshake**: an ephemeral RSA-2048 key pair whose public half goes
//!    to the companion app; the companion answers with the shared key
//!    wrapped via RSA-OAEP(SHA-1).
//! 2. **Payload protection**: AES-256-CBC encryption plus an HMAC-SHA256
//!    tag over `iv || ciphertext`, keyed by the two halves of the 64-byte
//!    shared key.
//!
//! [`SessionCrypto`] owns all key material and exposes exactly these
//! operations over byte buffers. It performs no I/O and knows nothing about
//! the message protocol above it; persistence and wire framing live with
//! the caller.
//!
//! # IV Generation
//!
//! Every encryption draws a fresh random 16-byte IV from the system CSPRNG.
//! The IV travels alongside the ciphertext, so decryption needs no state.

mod cipher;
mod handshake;
mod keys;

use thiserror::Error;

pub use cipher::{CipherError, EncryptedPayload, PayloadCipher};
pub use handshake::{HandshakeError, HandshakeKeyPair};
pub use keys::{KeyMaterial, SharedKey};

/// Total shared-key length: encryption half plus MAC half
pub const SHARED_KEY_SIZE: usize = 64;

/// AES-256 key length
pub const ENC_KEY_SIZE: usize = 32;

/// HMAC-SHA256 key length
pub const MAC_KEY_SIZE: usize = 32;

/// AES block and IV length
pub const AES_BLOCK_SIZE: usize = 16;

/// Initialization vector length
pub const IV_SIZE: usize = 16;

/// HMAC-SHA256 tag length
pub const MAC_SIZE: usize = 32;

/// RSA modulus size for the handshake key pair
pub const HANDSHAKE_KEY_BITS: usize = 2048;

/// Unified error type for session crypto operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No shared key has been installed yet
    #[error("No shared key installed")]
    MissingSharedKey,

    /// No handshake key pair is available to unwrap a shared key
    #[error("No handshake key pair available")]
    MissingHandshakeKey,

    /// Payload cipher error
    #[error("Cipher: {0}")]
    Cipher(#[source] CipherError),

    /// Handshake key error
    #[error("Handshake: {0}")]
    Handshake(#[source] HandshakeError),
}

impl From<CipherError> for CryptoError {
    fn from(err: CipherError) -> Self {
        CryptoError::Cipher(err)
    }
}

impl From<HandshakeError> for CryptoError {
    fn from(err: HandshakeError) -> Self {
        CryptoError::Handshake(err)
    }
}

/// Key material holder for one connection.
///
/// Holds at most one ephemeral handshake key pair and one installed shared
/// key. Dropping or [`clear_keys`](SessionCrypto::clear_keys)-ing it
/// zeroizes everything.
#[derive(Debug, Default)]
pub struct SessionCrypto {
    handshake: Option<HandshakeKeyPair>,
    cipher: Option<PayloadCipher>,
}

impl SessionCrypto {
    /// Create an empty crypto context
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh handshake key pair, replacing any previous one.
    ///
    /// Returns the base64 SPKI public key to embed in the handshake
    /// request.
    pub fn generate_handshake_key_pair(&mut self) -> Result<String, CryptoError> {
        let pair = HandshakeKeyPair::generate()?;
        let public_key = pair.public_key_base64()?;
        self.handshake = Some(pair);
        Ok(public_key)
    }

    /// Unwrap the shared key delivered in a handshake response.
    ///
    /// Returns `None` if no handshake pair is live or on any cryptographic
    /// failure; the caller reports a shared-key decryption error rather
    /// than crashing.
    pub fn decrypt_negotiated_key(&self, encrypted_base64: &str) -> Option<KeyMaterial> {
        self.handshake.as_ref()?.decrypt_shared_key(encrypted_base64)
    }

    /// Discard the ephemeral handshake pair once the handshake completed
    /// or failed.
    pub fn discard_handshake_keys(&mut self) {
        self.handshake = None;
    }

    /// Install the shared symmetric key used for all command encryption.
    ///
    /// Returns `false` (leaving any previous key untouched) if the byte
    /// length does not fit the cipher.
    pub fn install_shared_key(&mut self, bytes: &[u8]) -> bool {
        match SharedKey::from_bytes(bytes) {
            Some(key) => {
                self.cipher = Some(PayloadCipher::new(key));
                true
            }
            None => false,
        }
    }

    /// Whether a shared key is currently installed
    pub fn has_shared_key(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encrypt a command payload under the shared key
    pub fn encrypt_payload(&self, plaintext: &[u8]) -> Result<EncryptedPayload, CryptoError> {
        let cipher = self.cipher.as_ref().ok_or(CryptoError::MissingSharedKey)?;
        Ok(cipher.encrypt(plaintext))
    }

    /// Verify and decrypt a response payload.
    ///
    /// MAC mismatch and decryption failure surface as distinct errors; in
    /// neither case is partial plaintext returned.
    pub fn decrypt_payload(
        &self,
        data: &[u8],
        iv: &[u8],
        mac: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = self.cipher.as_ref().ok_or(CryptoError::MissingSharedKey)?;
        Ok(cipher.decrypt(data, iv, mac)?)
    }

    /// Zeroize all key material
    pub fn clear_keys(&mut self) {
        self.handshake = None;
        self.cipher = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_rejects_wrong_length() {
        let mut crypto = SessionCrypto::new();
        assert!(!crypto.install_shared_key(&[0u8; 32]));
        assert!(!crypto.install_shared_key(&[]));
        assert!(!crypto.has_shared_key());

        assert!(crypto.install_shared_key(&[0u8; SHARED_KEY_SIZE]));
        assert!(crypto.has_shared_key());
    }

    #[test]
    fn test_encrypt_without_key_fails() {
        let crypto = SessionCrypto::new();
        let result = crypto.encrypt_payload(b"payload");
        assert!(matches!(result, Err(CryptoError::MissingSharedKey)));
    }

    #[test]
    fn test_session_roundtrip() {
        let mut crypto = SessionCrypto::new();
        assert!(crypto.install_shared_key(&[0x11u8; SHARED_KEY_SIZE]));

        let sealed = crypto.encrypt_payload(b"inner command").unwrap();
        let opened = crypto
            .decrypt_payload(&sealed.data, &sealed.iv, &sealed.mac)
            .unwrap();
        assert_eq!(opened, b"inner command");
    }

    #[test]
    fn test_clear_keys_wipes_state() {
        let mut crypto = SessionCrypto::new();
        assert!(crypto.install_shared_key(&[0x11u8; SHARED_KEY_SIZE]));
        crypto.clear_keys();

        assert!(!crypto.has_shared_key());
        assert!(matches!(
            crypto.encrypt_payload(b"payload"),
            Err(CryptoError::MissingSharedKey)
        ));
    }

    #[test]
    fn test_decrypt_negotiated_key_without_handshake() {
        let crypto = SessionCrypto::new();
        assert!(crypto.decrypt_negotiated_key("aGVsbG8=").is_none());
    }
}
