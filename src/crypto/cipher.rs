//! AES-256-CBC + HMAC-SHA256 payload cipher.
//!
//! Encrypt-then-MAC: each payload is encrypted under a fresh random IV and
//! authenticated with an HMAC over `iv || ciphertext`. Verification happens
//! before any decryption, in constant time, so a tampered payload never
//! yields partial plaintext.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

use super::keys::SharedKey;
use super::{AES_BLOCK_SIZE, IV_SIZE, MAC_SIZE};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Errors from payload cipher operations
#[derive(Debug, Error)]
pub enum CipherError {
    /// MAC verification failed
    #[error("Payload MAC verification failed")]
    MacMismatch,

    /// Ciphertext or IV malformed, or padding invalid after decryption
    #[error("Payload decryption failed")]
    DecryptionFailed,
}

/// An encrypted payload: ciphertext plus the IV and MAC needed to open it.
#[derive(Clone)]
pub struct EncryptedPayload {
    /// Ciphertext
    pub data: Vec<u8>,
    /// Initialization vector, fresh per encryption
    pub iv: [u8; IV_SIZE],
    /// HMAC-SHA256 over `iv || data`
    pub mac: [u8; MAC_SIZE],
}

impl std::fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedPayload")
            .field("data_len", &self.data.len())
            .finish_non_exhaustive()
    }
}

/// Symmetric payload cipher over a negotiated [`SharedKey`].
pub struct PayloadCipher {
    key: SharedKey,
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayloadCipher([REDACTED])")
    }
}

impl PayloadCipher {
    /// Create a cipher over the given shared key
    pub fn new(key: SharedKey) -> Self {
        Self { key }
    }

    /// Encrypt a plaintext under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> EncryptedPayload {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        self.encrypt_with_iv(plaintext, iv)
    }

    fn encrypt_with_iv(&self, plaintext: &[u8], iv: [u8; IV_SIZE]) -> EncryptedPayload {
        let data = Aes256CbcEnc::new(self.key.encryption_key().into(), (&iv).into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        let mac = self.compute_mac(&iv, &data);

        EncryptedPayload { data, iv, mac }
    }

    /// Verify the MAC and decrypt.
    ///
    /// The MAC is recomputed over `iv || data` and compared in constant
    /// time before the ciphertext is touched. Returns the full plaintext or
    /// an error, never partial data.
    pub fn decrypt(&self, data: &[u8], iv: &[u8], mac: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut verifier = HmacSha256::new_from_slice(self.key.mac_key())
            .expect("HMAC accepts any key size");
        verifier.update(iv);
        verifier.update(data);
        verifier
            .verify_slice(mac)
            .map_err(|_| CipherError::MacMismatch)?;

        let iv: &[u8; IV_SIZE] = iv.try_into().map_err(|_| CipherError::DecryptionFailed)?;
        if data.is_empty() || data.len() % AES_BLOCK_SIZE != 0 {
            return Err(CipherError::DecryptionFailed);
        }

        Aes256CbcDec::new(self.key.encryption_key().into(), iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(|_| CipherError::DecryptionFailed)
    }

    /// Compute the HMAC-SHA256 tag over `iv || data`
    pub fn compute_mac(&self, iv: &[u8], data: &[u8]) -> [u8; MAC_SIZE] {
        let mut mac = HmacSha256::new_from_slice(self.key.mac_key())
            .expect("HMAC accepts any key size");
        mac.update(iv);
        mac.update(data);

        let result = mac.finalize();
        let mut tag = [0u8; MAC_SIZE];
        tag.copy_from_slice(&result.into_bytes());
        tag
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::crypto::SHARED_KEY_SIZE;

    fn test_cipher() -> PayloadCipher {
        PayloadCipher::new(SharedKey::from_bytes(&[0x42u8; SHARED_KEY_SIZE]).unwrap())
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let plaintext = br#"{"command":"status"}"#;

        let sealed = cipher.encrypt(plaintext);
        let opened = cipher.decrypt(&sealed.data, &sealed.iv, &sealed.mac).unwrap();

        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let cipher = test_cipher();

        let sealed = cipher.encrypt(b"");
        // PKCS7 pads an empty plaintext to a full block
        assert_eq!(sealed.data.len(), AES_BLOCK_SIZE);

        let opened = cipher.decrypt(&sealed.data, &sealed.iv, &sealed.mac).unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let cipher = test_cipher();
        let plaintext = b"same plaintext";

        let a = cipher.encrypt(plaintext);
        let b = cipher.encrypt(plaintext);

        assert_ne!(a.iv, b.iv);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let cipher = test_cipher();
        let mut sealed = cipher.encrypt(b"secret payload");

        sealed.data[0] ^= 0x01;

        let result = cipher.decrypt(&sealed.data, &sealed.iv, &sealed.mac);
        assert!(matches!(result, Err(CipherError::MacMismatch)));
    }

    #[test]
    fn test_tampered_iv_rejected() {
        let cipher = test_cipher();
        let mut sealed = cipher.encrypt(b"secret payload");

        sealed.iv[3] ^= 0x80;

        let result = cipher.decrypt(&sealed.data, &sealed.iv, &sealed.mac);
        assert!(matches!(result, Err(CipherError::MacMismatch)));
    }

    #[test]
    fn test_tampered_mac_rejected() {
        let cipher = test_cipher();
        let mut sealed = cipher.encrypt(b"secret payload");

        sealed.mac[MAC_SIZE - 1] ^= 0x01;

        let result = cipher.decrypt(&sealed.data, &sealed.iv, &sealed.mac);
        assert!(matches!(result, Err(CipherError::MacMismatch)));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let cipher = test_cipher();
        let other = PayloadCipher::new(SharedKey::from_bytes(&[0x43u8; SHARED_KEY_SIZE]).unwrap());

        let sealed = cipher.encrypt(b"secret payload");
        let result = other.decrypt(&sealed.data, &sealed.iv, &sealed.mac);
        assert!(matches!(result, Err(CipherError::MacMismatch)));
    }

    #[test]
    fn test_mac_covers_iv_and_data() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt(b"payload");

        // Swapping the IV for another valid one must invalidate the tag
        let other_iv = [0x55u8; IV_SIZE];
        let result = cipher.decrypt(&sealed.data, &other_iv, &sealed.mac);
        assert!(matches!(result, Err(CipherError::MacMismatch)));
    }

    proptest! {
        #[test]
        fn prop_roundtrip_any_plaintext(
            plaintext in proptest::collection::vec(any::<u8>(), 0..2048),
            key in proptest::collection::vec(any::<u8>(), SHARED_KEY_SIZE..=SHARED_KEY_SIZE),
        ) {
            let cipher = PayloadCipher::new(SharedKey::from_bytes(&key).unwrap());
            let sealed = cipher.encrypt(&plaintext);
            let opened = cipher.decrypt(&sealed.data, &sealed.iv, &sealed.mac).unwrap();
            prop_assert_eq!(opened, plaintext);
        }

        #[test]
        fn prop_bit_flip_never_yields_plaintext(
            plaintext in proptest::collection::vec(any::<u8>(), 1..256),
            flip_byte in 0usize..1024,
            flip_bit in 0u8..8,
        ) {
            let cipher = PayloadCipher::new(
                SharedKey::from_bytes(&[0x42u8; SHARED_KEY_SIZE]).unwrap(),
            );
            let sealed = cipher.encrypt(&plaintext);

            // Flip one bit somewhere in the concatenation of data, iv, and mac
            let mut data = sealed.data.clone();
            let mut iv = sealed.iv;
            let mut mac = sealed.mac;
            let total = data.len() + iv.len() + mac.len();
            let pos = flip_byte % total;
            let bit = 1u8 << flip_bit;
            if pos < data.len() {
                data[pos] ^= bit;
            } else if pos < data.len() + iv.len() {
                iv[pos - data.len()] ^= bit;
            } else {
                mac[pos - data.len() - iv.len()] ^= bit;
            }

            prop_assert!(cipher.decrypt(&data, &iv, &mac).is_err());
        }
    }
}
