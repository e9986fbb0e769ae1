//! Key material containers.
//!
//! All secret bytes live in types that zeroize on drop and redact their
//! `Debug` output, so key material never leaks through logs or panics.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{ENC_KEY_SIZE, MAC_KEY_SIZE, SHARED_KEY_SIZE};

/// Secret bytes of arbitrary length.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyMaterial {
    bytes: Vec<u8>,
}

impl KeyMaterial {
    /// Create new key material from bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Get the key length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the key is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Don't leak key material in debug output
        write!(f, "KeyMaterial([REDACTED, {} bytes])", self.bytes.len())
    }
}

/// The negotiated shared key, split into its cipher and MAC halves.
///
/// The companion app delivers a single 64-byte key; the first half keys the
/// AES-256-CBC payload cipher, the second half keys HMAC-SHA256.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedKey {
    enc: [u8; ENC_KEY_SIZE],
    mac: [u8; MAC_KEY_SIZE],
}

impl SharedKey {
    /// Split raw shared-key bytes into the two halves.
    ///
    /// Returns `None` unless the input is exactly [`SHARED_KEY_SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SHARED_KEY_SIZE {
            return None;
        }

        let mut enc = [0u8; ENC_KEY_SIZE];
        let mut mac = [0u8; MAC_KEY_SIZE];
        enc.copy_from_slice(&bytes[..ENC_KEY_SIZE]);
        mac.copy_from_slice(&bytes[ENC_KEY_SIZE..]);

        Some(Self { enc, mac })
    }

    /// The AES-256 encryption key half
    pub fn encryption_key(&self) -> &[u8; ENC_KEY_SIZE] {
        &self.enc
    }

    /// The HMAC-SHA256 key half
    pub fn mac_key(&self) -> &[u8; MAC_KEY_SIZE] {
        &self.mac
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_key_split() {
        let mut bytes = vec![0xAAu8; ENC_KEY_SIZE];
        bytes.extend_from_slice(&[0xBBu8; MAC_KEY_SIZE]);

        let key = SharedKey::from_bytes(&bytes).unwrap();
        assert_eq!(key.encryption_key(), &[0xAAu8; ENC_KEY_SIZE]);
        assert_eq!(key.mac_key(), &[0xBBu8; MAC_KEY_SIZE]);
    }

    #[test]
    fn test_shared_key_rejects_wrong_length() {
        assert!(SharedKey::from_bytes(&[0u8; 32]).is_none());
        assert!(SharedKey::from_bytes(&[0u8; 63]).is_none());
        assert!(SharedKey::from_bytes(&[0u8; 65]).is_none());
        assert!(SharedKey::from_bytes(&[]).is_none());
    }

    #[test]
    fn test_key_material_debug_redacted() {
        let key = KeyMaterial::new(vec![0x41, 0x42, 0x43]); // "ABC"
        let debug = format!("{:?}", key);
        assert!(!debug.contains("ABC"));
        assert!(debug.contains("REDACTED"));
        assert!(debug.contains("3 bytes"));
    }

    #[test]
    fn test_shared_key_debug_redacted() {
        let key = SharedKey::from_bytes(&[0x41u8; SHARED_KEY_SIZE]).unwrap();
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("65"));
    }
}
