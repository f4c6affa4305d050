//! Shared room secret derived from three key fragments.
//!
//! The key is a direct encoding of the fragments, not a KDF:
//! `fragment1 || fragment2 || fragment3`, zero-padded or truncated to
//! [`KEY_SIZE`] bytes. Anyone holding the same three fragments derives the
//! same key.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::envelope::CipherError;

/// Key length in bytes (AES-128, equal to the cipher block size).
pub const KEY_SIZE: usize = 16;

/// Symmetric key shared by every member of a room.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    key: [u8; KEY_SIZE],
}

impl Secret {
    /// Derives the key from three user-supplied fragments.
    pub fn from_fragments(first: &str, second: &str, third: &str) -> Self {
        let mut combined = String::with_capacity(first.len() + second.len() + third.len());
        combined.push_str(first);
        combined.push_str(second);
        combined.push_str(third);

        let secret = Self::from_passphrase(&combined);
        combined.zeroize();
        secret
    }

    /// Derives the key from an already concatenated passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let bytes = passphrase.as_bytes();
        let mut key = [0u8; KEY_SIZE];
        let len = bytes.len().min(KEY_SIZE);
        key[..len].copy_from_slice(&bytes[..len]);
        Self { key }
    }

    /// Wraps raw key bytes.
    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Restores a key saved with [`Secret::to_base64`].
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let mut bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| CipherError::InvalidBase64(e.to_string()))?;
        if bytes.len() != KEY_SIZE {
            let len = bytes.len();
            bytes.zeroize();
            return Err(CipherError::InvalidKeyLength(len));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self { key })
    }

    /// Encodes the key for storage in a profile file.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.key)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl ConstantTimeEq for Secret {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.key[..].ct_eq(&other.key[..])
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}
