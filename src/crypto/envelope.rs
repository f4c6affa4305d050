//! AES-128-CBC envelope encryption.
//!
//! An [`Envelope`] travels as text: `"<base64 iv> <base64 ciphertext>"`.
//! The space never occurs in standard base64, so parsing splits on the first
//! one. CBC provides no authentication: a corrupted ciphertext with valid
//! padding decrypts to garbage instead of failing.

use std::fmt;
use std::str::FromStr;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use super::secret::Secret;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES block size, also the IV length.
pub const BLOCK_SIZE: usize = 16;

/// Separator between the IV and ciphertext fields.
pub const ENVELOPE_DELIMITER: char = ' ';

/// Errors that can occur while opening an envelope.
///
/// None of these variants tells a wrong key apart from corrupted data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Malformed envelope: missing delimiter")]
    MissingDelimiter,

    #[error("Invalid base64: {0}")]
    InvalidBase64(String),

    #[error("Invalid IV length: expected {BLOCK_SIZE} bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("Invalid ciphertext length: {0} bytes is not a positive multiple of {BLOCK_SIZE}")]
    InvalidCiphertextLength(usize),

    #[error("Invalid key length: {0} bytes")]
    InvalidKeyLength(usize),

    #[error("Decryption failed: bad padding")]
    BadPadding,

    #[error("Decrypted data is not valid UTF-8")]
    InvalidUtf8,
}

/// Initialization vector and ciphertext of one encrypted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    iv: [u8; BLOCK_SIZE],
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Parses the textual form `"<base64 iv> <base64 ciphertext>"`.
    pub fn parse(text: &str) -> Result<Self, CipherError> {
        let (iv_b64, ct_b64) = text
            .split_once(ENVELOPE_DELIMITER)
            .ok_or(CipherError::MissingDelimiter)?;

        let iv_bytes = BASE64
            .decode(iv_b64)
            .map_err(|e| CipherError::InvalidBase64(format!("iv: {}", e)))?;
        let iv: [u8; BLOCK_SIZE] = iv_bytes
            .as_slice()
            .try_into()
            .map_err(|_| CipherError::InvalidIvLength(iv_bytes.len()))?;

        let ciphertext = BASE64
            .decode(ct_b64)
            .map_err(|e| CipherError::InvalidBase64(format!("ciphertext: {}", e)))?;

        Ok(Self { iv, ciphertext })
    }

    /// Returns the initialization vector.
    pub fn iv(&self) -> &[u8; BLOCK_SIZE] {
        &self.iv
    }

    /// Returns the raw ciphertext.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Decrypts this envelope with `secret`.
    pub fn open(&self, secret: &Secret) -> Result<Vec<u8>, CipherError> {
        if self.ciphertext.is_empty() || self.ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CipherError::InvalidCiphertextLength(self.ciphertext.len()));
        }

        let cipher = Aes128CbcDec::new(
            GenericArray::from_slice(secret.as_bytes()),
            GenericArray::from_slice(&self.iv),
        );

        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&self.ciphertext)
            .map_err(|_| CipherError::BadPadding)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            BASE64.encode(self.iv),
            ENVELOPE_DELIMITER,
            BASE64.encode(&self.ciphertext)
        )
    }
}

impl FromStr for Envelope {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Encrypts `plaintext` under a fresh random IV.
pub fn encrypt(secret: &Secret, plaintext: &[u8]) -> Envelope {
    let mut iv = [0u8; BLOCK_SIZE];
    OsRng.fill_bytes(&mut iv);

    let cipher = Aes128CbcEnc::new(
        GenericArray::from_slice(secret.as_bytes()),
        GenericArray::from_slice(&iv),
    );
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    Envelope { iv, ciphertext }
}

/// Parses and decrypts an envelope.
pub fn decrypt(secret: &Secret, envelope: &str) -> Result<Vec<u8>, CipherError> {
    Envelope::parse(envelope)?.open(secret)
}

/// Parses and decrypts an envelope carrying UTF-8 text.
pub fn decrypt_text(secret: &Secret, envelope: &str) -> Result<String, CipherError> {
    let plaintext = decrypt(secret, envelope)?;
    String::from_utf8(plaintext).map_err(|_| CipherError::InvalidUtf8)
}
