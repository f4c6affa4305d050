//! Payload framing for the image channel.
//!
//! Format: `[ENCRYPTED: + envelope | raw payload] ++ <<<END>>>`.
//! Bits are laid out most significant first within each byte.

use crate::crypto::{self, Secret};

use super::error::StegoError;

/// Literal appended after every payload.
pub const END_MARKER: &[u8] = b"<<<END>>>";

/// Prefix marking a payload that was sealed with the room secret.
pub const ENCRYPTED_TAG: &[u8] = b"ENCRYPTED:";

/// A message recovered from an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HiddenMessage {
    /// The payload was embedded without encryption.
    Plain(Vec<u8>),
    /// The payload was encrypted and opened with the supplied secret.
    Decrypted(Vec<u8>),
    /// The payload is tagged as encrypted but no secret was supplied.
    /// Holds the tagged text exactly as recovered.
    Sealed(Vec<u8>),
}

impl HiddenMessage {
    /// Returns the recovered bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Plain(b) | Self::Decrypted(b) | Self::Sealed(b) => b,
        }
    }

    /// Consumes the message and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Plain(b) | Self::Decrypted(b) | Self::Sealed(b) => b,
        }
    }

    /// Returns the bytes as text, replacing invalid UTF-8 sequences.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }

    /// True when the payload is still encrypted.
    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed(_))
    }
}

/// Builds the byte string that gets written into the image.
pub fn frame(payload: &[u8], secret: Option<&Secret>) -> Vec<u8> {
    let mut framed = match secret {
        Some(secret) => {
            let envelope = crypto::encrypt(secret, payload).to_string();
            let mut sealed = Vec::with_capacity(ENCRYPTED_TAG.len() + envelope.len());
            sealed.extend_from_slice(ENCRYPTED_TAG);
            sealed.extend_from_slice(envelope.as_bytes());
            sealed
        }
        None => payload.to_vec(),
    };
    framed.extend_from_slice(END_MARKER);
    framed
}

/// Cuts the recovered stream at the end marker and opens it if tagged.
pub fn unframe(stream: &[u8], secret: Option<&Secret>) -> Result<HiddenMessage, StegoError> {
    let end = find_marker(stream).ok_or(StegoError::MarkerNotFound)?;
    let body = &stream[..end];

    let Some(sealed) = body.strip_prefix(ENCRYPTED_TAG) else {
        return Ok(HiddenMessage::Plain(body.to_vec()));
    };

    match secret {
        Some(secret) => {
            let envelope = std::str::from_utf8(sealed)
                .map_err(|_| crypto::CipherError::InvalidUtf8)?;
            let plaintext = crypto::decrypt(secret, envelope)?;
            Ok(HiddenMessage::Decrypted(plaintext))
        }
        None => Ok(HiddenMessage::Sealed(body.to_vec())),
    }
}

/// Bit `index` of `data`, most significant bit of each byte first.
pub fn bit_at(data: &[u8], index: usize) -> u8 {
    (data[index / 8] >> (7 - index % 8)) & 1
}

/// Packs a bit sequence back into bytes; a trailing partial byte is dropped.
pub fn pack_bits<I: IntoIterator<Item = u8>>(bits: I) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut current = 0u8;
    let mut filled = 0;

    for bit in bits {
        current = (current << 1) | (bit & 1);
        filled += 1;
        if filled == 8 {
            bytes.push(current);
            current = 0;
            filled = 0;
        }
    }

    bytes
}

fn find_marker(stream: &[u8]) -> Option<usize> {
    stream
        .windows(END_MARKER.len())
        .position(|window| window == END_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_order_is_msb_first() {
        let data = [0b1000_0001u8, 0b0100_0000];
        let bits: Vec<u8> = (0..16).map(|i| bit_at(&data, i)).collect();
        assert_eq!(bits, vec![1, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_pack_bits_drops_partial_byte() {
        let bits = vec![0, 1, 0, 0, 0, 0, 0, 1, 1, 1, 1];
        assert_eq!(pack_bits(bits), b"A");
    }

    #[test]
    fn test_plain_frame() {
        let framed = frame(b"secret", None);
        assert_eq!(framed, b"secret<<<END>>>");
    }

    #[test]
    fn test_encrypted_frame_is_tagged() {
        let secret = Secret::from_fragments("k1", "k2", "k3");
        let framed = frame(b"secret", Some(&secret));
        assert!(framed.starts_with(ENCRYPTED_TAG));
        assert!(framed.ends_with(END_MARKER));
        assert!(!framed.windows(6).any(|w| w == b"secret"));
    }

    #[test]
    fn test_unframe_plain() {
        let mut stream = frame(b"hello", None);
        stream.extend_from_slice(b"trailing noise");
        let message = unframe(&stream, None).unwrap();
        assert_eq!(message, HiddenMessage::Plain(b"hello".to_vec()));
    }

    #[test]
    fn test_unframe_decrypts_with_secret() {
        let secret = Secret::from_fragments("k1", "k2", "k3");
        let stream = frame(b"hello", Some(&secret));
        let message = unframe(&stream, Some(&secret)).unwrap();
        assert_eq!(message, HiddenMessage::Decrypted(b"hello".to_vec()));
    }

    #[test]
    fn test_unframe_sealed_without_secret() {
        let secret = Secret::from_fragments("k1", "k2", "k3");
        let stream = frame(b"hello", Some(&secret));
        let message = unframe(&stream, None).unwrap();
        assert!(message.is_sealed());
        assert!(message.as_bytes().starts_with(ENCRYPTED_TAG));
    }

    #[test]
    fn test_plain_payload_ignores_secret() {
        let secret = Secret::from_fragments("k1", "k2", "k3");
        let stream = frame(b"not encrypted", None);
        let message = unframe(&stream, Some(&secret)).unwrap();
        assert_eq!(message, HiddenMessage::Plain(b"not encrypted".to_vec()));
    }

    #[test]
    fn test_missing_marker() {
        let result = unframe(b"no marker here", None);
        assert!(matches!(result, Err(StegoError::MarkerNotFound)));
    }

    #[test]
    fn test_marker_inside_payload_truncates_early() {
        let stream = frame(b"before<<<END>>>after", None);
        let message = unframe(&stream, None).unwrap();
        assert_eq!(message.as_bytes(), b"before");
    }
}
