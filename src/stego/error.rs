//! Steganography error types.

use thiserror::Error;

use crate::crypto::CipherError;

/// Errors that can occur during image steganography.
#[derive(Error, Debug)]
pub enum StegoError {
    /// The framed payload does not fit in the image.
    #[error("Image too small to hide data: need {needed} bytes, have capacity for {capacity}")]
    Capacity {
        /// Bytes required including the tag and end marker.
        needed: usize,
        /// Bytes the image can hold.
        capacity: usize,
    },

    /// No end marker in the recovered bits: nothing hidden, or corrupted.
    #[error("No hidden message found or message corrupted")]
    MarkerNotFound,

    /// The payload carried the encrypted tag but did not decrypt.
    #[error("Hidden message could not be decrypted: {0}")]
    Decrypt(#[from] CipherError),

    #[error("Image load error: {0}")]
    ImageLoad(String),

    #[error("Image save error: {0}")]
    ImageSave(String),

    /// The output format would recompress the pixels and destroy the payload.
    #[error("Refusing to write lossy format {0}; use PNG, BMP, TIFF, TGA or PNM")]
    LossyFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
