//! Steganography module for hiding messages in images.
//!
//! Supports LSB embedding in lossless raster images (PNG, BMP, TIFF, TGA,
//! PNM), with optional encryption through the room secret.

mod error;
pub mod image;
pub mod payload;

pub use error::StegoError;
pub use image::{save_lossless, ImageStego};
pub use payload::{HiddenMessage, ENCRYPTED_TAG, END_MARKER};
