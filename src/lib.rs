//! # Ghostwire - encrypted rooms and hidden messages
//!
//! Ghostwire gives a group that shares three key fragments two covert
//! channels keyed by the same secret:
//!
//! - a **relay**: a TCP room where every frame is AES-128-CBC encrypted,
//!   with broadcast and `@user` private delivery;
//! - an **image channel**: LSB steganography that hides an (optionally
//!   encrypted) message in the pixels of a lossless image.
//!
//! ## Example Usage
//!
//! ```rust
//! use ghostwire::crypto::{self, Secret};
//! use ghostwire::stego::{HiddenMessage, ImageStego};
//! use image::{DynamicImage, RgbImage};
//!
//! let secret = Secret::from_fragments("k1", "k2", "k3");
//!
//! // Envelope round-trip
//! let envelope = crypto::encrypt(&secret, b"hi").to_string();
//! assert_eq!(crypto::decrypt(&secret, &envelope).unwrap(), b"hi");
//!
//! // Hide and recover a message
//! let cover = ImageStego::from_image(DynamicImage::ImageRgb8(RgbImage::new(64, 64)));
//! let hidden = ImageStego::from_image(cover.embed(b"meet at noon", Some(&secret)).unwrap());
//! let message = hidden.extract(Some(&secret)).unwrap();
//! assert_eq!(message, HiddenMessage::Decrypted(b"meet at noon".to_vec()));
//! ```
//!
//! ## Modules
//!
//! - [`crypto`]: shared secret and the `"<iv> <ciphertext>"` envelope
//! - [`relay`]: relay server, client and wire framing
//! - [`stego`]: LSB image codec
//! - [`store`]: roster and profile files

pub mod crypto;
pub mod relay;
pub mod stego;
pub mod store;

// Re-export commonly used types at the crate root
pub use crypto::{decrypt, encrypt, CipherError, Envelope, Secret};
pub use relay::{RelayClient, RelayConfig, RelayError, RelayHandle, RelayServer};
pub use stego::{HiddenMessage, ImageStego, StegoError};
pub use store::{Profile, RosterStore, StoreError};
