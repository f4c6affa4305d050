//! Cryptographic primitive shared by the relay and the image channel.
//!
//! This module provides:
//! - Room secret derivation from three key fragments
//! - AES-128-CBC envelope encryption (PKCS#7 padding, random IV per message)

pub mod envelope;
pub mod secret;

pub use envelope::{decrypt, decrypt_text, encrypt, CipherError, Envelope, BLOCK_SIZE};
pub use secret::{Secret, KEY_SIZE};
