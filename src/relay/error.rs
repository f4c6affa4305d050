//! Relay error types.

use thiserror::Error;

use crate::crypto::CipherError;
use crate::store::StoreError;

/// Errors that can occur on the relay server or client.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed handshake or frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A frame could not be decrypted with the room secret.
    #[error("Decryption failed: {0}")]
    Decrypt(#[from] CipherError),

    /// Connect, bind or accept failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Declared frame length over the configured limit.
    #[error("Frame too large: {len} bytes (max: {max})")]
    FrameTooLarge {
        /// Length announced by the peer.
        len: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The peer did not answer in time.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The peer closed the connection.
    #[error("Connection closed by peer")]
    Closed,

    /// Roster persistence failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
