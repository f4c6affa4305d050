//! Encrypted multi-client relay over TCP.
//!
//! A relay hosts one room. Clients join with a plaintext
//! `USERNAME:<name>` handshake; every later frame is an envelope sealed with
//! the room secret. The server decrypts each frame and either fans it out to
//! the other members or delivers it to a named member (`@bob hello`).
//!
//! # Example
//!
//! ```no_run
//! use ghostwire::crypto::Secret;
//! use ghostwire::relay::{RelayConfig, RelayServer};
//!
//! # async fn example() -> Result<(), ghostwire::relay::RelayError> {
//! let secret = Secret::from_fragments("k1", "k2", "k3");
//! let server = RelayServer::bind(RelayConfig::default(), secret).await?;
//! let handle = server.handle();
//! tokio::spawn(async move { tokio::signal::ctrl_c().await.ok(); handle.shutdown() });
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod commands;
pub mod config;
mod error;
pub mod protocol;
pub mod room;
pub mod server;
pub mod transport;

pub use client::{request_roster, send_once, RelayClient};
pub use commands::CommandRegistry;
pub use config::{HandshakePolicy, RelayConfig, DEFAULT_PORT};
pub use error::RelayError;
pub use server::{RelayHandle, RelayServer};
