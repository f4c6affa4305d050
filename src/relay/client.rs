//! Relay client: interactive sessions, one-shot sends and roster requests.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::crypto::{self, CipherError, Secret};

use super::commands::CommandRegistry;
use super::config::RelayConfig;
use super::error::RelayError;
use super::protocol;
use super::transport::{Connection, FrameReader, FrameWriter};

/// A joined relay session.
pub struct RelayClient {
    reader: FrameReader,
    writer: FrameWriter,
    secret: Secret,
    config: RelayConfig,
    username: String,
}

impl RelayClient {
    /// Connects to `config.address()` and sends the handshake.
    pub async fn connect(
        config: &RelayConfig,
        secret: Secret,
        username: &str,
    ) -> Result<Self, RelayError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RelayError::Protocol("username must not be empty".to_string()));
        }
        if config.is_roster_sentinel(username) {
            return Err(RelayError::Protocol(format!(
                "'{}' is reserved for roster requests",
                username
            )));
        }

        let mut connection = Connection::connect(config.address(), config.max_frame_len).await?;
        connection
            .write_frame(&protocol::handshake_frame(username))
            .await?;
        info!("Connected to {} as {}", connection.peer_addr(), username);

        let (reader, writer) = connection.split();
        Ok(Self {
            reader,
            writer,
            secret,
            config: config.clone(),
            username: username.to_string(),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Sends `text` to the room.
    pub async fn send(&mut self, text: &str) -> Result<(), RelayError> {
        let envelope = crypto::encrypt(&self.secret, text.as_bytes()).to_string();
        self.writer.write_frame(envelope.as_bytes()).await
    }

    /// Sends `body` to every session named `target`.
    pub async fn send_to(&mut self, target: &str, body: &str) -> Result<(), RelayError> {
        self.send(&protocol::directed(target, body)).await
    }

    /// Next decrypted message, `None` once the server closes the stream.
    pub async fn recv(&mut self) -> Result<Option<String>, RelayError> {
        match self.reader.read_frame().await? {
            Some(frame) => Ok(Some(open(&self.secret, &frame)?)),
            None => Ok(None),
        }
    }

    /// Waits for the server's answer to a directed message, skipping other traffic.
    pub async fn recv_ack(&mut self) -> Result<String, RelayError> {
        let ack_timeout = self.config.ack_timeout();
        tokio::time::timeout(ack_timeout, async {
            loop {
                match self.recv().await {
                    Ok(Some(text)) if protocol::is_directed_ack(&text) => return Ok(text),
                    Ok(Some(text)) => debug!("Skipping while waiting for ack: {}", text),
                    Ok(None) => return Err(RelayError::Closed),
                    Err(RelayError::Decrypt(e)) => warn!("Undecryptable frame: {}", e),
                    Err(e) => return Err(e),
                }
            }
        })
        .await
        .map_err(|_| RelayError::Timeout("acknowledgment"))?
    }

    /// Half-closes the connection.
    pub async fn close(mut self) -> Result<(), RelayError> {
        self.writer.shutdown().await
    }

    /// Runs an interactive session.
    ///
    /// Inbound messages are written to `output` one per line while lines from
    /// `input` are sent to the room. Blank lines are skipped; the exit keyword
    /// or end of input ends the session, and so does the server closing the
    /// connection. Slash commands from [`CommandRegistry`] run locally and
    /// their results go to `output`; they never reach the room.
    pub async fn run_interactive<I, O>(self, input: I, output: O) -> Result<(), RelayError>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin + Send + 'static,
    {
        let Self {
            mut reader,
            mut writer,
            secret,
            config,
            username,
        } = self;

        let output = Arc::new(Mutex::new(output));
        let registry = Arc::new(CommandRegistry::new());

        let receive_secret = secret.clone();
        let receive_output = Arc::clone(&output);
        let mut receiver = tokio::spawn(async move {
            loop {
                let frame = match reader.read_frame().await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Receive loop ended: {}", e);
                        break;
                    }
                };

                let line = match open(&receive_secret, &frame) {
                    Ok(text) => text,
                    Err(e) => format!("[ERROR] Failed to decrypt message: {}", e),
                };
                if write_lines(&receive_output, &[line]).await.is_err() {
                    break;
                }
            }
        });

        let mut receiver_done = false;
        let mut lines = input.lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = &mut receiver => {
                    receiver_done = true;
                    info!("Connection closed by server");
                    break;
                }
            };

            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            if config.is_exit_keyword(&line) {
                break;
            }
            if registry.is_local(&line) {
                let registry = Arc::clone(&registry);
                let room_secret = secret.clone();
                let lines = tokio::task::spawn_blocking(move || {
                    registry.execute(&line, &room_secret).unwrap_or_default()
                })
                .await
                .unwrap_or_else(|e| vec![format!("Error: command failed: {}", e)]);
                let _ = write_lines(&output, &lines).await;
                continue;
            }

            let envelope = crypto::encrypt(&secret, line.as_bytes()).to_string();
            if let Err(e) = writer.write_frame(envelope.as_bytes()).await {
                warn!("Connection lost: {}", e);
                break;
            }
        }

        info!("{} leaving", username);
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown after session end: {}", e);
        }

        if !receiver_done
            && tokio::time::timeout(config.ack_timeout(), &mut receiver)
                .await
                .is_err()
        {
            receiver.abort();
        }

        Ok(())
    }
}

/// Connects, sends one message and disconnects.
///
/// With a `target` the message is directed and the server's acknowledgment
/// is returned.
pub async fn send_once(
    config: &RelayConfig,
    secret: Secret,
    username: &str,
    message: &str,
    target: Option<&str>,
) -> Result<Option<String>, RelayError> {
    let mut client = RelayClient::connect(config, secret, username).await?;

    let ack = match target {
        Some(target) => {
            client.send_to(target, message).await?;
            Some(client.recv_ack().await?)
        }
        None => {
            client.send(message).await?;
            None
        }
    };

    client.close().await?;
    Ok(ack)
}

/// Asks the relay for its roster line.
pub async fn request_roster(config: &RelayConfig, secret: &Secret) -> Result<String, RelayError> {
    let mut connection = Connection::connect(config.address(), config.max_frame_len).await?;
    connection
        .write_frame(&protocol::handshake_frame(config.roster_sentinel()))
        .await?;

    let frame = tokio::time::timeout(config.ack_timeout(), connection.read_frame())
        .await
        .map_err(|_| RelayError::Timeout("roster reply"))??
        .ok_or(RelayError::Closed)?;

    Ok(open(secret, &frame)?)
}

async fn write_lines<O>(output: &Mutex<O>, lines: &[String]) -> std::io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    let mut output = output.lock().await;
    for line in lines {
        output.write_all(format!("{}\n", line).as_bytes()).await?;
    }
    output.flush().await
}

fn open(secret: &Secret, frame: &[u8]) -> Result<String, CipherError> {
    let envelope = std::str::from_utf8(frame).map_err(|_| CipherError::InvalidUtf8)?;
    crypto::decrypt_text(secret, envelope)
}
