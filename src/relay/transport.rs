//! Length-prefixed framing over TCP.
//!
//! Every frame is `[u32 LE length] ++ [bytes]`, so a message is never split
//! or merged across reads no matter how the stream is segmented.

use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use super::error::RelayError;

/// Writes one length-prefixed frame and flushes.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), RelayError> {
    let len = u32::try_from(data.len()).map_err(|_| RelayError::FrameTooLarge {
        len: data.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame.
///
/// Returns `Ok(None)` when the peer closed the stream between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<Vec<u8>>, RelayError> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > max_len {
        return Err(RelayError::FrameTooLarge { len, max: max_len });
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await?;
    Ok(Some(data))
}

/// Read side of a framed connection.
#[derive(Debug)]
pub struct FrameReader {
    reader: BufReader<OwnedReadHalf>,
    max_frame_len: usize,
}

impl FrameReader {
    /// Reads the next frame, `None` on clean end of stream.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, RelayError> {
        read_frame(&mut self.reader, self.max_frame_len).await
    }
}

/// Write side of a framed connection.
#[derive(Debug)]
pub struct FrameWriter {
    writer: BufWriter<OwnedWriteHalf>,
}

impl FrameWriter {
    /// Sends one frame.
    pub async fn write_frame(&mut self, data: &[u8]) -> Result<(), RelayError> {
        write_frame(&mut self.writer, data).await
    }

    /// Flushes and half-closes the stream. Safe to call more than once.
    pub async fn shutdown(&mut self) -> Result<(), RelayError> {
        self.writer.flush().await?;
        match self.writer.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A framed TCP connection.
#[derive(Debug)]
pub struct Connection {
    reader: FrameReader,
    writer: FrameWriter,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Wraps an accepted or connected stream.
    pub fn new(stream: TcpStream, max_frame_len: usize) -> Result<Self, RelayError> {
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: FrameReader {
                reader: BufReader::new(read_half),
                max_frame_len,
            },
            writer: FrameWriter {
                writer: BufWriter::new(write_half),
            },
            peer_addr,
        })
    }

    /// Connects to a remote relay.
    pub async fn connect<A: ToSocketAddrs>(addr: A, max_frame_len: usize) -> Result<Self, RelayError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to connect: {}", e)))?;
        Self::new(stream, max_frame_len)
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Reads the next frame.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, RelayError> {
        self.reader.read_frame().await
    }

    /// Sends one frame.
    pub async fn write_frame(&mut self, data: &[u8]) -> Result<(), RelayError> {
        self.writer.write_frame(data).await
    }

    /// Splits into independently owned read and write sides.
    pub fn split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}
