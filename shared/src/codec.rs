//! Length-prefixed JSON framing.
//!
//! A frame is a 4-byte big-endian payload length followed by that many bytes
//! of UTF-8 JSON. Readers loop until the whole payload has arrived, so a
//! frame split across TCP segments decodes the same as one delivered whole.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const LENGTH_PREFIX_LEN: usize = 4;

/// Upper bound on a payload unless the caller configures another.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    /// The stream ended before a full frame arrived.
    #[error("connection closed")]
    Closed,
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serializes `message` into a complete frame, prefix included.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    let payload = serde_json::to_vec(message)?;
    let len = u32::try_from(payload.len()).map_err(|_| CodecError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Parses a payload (without its prefix).
pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    Ok(serde_json::from_slice(payload)?)
}

/// Reads one frame and returns its payload.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    read_exact_or_closed(reader, &mut prefix).await?;

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(CodecError::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    read_exact_or_closed(reader, &mut payload).await?;
    Ok(payload)
}

/// Reads one frame and parses it as `T`.
pub async fn read_message<R, T>(reader: &mut R, max_len: usize) -> Result<T, CodecError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let payload = read_frame(reader, max_len).await?;
    decode(&payload)
}

/// Encodes `message` and writes the whole frame.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), CodecError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(CodecError::Closed),
        Err(e) => Err(CodecError::Io(e)),
    }
}
