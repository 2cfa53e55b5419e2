//! Wire format for the rendezvous services.
//!
//! Every frame is a 4-byte little-endian length followed by a JSON body
//! with a `type` tag. A client sends one `register` frame and reads one
//! reply: `release` from the barrier, `ack` from the completion signal,
//! or `rejected`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::participant::{EpochMillis, ParticipantId};

/// Frames above this size are refused before allocation.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the server turned a registration away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// This id already registered with this instance.
    Duplicate,
    /// Id is not in `1..=expected`.
    OutOfRange { expected: u32 },
    /// All expected participants are already present.
    Full,
    /// First frame was not a registration.
    UnexpectedMessage,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate => write!(f, "participant already registered"),
            Self::OutOfRange { expected } => {
                write!(f, "participant id outside 1..={}", expected)
            }
            Self::Full => write!(f, "all participants already registered"),
            Self::UnexpectedMessage => write!(f, "expected a register message"),
        }
    }
}

/// All rendezvous message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RendezvousMessage {
    #[serde(rename = "register")]
    Register {
        participant: ParticipantId,
        timestamp_ms: EpochMillis,
    },

    #[serde(rename = "release")]
    Release,

    #[serde(rename = "ack")]
    Ack,

    #[serde(rename = "rejected")]
    Rejected { reason: RejectReason },
}

/// Encode a message to its JSON body.
pub fn encode_message(message: &RendezvousMessage) -> Result<Vec<u8>, ProtocolError> {
    let bytes = serde_json::to_vec(message)?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(bytes)
}

/// Decode a JSON body.
pub fn decode_message(bytes: &[u8]) -> Result<RendezvousMessage, ProtocolError> {
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed frame.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed frame and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = u32::try_from(data.len())
        .map_err(|_| ProtocolError::InvalidFormat("frame length overflows u32".into()))?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn send_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &RendezvousMessage,
) -> Result<(), ProtocolError> {
    let bytes = encode_message(message)?;
    write_frame(writer, &bytes).await
}

pub async fn recv_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<RendezvousMessage, ProtocolError> {
    let bytes = read_frame(reader).await?;
    decode_message(&bytes)
}
