//! Sync-pipe frame codec.
//!
//! Every frame starts with a four byte header: one byte message type and
//! a 24 bit big-endian payload length. Text payloads are NUL-terminated.
//! An `Err` frame carries two nested frames (primary and secondary text)
//! as its payload.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use super::{MessageType, PipeMessage};
use crate::error::{DecodeError, DumpcapError};

/// Size of a frame header in bytes
pub const HEADER_LEN: usize = 4;

/// Largest payload a 24 bit length can describe
pub const MAX_PAYLOAD_LEN: usize = 0x00FF_FFFF;

/// Read one raw frame, returning its type code and untouched payload.
///
/// An input that is exhausted before the first header byte yields
/// `DecodeError::EndOfStream`; running out anywhere later is a truncation.
pub async fn read_frame<R>(input: &mut R) -> Result<(u8, Vec<u8>), DecodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    if input.read(&mut header[..1]).await? == 0 {
        return Err(DecodeError::EndOfStream);
    }
    read_exact_or_truncated(input, &mut header[1..], "header").await?;

    let code = header[0];
    let len = u32::from_be_bytes([0, header[1], header[2], header[3]]) as usize;
    if len == 0 {
        return Ok((code, Vec::new()));
    }

    let mut payload = vec![0u8; len];
    read_exact_or_truncated(input, &mut payload, "payload").await?;
    Ok((code, payload))
}

async fn read_exact_or_truncated<R>(
    input: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), DecodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match input.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(DecodeError::Truncated { what })
        }
        Err(e) => Err(DecodeError::Io(e)),
    }
}

fn payload_text(payload: &[u8]) -> String {
    let text = match payload.split_last() {
        Some((&0, rest)) => rest,
        _ => payload,
    };
    String::from_utf8_lossy(text).into_owned()
}

/// Decode the primary and secondary text nested in an `Err` payload.
async fn read_error_text(payload: &[u8]) -> Result<String, DecodeError> {
    let mut nested = payload;
    let mut text = String::new();
    for _ in 0..2 {
        let (_, part) = read_frame(&mut nested)
            .await
            .map_err(|e| DecodeError::MalformedError(Box::new(e)))?;
        text.push_str(&payload_text(&part));
    }
    Ok(text)
}

fn parse_count(kind: MessageType, text: &str) -> Result<u64, DecodeError> {
    text.parse::<u64>().map_err(|source| DecodeError::InvalidCount {
        kind,
        text: text.to_string(),
        source,
    })
}

/// Read and fully decode one message.
pub async fn read_message<R>(input: &mut R) -> Result<PipeMessage, DecodeError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let (code, payload) = read_frame(input).await?;
    let kind = MessageType::from_u8(code);

    let msg = match kind {
        MessageType::Err => PipeMessage::text(kind, read_error_text(&payload).await?),
        MessageType::PacketCount => {
            let text = payload_text(&payload);
            let count = parse_count(kind, &text)?;
            PipeMessage {
                packet_count: count,
                ..PipeMessage::text(kind, text)
            }
        }
        MessageType::DropCount => {
            let text = payload_text(&payload);
            let count = parse_count(kind, &text)?;
            PipeMessage {
                drop_count: count,
                ..PipeMessage::text(kind, text)
            }
        }
        _ => PipeMessage::text(kind, payload_text(&payload)),
    };

    trace!(kind = %msg.kind, len = payload.len(), "decoded sync-pipe message");
    Ok(msg)
}

/// Block until one message is read and succeed only if it is `Success`.
pub async fn wait_for_success<R>(input: &mut R) -> Result<(), DumpcapError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let msg = read_message(input).await?;
    if msg.kind != MessageType::Success {
        return Err(DumpcapError::UnexpectedMessage {
            kind: msg.kind,
            text: msg.text,
        });
    }
    Ok(())
}

/// Frame a raw payload.
pub fn encode_frame(code: u8, payload: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(DecodeError::FrameTooLarge(payload.len()));
    }
    let len = (payload.len() as u32).to_be_bytes();

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(code);
    frame.extend_from_slice(&len[1..]);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Frame a NUL-terminated text payload.
pub fn encode_text(kind: MessageType, text: &str) -> Result<Vec<u8>, DecodeError> {
    let mut payload = Vec::with_capacity(text.len() + 1);
    payload.extend_from_slice(text.as_bytes());
    payload.push(0);
    encode_frame(kind.as_u8(), &payload)
}

/// Frame an `Err` message from its primary and secondary text.
pub fn encode_error(primary: &str, secondary: &str) -> Result<Vec<u8>, DecodeError> {
    let mut payload = encode_text(MessageType::Err, primary)?;
    payload.extend(encode_text(MessageType::Err, secondary)?);
    encode_frame(MessageType::ERR, &payload)
}

impl PipeMessage {
    /// Encode this message the way dumpcap would send it.
    ///
    /// An `Err` message is sent with its text as the primary part and an
    /// empty secondary part.
    pub fn to_frame(&self) -> Result<Vec<u8>, DecodeError> {
        match self.kind {
            MessageType::Err => encode_error(&self.text, ""),
            MessageType::PacketCount => encode_text(self.kind, &self.packet_count.to_string()),
            MessageType::DropCount => encode_text(self.kind, &self.drop_count.to_string()),
            _ => encode_text(self.kind, &self.text),
        }
    }
}
