//! Length-prefixed CBOR framing for handshake messages.
//!
//! Wire format: `[4-byte big-endian length][CBOR payload]`

use crate::error::{GateError, GateResult};
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Encode a serializable value into a length-prefixed CBOR frame.
pub fn frame_encode<T: serde::Serialize>(value: &T) -> GateResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(value, &mut payload)?;

    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend(payload);
    Ok(frame)
}

/// Decode a CBOR payload (without length prefix) into a typed value.
pub fn cbor_decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> GateResult<T> {
    let cursor = Cursor::new(data);
    let value: T = ciborium::from_reader(cursor)?;
    Ok(value)
}

/// Write one frame and flush.
pub async fn write_frame<W, T>(io: &mut W, value: &T) -> GateResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: serde::Serialize,
{
    let frame = frame_encode(value)?;
    io.write_all(&frame).await?;
    io.flush().await?;
    Ok(())
}

/// Read one frame, refusing payloads longer than `max_len`.
pub async fn read_frame<R, T>(io: &mut R, max_len: usize) -> GateResult<T>
where
    R: AsyncRead + Unpin + ?Sized,
    T: serde::de::DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    io.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(GateError::Codec(format!(
            "frame too large: {len} bytes (max {max_len})"
        )));
    }

    let mut payload = vec![0u8; len];
    io.read_exact(&mut payload).await?;
    cbor_decode(&payload)
}
