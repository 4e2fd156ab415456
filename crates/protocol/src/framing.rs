//! Length-prefixed JSON framing for a plain duplex pipe (a worker's
//! stdin/stdout, or any `AsyncRead + AsyncWrite` pair).

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Framed messages larger than this are rejected rather than allocated,
/// guarding against a malformed length prefix from a misbehaving worker.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

pub async fn write_frame<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    message: &T,
) -> std::io::Result<()> {
    let body = serde_json::to_vec(message)?;
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

/// Reads one frame, or `Ok(None)` on a clean EOF before any bytes of
/// the next length prefix arrive.
pub async fn read_frame<R: AsyncRead + Unpin, T: DeserializeOwned>(
    reader: &mut R,
) -> std::io::Result<Option<T>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {MAX_FRAME_BYTES}"),
        ));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let value = serde_json::from_slice(&body)?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ParentMessage, WorkerMessage};

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let mut buf: Vec<u8> = Vec::new();
        write_frame(&mut buf, &ParentMessage::Stop).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let msg: ParentMessage = read_frame(&mut cursor).await.unwrap().unwrap();
        assert!(matches!(msg, ParentMessage::Stop));
    }

    #[tokio::test]
    async fn read_on_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let msg: Option<WorkerMessage> = read_frame(&mut cursor).await.unwrap();
        assert!(msg.is_none());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let result: std::io::Result<Option<WorkerMessage>> = read_frame(&mut cursor).await;
        assert!(result.is_err());
    }
}
