//! Frame codec.
//!
//! Every message on the wire is one frame: a 4-byte big-endian length
//! followed by that many bytes of bincode. The length is capped so a
//! corrupt or hostile peer cannot make us allocate arbitrarily.

use bytes::{BufMut, BytesMut};
use corelib::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame body.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encode `value` and write it as one frame.
pub async fn write_frame<T, W>(io: &mut W, value: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let body = bincode::serialize(value).map_err(|e| Error::Protocol(e.to_string()))?;
    if body.len() > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!(
            "frame of {} bytes exceeds the {} byte cap",
            body.len(),
            MAX_FRAME_LEN
        )));
    }
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.put_slice(&body);
    io.write_all(&buf).await?;
    io.flush().await?;
    Ok(())
}

/// Read one frame and decode it.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary,
/// which is how a peer hangs up between requests.
pub async fn read_frame<T, R>(io: &mut R) -> Result<Option<T>>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match io.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::Protocol(format!(
            "peer announced a {} byte frame, cap is {}",
            len, MAX_FRAME_LEN
        )));
    }
    let mut body = vec![0u8; len];
    io.read_exact(&mut body).await?;
    let value = bincode::deserialize(&body).map_err(|e| Error::Protocol(e.to_string()))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Ping {
        Hello(String),
        Count(u64),
    }

    #[tokio::test]
    async fn roundtrips_values_through_a_buffer() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Ping::Hello("there".into()))
            .await
            .unwrap();
        write_frame(&mut buf, &Ping::Count(42)).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let first: Option<Ping> = read_frame(&mut cursor).await.unwrap();
        let second: Option<Ping> = read_frame(&mut cursor).await.unwrap();
        let end: Option<Ping> = read_frame(&mut cursor).await.unwrap();
        assert_eq!(first, Some(Ping::Hello("there".into())));
        assert_eq!(second, Some(Ping::Count(42)));
        assert_eq!(end, None, "clean EOF at a frame boundary is not an error");
    }

    #[tokio::test]
    async fn rejects_oversized_length_header() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN as u32 + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let result: Result<Option<Ping>> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn truncated_body_is_a_transport_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf.extend_from_slice(&[1, 2, 3]);
        let mut cursor = std::io::Cursor::new(buf);
        let result: Result<Option<Ping>> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
