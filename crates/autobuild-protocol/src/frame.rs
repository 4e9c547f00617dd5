use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are rejected before allocation, so a corrupt or
/// hostile length prefix cannot trigger an unbounded allocation.
const MAX_FRAME_LEN: u32 = 256 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame length {0} exceeds the maximum of {MAX_FRAME_LEN}")]
    TooLarge(u32),

    #[error("i/o error reading or writing a frame: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode frame payload: {0}")]
    Encode(#[source] bincode::Error),

    #[error("failed to decode frame payload: {0}")]
    Decode(#[source] bincode::Error),
}

/// Write `value` as one length-prefixed `bincode` frame: a big-endian `u32`
/// byte length followed by the encoded payload.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(value).map_err(FrameError::Encode)?;
    let len: u32 = payload
        .len()
        .try_into()
        .map_err(|_| FrameError::TooLarge(u32::MAX))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed `bincode` frame. Returns `Ok(None)` on a clean
/// EOF before any bytes of the next frame arrive.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(FrameError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    bincode::deserialize(&payload)
        .map(Some)
        .map_err(FrameError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &("hello".to_string(), 42u32))
            .await
            .unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let decoded: Option<(String, u32)> = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, Some(("hello".to_string(), 42)));
    }

    #[tokio::test]
    async fn empty_stream_yields_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let decoded: Option<String> = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, None);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_LEN + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let result: Result<Option<String>, _> = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(FrameError::TooLarge(_))));
    }
}
