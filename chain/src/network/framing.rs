//! Length-prefixed message framing.
//!
//! Each message is a 4-byte big-endian length followed by exactly that many
//! payload bytes. Readers keep reading until the payload is complete; a
//! stream that ends early yields [`FrameError::UnexpectedEof`] instead of
//! blocking forever.
//!
//! The payload buffer grows with the bytes actually received, never with the
//! declared length alone.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const PREFIX_LEN: usize = 4;

/// Largest payload a prefix can describe.
pub const MAX_FRAME_LEN: usize = u32::MAX as usize;

/// Upper bound on the buffer reserved before any payload byte arrives.
const INITIAL_CAPACITY: usize = 64 * 1024;

/// Transport-level framing failure.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream closed before the prefix or payload was complete.
    #[error("connection closed after {received} of {expected} bytes")]
    UnexpectedEof { expected: usize, received: usize },
    /// The supplied payload does not fit a `u32` length prefix.
    #[error("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge { len: usize },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reads one framed message.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; PREFIX_LEN];
    read_full(reader, &mut prefix).await?;

    let len = u32::from_be_bytes(prefix);
    let expected = len as usize;

    let mut payload = Vec::with_capacity(expected.min(INITIAL_CAPACITY));
    (&mut *reader)
        .take(u64::from(len))
        .read_to_end(&mut payload)
        .await?;
    if payload.len() < expected {
        return Err(FrameError::UnexpectedEof {
            expected,
            received: payload.len(),
        });
    }
    Ok(payload)
}

/// Writes one framed message and flushes it.
///
/// Prefix and payload are written as one buffer.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge { len: payload.len() });
    }
    // Bounded by MAX_FRAME_LEN above.
    let len = payload.len() as u32;

    let mut buf = Vec::with_capacity(PREFIX_LEN + payload.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);

    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(FrameError::UnexpectedEof {
                expected: buf.len(),
                received: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn frame_roundtrip() {
        let (mut a, mut b) = duplex(1024);
        write_frame(&mut a, b"hello").await.unwrap();
        write_frame(&mut a, b"").await.unwrap();

        assert_eq!(read_frame(&mut b).await.unwrap(), b"hello");
        assert_eq!(read_frame(&mut b).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn prefix_is_big_endian() {
        let (mut a, mut b) = duplex(1024);
        write_frame(&mut a, &[9u8; 258]).await.unwrap();

        let mut prefix = [0u8; 4];
        b.read_exact(&mut prefix).await.unwrap();
        assert_eq!(prefix, [0, 0, 1, 2]);
    }

    #[tokio::test]
    async fn payload_larger_than_pipe_buffer_is_reassembled() {
        let (mut a, mut b) = duplex(16);
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        let expected = payload.clone();

        let writer = tokio::spawn(async move { write_frame(&mut a, &payload).await });
        let got = read_frame(&mut b).await.unwrap();
        writer.await.unwrap().unwrap();

        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn close_after_prefix_is_unexpected_eof() {
        let (mut a, mut b) = duplex(1024);
        a.write_all(&10u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        let result = tokio::time::timeout(Duration::from_secs(1), read_frame(&mut b))
            .await
            .expect("reader must not hang");
        match result {
            Err(FrameError::UnexpectedEof { expected, received }) => {
                assert_eq!(expected, 10);
                assert_eq!(received, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_inside_prefix_is_unexpected_eof() {
        let (mut a, mut b) = duplex(1024);
        a.write_all(&[0, 0]).await.unwrap();
        drop(a);

        assert!(matches!(
            read_frame(&mut b).await,
            Err(FrameError::UnexpectedEof {
                expected: 4,
                received: 2
            })
        ));
    }

    #[tokio::test]
    async fn huge_prefix_without_payload_is_unexpected_eof() {
        let (mut a, mut b) = duplex(1024);
        a.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        a.write_all(b"xy").await.unwrap();
        drop(a);

        match read_frame(&mut b).await {
            Err(FrameError::UnexpectedEof { expected, received }) => {
                assert_eq!(expected, u32::MAX as usize);
                assert_eq!(received, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn frame_above_64_mib_roundtrips() {
        let (mut a, mut b) = duplex(1 << 20);
        let payload = vec![7u8; 65 * 1024 * 1024];
        let len = payload.len();

        let writer = tokio::spawn(async move { write_frame(&mut a, &payload).await });
        let got = read_frame(&mut b).await.unwrap();
        writer.await.unwrap().unwrap();

        assert_eq!(got.len(), len);
        assert!(got.iter().all(|&byte| byte == 7));
    }

    #[tokio::test]
    async fn frame_does_not_consume_the_next_one() {
        let (mut a, mut b) = duplex(1024);
        write_frame(&mut a, b"first").await.unwrap();
        write_frame(&mut a, b"second").await.unwrap();
        drop(a);

        assert_eq!(read_frame(&mut b).await.unwrap(), b"first");
        assert_eq!(read_frame(&mut b).await.unwrap(), b"second");
        assert!(matches!(
            read_frame(&mut b).await,
            Err(FrameError::UnexpectedEof { expected: 4, received: 0 })
        ));
    }
}
