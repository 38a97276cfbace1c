use anyhow::Result;
use tokio::io::AsyncRead;
use tokio_stream::StreamExt;
use tokio_util::bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, FramedRead};

/// Which child stream a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Decodes whatever bytes are available into text, holding back an
/// incomplete trailing UTF-8 sequence until the rest of it arrives
struct Utf8Codec;

impl Decoder for Utf8Codec {
    type Item = String;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        match std::str::from_utf8(src) {
            Ok(s) => {
                let out = s.to_owned();
                src.clear();
                Ok(Some(out))
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                if valid == 0 {
                    return Ok(None);
                }

                let out = std::str::from_utf8(&src[..valid])?.to_owned();
                src.advance(valid);
                Ok(Some(out))
            }
            Err(e) => {
                // Invalid bytes mid-stream: keep the stream flowing with replacement characters
                let end = e.valid_up_to() + e.error_len().unwrap_or(1);
                tracing::debug!(offset = e.valid_up_to(), "Replacing invalid UTF-8 in child output");
                let out = String::from_utf8_lossy(&src[..end]).into_owned();
                src.advance(end);
                Ok(Some(out))
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                let out = String::from_utf8_lossy(src).into_owned();
                src.clear();
                Ok(Some(out))
            }
        }
    }
}

/// Read `io` to end of stream, handing each decoded text chunk to `on_chunk`
/// in arrival order
pub async fn stream_chunks<R, F>(io: R, mut on_chunk: F) -> Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut frames = FramedRead::with_capacity(io, Utf8Codec, 1024);
    while let Some(frame) = frames.next().await {
        on_chunk(frame?);
    }
    Ok(())
}
