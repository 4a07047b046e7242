//! `Content-Length` framing for JSON-RPC over any async byte stream.

use super::error::ProtocolError;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Largest body accepted by default
pub const MAX_CONTENT_LENGTH: usize = 64 << 20;

pub struct MessageReader<R> {
    reader: BufReader<R>,
    limit: usize,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_limit(reader, MAX_CONTENT_LENGTH)
    }

    pub fn with_limit(reader: R, limit: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            limit,
        }
    }

    /// Read the next message. `Ok(None)` on a clean end of stream.
    ///
    /// A body that is not JSON is consumed before the error is returned, so
    /// the stream stays in sync and reading can continue.
    pub async fn read(&mut self) -> Result<Option<Value>, ProtocolError> {
        let mut content_length = None;
        let mut line = String::new();
        let mut saw_header = false;

        loop {
            line.clear();
            if self.reader.read_line(&mut line).await? == 0 {
                if saw_header {
                    return Err(ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into()));
                }
                return Ok(None);
            }
            let header = line.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                if saw_header {
                    break;
                }
                continue;
            }
            saw_header = true;

            let Some((name, value)) = header.split_once(':') else {
                return Err(ProtocolError::InvalidHeader(header.to_string()));
            };
            if name.trim().eq_ignore_ascii_case("content-length") {
                let length = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ProtocolError::InvalidHeader(header.to_string()))?;
                content_length = Some(length);
            }
        }

        let length = content_length.ok_or(ProtocolError::MissingContentLength)?;
        if length > self.limit {
            // Skip the body without buffering it so the next message still parses
            let skipped = tokio::io::copy(&mut (&mut self.reader).take(length as u64), &mut tokio::io::sink()).await?;
            if skipped < length as u64 {
                return Err(ProtocolError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
            return Err(ProtocolError::InvalidHeader(format!("Content-Length: {} exceeds {}", length, self.limit)));
        }
        let mut body = vec![0u8; length];
        self.reader.read_exact(&mut body).await?;
        Ok(Some(serde_json::from_slice(&body)?))
    }
}

pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write(&mut self, message: &Value) -> Result<(), ProtocolError> {
        let body = serde_json::to_vec(message)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(&body).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
