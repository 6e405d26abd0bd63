use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};

use super::MAX_LINE_LEN;
use crate::error::ImageError;

/// Raw bytes per base64 line. A multiple of 3 so no line carries interior padding.
pub const PAYLOAD_CHUNK_SIZE: usize = 3 * 1024;

/// One protocol exchange over a byte stream.
///
/// Text lines are `\n` terminated. Binary payloads are base64 encoded and run
/// until the peer closes its write side.
pub struct Connection<S> {
    stream: BufStream<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Read one line without its terminator. `None` at end of stream.
    ///
    /// A final line missing its `\n` is still returned. Lines longer than
    /// [`MAX_LINE_LEN`] are a protocol error.
    pub async fn read_line(&mut self) -> Result<Option<String>, ImageError> {
        let mut line = String::new();
        let read = (&mut self.stream)
            .take(MAX_LINE_LEN as u64 + 1)
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if read > MAX_LINE_LEN && !line.ends_with('\n') {
            return Err(ImageError::Protocol(format!(
                "line exceeds {} bytes",
                MAX_LINE_LEN
            )));
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    pub async fn write_line(&mut self, line: &str) -> Result<(), ImageError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        Ok(())
    }

    /// Write `data` base64 encoded, one line per [`PAYLOAD_CHUNK_SIZE`] raw bytes.
    pub async fn write_payload(&mut self, data: &[u8]) -> Result<(), ImageError> {
        let mut encoded = String::with_capacity(PAYLOAD_CHUNK_SIZE / 3 * 4 + 1);
        for chunk in data.chunks(PAYLOAD_CHUNK_SIZE) {
            encoded.clear();
            STANDARD.encode_string(chunk, &mut encoded);
            encoded.push('\n');
            self.stream.write_all(encoded.as_bytes()).await?;
        }
        Ok(())
    }

    /// Read everything up to end of stream without decoding it.
    ///
    /// More than `limit` bytes is a protocol error.
    pub async fn read_raw_to_end(&mut self, limit: usize) -> Result<Vec<u8>, ImageError> {
        let mut raw = Vec::new();
        (&mut self.stream)
            .take(limit as u64 + 1)
            .read_to_end(&mut raw)
            .await?;
        if raw.len() > limit {
            return Err(ImageError::Protocol(format!(
                "payload exceeds {} bytes",
                limit
            )));
        }
        Ok(raw)
    }

    /// Read and decode a base64 payload of at most `limit` encoded bytes.
    pub async fn read_payload_to_end(&mut self, limit: usize) -> Result<Vec<u8>, ImageError> {
        let raw = self.read_raw_to_end(limit).await?;
        decode_payload(&raw)
    }

    /// Skip up to `limit` bytes of input without keeping them.
    pub async fn discard(&mut self, limit: usize) -> Result<u64, ImageError> {
        let mut bounded = (&mut self.stream).take(limit as u64);
        Ok(tokio::io::copy(&mut bounded, &mut tokio::io::sink()).await?)
    }

    /// Flush buffered output and close the write side.
    ///
    /// Reading remains possible, which is how a client waits for the reply to
    /// a payload it has just terminated.
    pub async fn finish(&mut self) -> Result<(), ImageError> {
        self.stream.flush().await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Decode base64 text, ignoring ASCII whitespace (line breaks between chunks).
pub fn decode_payload(raw: &[u8]) -> Result<Vec<u8>, ImageError> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|e| ImageError::Decode(format!("invalid base64 payload: {}", e)))
}
