use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::TcpStream;
use tracing::debug;

use super::framing::Connection;
use super::{CHECK_AVAILABLE, DEFAULT_MAX_PAYLOAD_LEN, GET, INVALID_SESSION, NOT_AVAILABLE, STORE};
use crate::error::ImageError;
use crate::imaging::{ImageKey, PageImage, PageImageMeta};
use crate::store::PageImageSource;

/// Client half of the wire protocol. Opens a new connection per exchange.
#[derive(Debug, Clone)]
pub struct RemoteImageClient {
    addr: String,
    name: Arc<str>,
}

impl RemoteImageClient {
    /// `addr` is anything [`TcpStream::connect`] accepts, e.g. `"127.0.0.1:15555"`.
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let name = Arc::from(format!("remote:{}", addr));
        Self { addr, name }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<Connection<TcpStream>, ImageError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| ImageError::Transport(format!("connect to {}: {}", self.addr, e)))?;
        Ok(Connection::new(stream))
    }

    /// Ask the server whether `key` exists, surfacing failures.
    pub async fn check_available(&self, key: &ImageKey) -> Result<bool, ImageError> {
        let mut conn = self.connect().await?;
        conn.write_line(CHECK_AVAILABLE).await?;
        conn.write_line(&key.to_string()).await?;
        conn.finish().await?;

        match conn.read_line().await?.as_deref() {
            Some(CHECK_AVAILABLE) => Ok(true),
            Some(NOT_AVAILABLE) => Ok(false),
            Some(other) => Err(ImageError::Protocol(format!(
                "unexpected reply to {}: {}",
                CHECK_AVAILABLE, other
            ))),
            None => Err(ImageError::Protocol(format!(
                "empty reply to {}",
                CHECK_AVAILABLE
            ))),
        }
    }

    /// Fetch the encoded image for `key`.
    ///
    /// Any first reply line other than the echoed command is the server's
    /// explanation of why the image is unavailable.
    pub async fn get(&self, key: &ImageKey) -> Result<Bytes, ImageError> {
        let mut conn = self.connect().await?;
        conn.write_line(GET).await?;
        conn.write_line(&key.to_string()).await?;
        conn.finish().await?;

        match conn.read_line().await? {
            Some(line) if line == GET => {
                let data = conn.read_payload_to_end(DEFAULT_MAX_PAYLOAD_LEN).await?;
                PageImageMeta::parse(&data)?;
                debug!(key = %key, bytes = data.len(), upstream = %self.addr, "Fetched page image");
                Ok(Bytes::from(data))
            }
            Some(message) => Err(ImageError::NotFound(message)),
            None => Err(ImageError::Protocol(format!("empty reply to {}", GET))),
        }
    }

    /// Upload `image` under `key`, authenticated by `session_token`.
    pub async fn store(
        &self,
        session_token: &str,
        key: &ImageKey,
        image: &PageImage,
    ) -> Result<(), ImageError> {
        let data = image.encode()?;
        self.store_encoded(session_token, key, &data).await
    }

    /// Upload already encoded page image bytes.
    pub async fn store_encoded(
        &self,
        session_token: &str,
        key: &ImageKey,
        data: &[u8],
    ) -> Result<(), ImageError> {
        let mut conn = self.connect().await?;
        conn.write_line(STORE).await?;
        conn.write_line(session_token).await?;
        conn.write_line(&key.to_string()).await?;
        conn.write_payload(data).await?;
        conn.finish().await?;

        match conn.read_line().await? {
            Some(line) if line == STORE => Ok(()),
            Some(line) if line.starts_with(INVALID_SESSION) => {
                Err(ImageError::Authentication(line))
            }
            Some(line) => Err(ImageError::Protocol(line)),
            None => Err(ImageError::Protocol(format!("empty reply to {}", STORE))),
        }
    }
}

#[async_trait]
impl PageImageSource for RemoteImageClient {
    async fn is_available(&self, key: &ImageKey) -> bool {
        match self.check_available(key).await {
            Ok(available) => available,
            Err(e) => {
                debug!(key = %key, error = %e, "Availability check failed");
                false
            }
        }
    }

    async fn fetch(&self, key: &ImageKey) -> Result<Bytes, ImageError> {
        self.get(key).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
