use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::framing::Connection;
use super::{
    CHECK_AVAILABLE, DEFAULT_MAX_PAYLOAD_LEN, GET, INVALID_SESSION, NOT_AVAILABLE, STORE,
};
use crate::auth::SessionAuthority;
use crate::error::ImageError;
use crate::imaging::ImageKey;
use crate::store::ImageStore;

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Source of inbound connections.
#[async_trait]
pub trait Acceptor: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next connection and a printable peer address.
    async fn accept(&mut self) -> io::Result<(Self::Stream, String)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, String)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        Ok((stream, peer.to_string()))
    }
}

/// Server half of the wire protocol, answering one exchange per connection.
#[derive(Clone)]
pub struct ImageServer {
    store: Arc<dyn ImageStore>,
    authority: Arc<dyn SessionAuthority>,
    max_payload_len: usize,
}

impl ImageServer {
    pub fn new(store: Arc<dyn ImageStore>, authority: Arc<dyn SessionAuthority>) -> Self {
        Self {
            store,
            authority,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }

    /// Bound on an uploaded payload, in base64 bytes.
    pub fn with_max_payload_len(mut self, limit: usize) -> Self {
        self.max_payload_len = limit;
        self
    }

    /// Accept TCP connections forever, handling each on its own task.
    pub async fn run(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Image server listening");
        }
        self.serve(listener).await
    }

    /// Accept connections from `acceptor` forever.
    ///
    /// Accept failures (descriptor exhaustion, aborted handshakes) are logged
    /// and retried after a short pause.
    pub async fn serve<A: Acceptor>(self, mut acceptor: A) {
        loop {
            let (stream, peer) = match acceptor.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    continue;
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream).await {
                    warn!(peer = %peer, error = %e, "Connection failed");
                }
            });
        }
    }

    /// Serve a single exchange on `stream` and close it.
    pub async fn handle_connection<S>(&self, stream: S) -> Result<(), ImageError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut conn = Connection::new(stream);
        let Some(command) = conn.read_line().await? else {
            return Ok(());
        };

        match command.as_str() {
            CHECK_AVAILABLE => self.check_available(&mut conn).await?,
            GET => self.get(&mut conn).await?,
            STORE => self.store(&mut conn).await?,
            other => {
                debug!(command = other, "Unknown command");
                conn.write_line(&format!("Unknown command: {}", other))
                    .await?;
            }
        }

        conn.finish().await
    }

    async fn check_available<S>(&self, conn: &mut Connection<S>) -> Result<(), ImageError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let line = read_required_line(conn, "image key").await?;
        let available = match ImageKey::parse(&line) {
            Ok(key) => self.store.is_available(&key).await,
            Err(_) => false,
        };
        debug!(key = %line, available, "CHECK_AVAILABLE");
        let reply = if available { CHECK_AVAILABLE } else { NOT_AVAILABLE };
        conn.write_line(reply).await
    }

    async fn get<S>(&self, conn: &mut Connection<S>) -> Result<(), ImageError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let line = read_required_line(conn, "image key").await?;
        let key = match ImageKey::parse(&line) {
            Ok(key) => key,
            Err(e) => return conn.write_line(&e.to_string()).await,
        };

        match self.store.retrieve_encoded(&key).await {
            Ok(Some(data)) => {
                debug!(key = %key, bytes = data.len(), "GET");
                conn.write_line(GET).await?;
                conn.write_payload(&data).await
            }
            Ok(None) => {
                debug!(key = %key, "GET miss");
                conn.write_line(&not_found_line(&key)).await
            }
            Err(e) => {
                error!(key = %key, error = %e, "Failed to load page image");
                conn.write_line(&not_found_line(&key)).await
            }
        }
    }

    async fn store<S>(&self, conn: &mut Connection<S>) -> Result<(), ImageError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let token = read_required_line(conn, "session token").await?;
        let line = read_required_line(conn, "image key").await?;

        if !self.authority.is_valid_session(&token).await {
            warn!(key = %line, "STORE rejected: invalid session");
            // Bounded drain so the client sees the reply after its half-close
            conn.discard(self.max_payload_len).await?;
            return conn.write_line(INVALID_SESSION).await;
        }

        let result = match ImageKey::parse(&line) {
            Ok(key) => match conn.read_payload_to_end(self.max_payload_len).await {
                Ok(data) => self
                    .store
                    .store_encoded(&key, Bytes::from(data))
                    .await
                    .map(|()| key),
                Err(e) => Err(e),
            },
            Err(e) => {
                conn.discard(self.max_payload_len).await?;
                Err(e)
            }
        };

        match result {
            Ok(key) => {
                info!(key = %key, "Stored page image");
                conn.write_line(STORE).await
            }
            Err(e) => {
                warn!(key = %line, error = %e, "STORE failed");
                conn.write_line(&format!("Could not store image {}: {}", line, e))
                    .await
            }
        }
    }
}

impl std::fmt::Debug for ImageServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageServer")
            .field("max_payload_len", &self.max_payload_len)
            .finish_non_exhaustive()
    }
}

async fn read_required_line<S>(conn: &mut Connection<S>, what: &str) -> Result<String, ImageError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.read_line()
        .await?
        .ok_or_else(|| ImageError::Protocol(format!("connection closed before {}", what)))
}

fn not_found_line(key: &ImageKey) -> String {
    format!(
        "Could not find or load image of page {} in document {}",
        key.page(),
        key.doc_id()
    )
}
