//! Unix socket listener for transport adapters.
//!
//! Chat transport adapters connect here and speak the length-prefixed
//! JSON protocol from `calshare-protocol`. Each connection is handled on
//! its own task; a semaphore bounds how many run at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use calshare_protocol::{
    CommandRequest, Envelope, MAX_MESSAGE_SIZE, ProtocolError, Reply,
};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Unix socket server accepting adapter connections.
pub struct SocketServer {
    socket_path: PathBuf,
    connection_timeout: Duration,
    listener: UnixListener,
    connection_semaphore: Arc<Semaphore>,
}

impl SocketServer {
    /// Binds the socket described by the configuration.
    ///
    /// A leftover socket file from a crashed instance is removed if
    /// nothing answers on it (and `cleanup_stale_socket` is set); a live
    /// one means another daemon owns the path.
    pub async fn new(config: &ServerConfig) -> ServerResult<Self> {
        let socket_path = &config.socket_path;

        if let Some(parent) = socket_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            return Err(ServerError::socket_path_invalid(
                parent.to_string_lossy().to_string(),
            ));
        }

        if socket_path.exists() {
            if !config.cleanup_stale_socket {
                return Err(ServerError::socket_in_use(
                    socket_path.to_string_lossy().to_string(),
                ));
            }
            match UnixStream::connect(socket_path).await {
                Ok(_) => {
                    return Err(ServerError::socket_in_use(
                        socket_path.to_string_lossy().to_string(),
                    ));
                }
                Err(_) => {
                    info!(path = %socket_path.display(), "removing stale socket");
                    std::fs::remove_file(socket_path)?;
                }
            }
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(path = %socket_path.display(), "command socket listening");

        Ok(Self {
            socket_path: socket_path.clone(),
            connection_timeout: config.connection_timeout,
            listener,
            connection_semaphore: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accepts a single connection.
    pub async fn accept(&self) -> ServerResult<Connection> {
        let permit = self
            .connection_semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore should not be closed");

        let (stream, _addr) = self.listener.accept().await?;
        debug!("accepted adapter connection");

        Ok(Connection {
            stream,
            timeout: self.connection_timeout,
            _permit: permit,
        })
    }

    /// Runs the accept loop, spawning the handler for each connection.
    pub async fn run<F, Fut>(&self, handler: F) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        loop {
            match self.accept().await {
                Ok(connection) => {
                    tokio::spawn(handler(connection));
                }
                Err(e) => {
                    // Keep accepting; one bad accept is not fatal.
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    /// Runs the accept loop until the shutdown future completes.
    pub async fn run_until_shutdown<F, Fut, S>(&self, handler: F, shutdown: S) -> ServerResult<()>
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run(handler) => result,
            _ = shutdown => {
                info!("command socket shutting down");
                Ok(())
            }
        }
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(path = %self.socket_path.display(), error = %e, "failed to remove socket file");
            } else {
                debug!(path = %self.socket_path.display(), "removed socket file");
            }
        }
    }
}

/// One adapter connection.
pub struct Connection {
    stream: UnixStream,
    timeout: Duration,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Connection {
    /// Reads a request envelope. Returns `Ok(None)` on clean disconnect.
    pub async fn read_request(&mut self) -> ServerResult<Option<Envelope<CommandRequest>>> {
        let mut len_buf = [0u8; 4];
        match tokio::time::timeout(self.timeout, self.stream.read_exact(&mut len_buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ServerError::Protocol(ProtocolError::Timeout {
                    operation: "read request length".to_string(),
                }));
            }
        }

        let len = u32::from_be_bytes(len_buf) as usize;

        if len > MAX_MESSAGE_SIZE as usize {
            return Err(ServerError::Protocol(ProtocolError::MessageTooLarge {
                size: len as u32,
                max: MAX_MESSAGE_SIZE,
            }));
        }
        if len == 0 {
            return Err(ServerError::Protocol(ProtocolError::EmptyMessage));
        }

        let mut payload = vec![0u8; len];
        match tokio::time::timeout(self.timeout, self.stream.read_exact(&mut payload)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ServerError::Protocol(ProtocolError::Timeout {
                    operation: "read request payload".to_string(),
                }));
            }
        }

        let envelope: Envelope<CommandRequest> =
            serde_json::from_slice(&payload).map_err(ProtocolError::from)?;
        Ok(Some(envelope))
    }

    /// Writes a reply envelope.
    pub async fn write_reply(&mut self, envelope: &Envelope<Reply>) -> ServerResult<()> {
        let json = serde_json::to_vec(envelope).map_err(ProtocolError::from)?;

        let len = json.len() as u32;
        if len > MAX_MESSAGE_SIZE {
            return Err(ServerError::Protocol(ProtocolError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE,
            }));
        }

        let mut buffer = Vec::with_capacity(4 + json.len());
        buffer.extend_from_slice(&len.to_be_bytes());
        buffer.extend_from_slice(&json);

        match tokio::time::timeout(self.timeout, self.stream.write_all(&buffer)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ServerError::Protocol(ProtocolError::Timeout {
                operation: "write reply".to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn socket_server_creates_and_removes_socket_file() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let config = ServerConfig::new(&socket_path);
        let server = SocketServer::new(&config).await.unwrap();

        assert!(socket_path.exists());
        drop(server);
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn socket_server_rejects_duplicate() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        let config = ServerConfig::new(&socket_path).with_cleanup_stale_socket(false);
        let _server = SocketServer::new(&config).await.unwrap();

        let result = SocketServer::new(&config).await;
        assert!(matches!(result, Err(ServerError::SocketInUse { .. })));
    }

    #[tokio::test]
    async fn socket_server_cleans_stale_socket() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("test.sock");

        // A leftover file that is not a live socket.
        std::fs::write(&socket_path, b"stale").unwrap();

        let config = ServerConfig::new(&socket_path);
        let server = SocketServer::new(&config).await.unwrap();
        assert!(socket_path.exists());
        drop(server);
    }

    #[tokio::test]
    async fn socket_server_rejects_missing_parent_dir() {
        let dir = tempdir().unwrap();
        let socket_path = dir.path().join("missing").join("test.sock");

        let config = ServerConfig::new(&socket_path);
        let result = SocketServer::new(&config).await;
        assert!(matches!(result, Err(ServerError::SocketPathInvalid { .. })));
    }
}
