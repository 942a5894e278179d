//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Retry policy for transient remote failures.
///
/// Applied only at the coordinator/gateway boundary; the dispatcher never
/// retries anything.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for a single backoff.
    pub max_backoff: Duration,
    /// Multiplier applied per consecutive failure.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculates the backoff before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let multiplier = self.backoff_multiplier.powi(attempt as i32 - 1);
        let delay = base * multiplier;
        let max = self.max_backoff.as_secs_f64();

        Duration::from_secs_f64(delay.min(max))
    }
}

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the Unix socket transports connect to.
    pub socket_path: PathBuf,

    /// Listen address for the OAuth callback endpoint.
    pub callback_addr: SocketAddr,

    /// Path of the SQLite authorization database.
    pub db_path: PathBuf,

    /// How long an issued authorization link stays valid.
    pub nonce_ttl: Duration,

    /// How early before expiry an access token is refreshed.
    pub refresh_skew: Duration,

    /// Per-connection read/write timeout on the command socket.
    pub connection_timeout: Duration,

    /// Maximum concurrent socket connections.
    pub max_connections: usize,

    /// Whether to remove a stale socket file on startup.
    pub cleanup_stale_socket: bool,

    /// Retry policy for transient remote failures.
    pub retry: RetryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            callback_addr: SocketAddr::from(([127, 0, 0, 1], 8847)),
            db_path: PathBuf::from("calshare.db"),
            nonce_ttl: Duration::from_secs(600),
            refresh_skew: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
            max_connections: 100,
            cleanup_stale_socket: true,
            retry: RetryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Creates a configuration with the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Default::default()
        }
    }

    /// Builder: set the callback listen address.
    pub fn with_callback_addr(mut self, addr: SocketAddr) -> Self {
        self.callback_addr = addr;
        self
    }

    /// Builder: set the database path.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Builder: set the nonce TTL.
    pub fn with_nonce_ttl(mut self, ttl: Duration) -> Self {
        self.nonce_ttl = ttl;
        self
    }

    /// Builder: set the refresh skew.
    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    /// Builder: set the connection timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Builder: set the maximum concurrent connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder: set stale socket cleanup.
    pub fn with_cleanup_stale_socket(mut self, cleanup: bool) -> Self {
        self.cleanup_stale_socket = cleanup;
        self
    }

    /// Builder: set the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Returns the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/calshare.sock` if available, otherwise falls
/// back to `/tmp/calshare-$UID.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("calshare.sock")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/calshare-{}.sock", uid))
    }
}
