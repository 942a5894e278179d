//! HTTP listener for the OAuth redirect callback.
//!
//! The authorization server redirects the user's browser to
//! `GET /oauth2callback?state=<nonce>&code=<code>` (or `error=<reason>`
//! when the grant was denied). This listener parses the query string,
//! feeds the coordinator and answers with a minimal self-closing page.
//!
//! TLS is an external collaborator: in production a reverse proxy
//! terminates HTTPS on the registered redirect URL and forwards plain
//! HTTP here, which is why this listens on a loopback/internal address
//! by default.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::coordinator::AuthCoordinator;
use crate::error::ServerResult;

/// Callback route, matching the redirect URL registered with the
/// authorization server.
const CALLBACK_PATH: &str = "/oauth2callback";

/// A slow or stalled client may not pin a handler task forever.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

const PAGE_SUCCESS: &str = "<html><body><h1>Authorization complete</h1>\
    <p>You can close this window and return to the chat.</p>\
    <script>window.close()</script></body></html>";

const PAGE_FAILURE: &str = "<html><body><h1>Authorization failed</h1>\
    <p>The link may have expired. Ask the bot for a new one and try again.</p>\
    <script>window.close()</script></body></html>";

const PAGE_DENIED: &str = "<html><body><h1>Authorization cancelled</h1>\
    <p>You can close this window.</p>\
    <script>window.close()</script></body></html>";

const PAGE_NOT_FOUND: &str = "<html><body><h1>Not found</h1></body></html>";

/// HTTP listener feeding OAuth callbacks into the coordinator.
pub struct CallbackServer {
    listener: TcpListener,
    coordinator: Arc<AuthCoordinator>,
}

impl CallbackServer {
    /// Binds the callback listener on the given address.
    pub async fn bind(addr: SocketAddr, coordinator: Arc<AuthCoordinator>) -> ServerResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "OAuth callback listener bound");
        Ok(Self {
            listener,
            coordinator,
        })
    }

    /// Returns the bound address (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop indefinitely.
    pub async fn run(&self) -> ServerResult<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "callback connection accepted");
                    let coordinator = self.coordinator.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, coordinator).await {
                            debug!(error = %e, "callback connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept callback connection");
                }
            }
        }
    }

    /// Runs the accept loop until the shutdown future completes.
    pub async fn run_until_shutdown<S>(&self, shutdown: S) -> ServerResult<()>
    where
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!("callback listener shutting down");
                Ok(())
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    coordinator: Arc<AuthCoordinator>,
) -> std::io::Result<()> {
    let mut request_line = String::new();
    {
        let mut reader = BufReader::new(&mut stream);
        tokio::time::timeout(REQUEST_READ_TIMEOUT, reader.read_line(&mut request_line))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "request read"))??;
    }

    let response = match parse_request_target(&request_line) {
        Some(target) => respond_for_target(&target, &coordinator).await,
        None => http_response(400, PAGE_FAILURE),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Extracts the request target from an HTTP request line
/// (`GET /path?query HTTP/1.1`). Only GET is accepted.
fn parse_request_target(request_line: &str) -> Option<String> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    parts.next().map(str::to_string)
}

/// Query parameters the callback cares about.
#[derive(Debug, Default, PartialEq, Eq)]
struct CallbackParams {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
}

fn parse_query(query: &str) -> CallbackParams {
    let mut params = CallbackParams::default();
    for pair in query.split('&') {
        let mut kv = pair.splitn(2, '=');
        if let (Some(key), Some(value)) = (kv.next(), kv.next()) {
            let value = urlencoding::decode(value).unwrap_or_default().into_owned();
            match key {
                "state" => params.state = Some(value),
                "code" => params.code = Some(value),
                "error" => params.error = Some(value),
                _ => {}
            }
        }
    }
    params
}

async fn respond_for_target(target: &str, coordinator: &AuthCoordinator) -> String {
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != CALLBACK_PATH {
        return http_response(404, PAGE_NOT_FOUND);
    }

    let params = parse_query(query);

    if let Some(error) = params.error {
        // The user denied the grant (or the provider reported a failure):
        // burn the outstanding nonce so the link cannot be reused.
        warn!(error = %error, "authorization reported as failed by provider");
        if let Some(state) = params.state {
            let _ = coordinator.handle_callback_denied(&state);
        }
        return http_response(200, PAGE_DENIED);
    }

    match (params.state, params.code) {
        (Some(state), Some(code)) => match coordinator.handle_callback(&state, &code).await {
            Ok(chat_id) => {
                debug!(%chat_id, "callback accepted");
                http_response(200, PAGE_SUCCESS)
            }
            Err(e) => {
                warn!(error = %e, "callback rejected");
                http_response(400, PAGE_FAILURE)
            }
        },
        _ => http_response(400, PAGE_FAILURE),
    }
}

fn http_response(status: u16, body: &str) -> String {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Internal Server Error",
    };
    format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}
