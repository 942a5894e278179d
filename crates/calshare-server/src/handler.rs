//! Per-connection request handling.
//!
//! Glues a socket [`Connection`] to the [`Dispatcher`]: read an envelope,
//! dispatch, answer with the correlated reply, repeat until the adapter
//! disconnects.

use std::sync::Arc;

use tracing::{debug, warn};

use calshare_protocol::{CommandRequest, Envelope, ErrorCode, PROTOCOL_VERSION, Reply};

use crate::dispatcher::Dispatcher;
use crate::error::ServerResult;
use crate::socket::Connection;

/// Handles requests from one or more connections.
pub struct RequestHandler {
    dispatcher: Arc<Dispatcher>,
}

impl RequestHandler {
    /// Creates a handler over the given dispatcher.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Handles a single request envelope and produces the reply envelope.
    pub async fn handle(&self, envelope: &Envelope<CommandRequest>) -> Envelope<Reply> {
        if !envelope.is_compatible() {
            warn!(
                version = %envelope.protocol_version,
                expected = %PROTOCOL_VERSION,
                "incompatible protocol version"
            );
            return Envelope::response(
                envelope.request_id.clone(),
                Reply::error(
                    ErrorCode::InvalidArguments,
                    format!(
                        "unsupported protocol version {:?} (expected {PROTOCOL_VERSION:?})",
                        envelope.protocol_version
                    ),
                ),
            );
        }

        let start = std::time::Instant::now();
        let reply = self.dispatcher.dispatch(&envelope.payload).await;
        debug!(
            command = %envelope.payload.command,
            chat_id = %envelope.payload.chat_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "request handled"
        );

        Envelope::response(envelope.request_id.clone(), reply)
    }

    /// Processes all requests on a connection until it closes.
    pub async fn handle_connection(&self, mut conn: Connection) -> ServerResult<()> {
        loop {
            match conn.read_request().await {
                Ok(Some(envelope)) => {
                    let response = self.handle(&envelope).await;
                    conn.write_reply(&response).await?;
                }
                Ok(None) => {
                    debug!("adapter disconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "error reading request");
                    return Err(e);
                }
            }
        }
    }
}

/// Creates the connection handler closure for [`SocketServer::run`].
///
/// [`SocketServer::run`]: crate::socket::SocketServer::run
pub fn make_connection_handler(
    dispatcher: Arc<Dispatcher>,
) -> impl Fn(Connection) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
+ Send
+ Sync
+ 'static {
    move |conn| {
        let handler = RequestHandler::new(dispatcher.clone());
        Box::pin(async move {
            if let Err(e) = handler.handle_connection(conn).await {
                warn!(error = %e, "connection handler error");
            }
        })
    }
}
