//! The calshare daemon.
//!
//! Reconciles two independent inbound channels into one per-identity
//! authorization and command-execution state machine:
//!
//! - chat commands arriving over the Unix command socket, and
//! - OAuth2 redirect callbacks arriving over the HTTP callback listener.
//!
//! Both feed the same durable [`AuthStore`] through the
//! [`AuthCoordinator`], which owns nonce correlation and token freshness.
//! Authorized commands flow through the [`AclGateway`] to the calendar
//! service.
//!
//! [`AuthStore`]: calshare_store::AuthStore

mod callback;
mod config;
mod coordinator;
mod dispatcher;
mod error;
mod gateway;
mod handler;
mod pidfile;
mod retry;
mod signals;
mod socket;

pub use callback::CallbackServer;
pub use config::{RetryConfig, ServerConfig, default_socket_path};
pub use coordinator::{AuthCoordinator, AuthFlowError, AuthFlowResult};
pub use dispatcher::Dispatcher;
pub use error::{ServerError, ServerResult};
pub use gateway::{AclGateway, GatewayError, GatewayResult};
pub use handler::{RequestHandler, make_connection_handler};
pub use pidfile::{PidFile, default_pid_path};
pub use retry::with_retry;
pub use signals::{ShutdownSignal, SignalHandler};
pub use socket::{Connection, SocketServer};
