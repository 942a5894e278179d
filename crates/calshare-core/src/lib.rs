//! Core types: chat identity, authorization state machine, share roles.

pub mod email;
pub mod identity;
pub mod role;
pub mod state;
pub mod tracing;

pub use email::is_valid_grantee;
pub use identity::ChatId;
pub use role::{ShareRole, UnknownRole};
pub use state::{AuthState, AuthStatus, TokenSet};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
