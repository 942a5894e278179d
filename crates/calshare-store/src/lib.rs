//! Durable per-identity authorization state storage.
//!
//! One SQLite row per chat identity, holding the current [`AuthState`]:
//! status tag, outstanding nonce (pending grants only) and token set
//! (authorized only). Writes are full-row replacements — there are no
//! partial field updates, so concurrent writers resolve to
//! last-writer-wins at identity granularity and a reader can never observe
//! a torn record.
//!
//! The database is opened with WAL journaling and `synchronous=FULL`, so a
//! [`AuthStore::put`] that has returned `Ok` is durable across a process
//! crash. Callers rely on this ordering: an authorization link is only
//! handed out after its nonce is on disk.
//!
//! [`AuthState`]: calshare_core::AuthState

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::AuthStore;
