//! Storage for per-session authentication state.
//!
//! [`SessionStore`] is the seam for other backends; the crate ships the
//! in-memory [`InMemorySessionStore`].

pub mod session;

pub use session::{InMemorySessionStore, SessionLocks, SessionStore, SessionStoreStats};
