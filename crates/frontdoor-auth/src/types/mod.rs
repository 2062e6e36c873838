//! Domain types shared across the crate.
//!
//! - [`SessionId`] - opaque session cookie value
//! - [`SessionAuthState`] - pending or authenticated state of one session

pub mod session;

pub use session::{AuthenticatedSession, SessionAuthState, SessionId};
