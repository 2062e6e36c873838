//! HTTP middleware for session authentication.
//!
//! - [`filter`] - the per-request gate and session cookie handling
//! - [`types`] - the request-scoped principal and its extractor
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use frontdoor_auth::middleware::{AuthFilterState, Principal, session_auth_filter};
//!
//! async fn home(Principal(user): Principal) -> String {
//!     format!("Hello, {}!", user.username)
//! }
//!
//! let app = Router::new()
//!     .route("/home", get(home))
//!     .layer(middleware::from_fn_with_state(filter_state, session_auth_filter));
//! ```

pub mod filter;
pub mod types;

pub use filter::{
    AuthFilterState, DEFAULT_PUBLIC_PATHS, LOGIN_PATH, PublicPaths, SessionCookie, found,
    session_auth_filter,
};
pub use types::{AuthenticatedPrincipal, Principal};
