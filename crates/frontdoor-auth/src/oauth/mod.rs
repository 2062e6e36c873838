//! OAuth 2.0 authorization code flow (client side).
//!
//! - [`pkce`] - state, code verifier and code challenge generation
//! - [`authorize`] - authorization request URL
//! - [`token`] - authorization code exchange
//! - [`userinfo`] - optional username lookup
//! - [`flow`] - the per-session login state machine

pub mod authorize;
pub mod flow;
pub mod pkce;
pub mod token;
pub mod userinfo;

pub use authorize::AuthorizationUrlBuilder;
pub use flow::{CallbackParams, OAuthFlow};
pub use pkce::{
    CODE_VERIFIER_LENGTH, PkceChallenge, PkceChallengeMethod, PkceError, PkceParams, PkceVerifier,
    STATE_LENGTH, code_challenge, generate_random_string,
};
pub use token::{TokenClient, TokenResponse, build_http_client};
pub use userinfo::{UserInfo, UserInfoClient};
