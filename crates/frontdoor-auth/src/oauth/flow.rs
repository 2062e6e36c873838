//! The login state machine.
//!
//! [`OAuthFlow`] drives a session through
//! `NoSession -> Pending -> Authenticated -> (Expired | LoggedOut) -> NoSession`.
//! Every transition that writes a session's record holds that session's
//! lock, so concurrent requests of one session observe the transitions in
//! order: of two racing callbacks, the second finds no pending login and
//! fails with `invalid_state`.

use std::sync::Arc;

use serde::Deserialize;
use time::OffsetDateTime;
use url::Url;

use super::authorize::AuthorizationUrlBuilder;
use super::pkce::PkceParams;
use super::token::{TokenClient, TokenResponse, build_http_client};
use super::userinfo::UserInfoClient;
use crate::AuthResult;
use crate::config::ClientConfig;
use crate::dpop::{DpopKeyManager, DpopProofGenerator};
use crate::error::AuthError;
use crate::middleware::types::AuthenticatedPrincipal;
use crate::storage::session::{SessionLocks, SessionStore};
use crate::types::session::{AuthenticatedSession, SessionAuthState, SessionId};

/// Query parameters of the authorization server's redirect back to us.
#[derive(Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// Echoed anti-CSRF state.
    pub state: Option<String>,
    /// Error code, when the authorization failed.
    pub error: Option<String>,
    /// Human-readable error description.
    pub error_description: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Drives login, callback, logout and per-request authentication.
pub struct OAuthFlow {
    config: Arc<ClientConfig>,
    url_builder: AuthorizationUrlBuilder,
    token_client: TokenClient,
    userinfo_client: Option<UserInfoClient>,
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
}

impl OAuthFlow {
    /// Creates the flow.
    ///
    /// `dpop_keys` is required when DPoP is enabled in `config` and ignored
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if DPoP is enabled without keys or
    /// the HTTP client cannot be built.
    pub fn new(
        config: Arc<ClientConfig>,
        dpop_keys: Option<Arc<DpopKeyManager>>,
        store: Arc<dyn SessionStore>,
    ) -> AuthResult<Self> {
        let dpop = match (config.dpop_enabled(), dpop_keys) {
            (true, Some(keys)) => Some(DpopProofGenerator::new(keys)),
            (true, None) => {
                return Err(AuthError::configuration(
                    "DPoP is enabled but no DPoP keys were provided",
                ));
            }
            (false, _) => None,
        };

        let http = build_http_client(config.request_timeout())?;
        let token_client = TokenClient::new(Arc::clone(&config), http.clone(), dpop.clone());
        let userinfo_client = config
            .userinfo_uri()
            .cloned()
            .map(|endpoint| UserInfoClient::new(endpoint, http, dpop));

        Ok(Self {
            url_builder: AuthorizationUrlBuilder::new(&config),
            config,
            token_client,
            userinfo_client,
            store,
            locks: SessionLocks::new(),
        })
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts a login for the session and returns the authorization URL.
    ///
    /// Any previous state of the session, including a logged-in one, is
    /// replaced by a fresh pending login.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn begin_login(&self, session: &SessionId) -> AuthResult<Url> {
        let _guard = self.locks.lock(session).await;

        let pkce = PkceParams::generate();
        self.store
            .save(
                session,
                SessionAuthState::pending(&pkce, OffsetDateTime::now_utc()),
            )
            .await?;

        tracing::info!(session = %session.log_id(), "Login started");

        Ok(self.url_builder.build(&pkce))
    }

    /// Handles the authorization server's redirect.
    ///
    /// On success the session becomes authenticated. On any failure the
    /// session's record is removed and the error is returned; its
    /// [`user_error_code`](AuthError::user_error_code) is what the user may
    /// see.
    ///
    /// # Errors
    ///
    /// - `AuthError::AuthorizationServer` if the redirect carries `error`
    /// - `AuthError::MissingParameter` if `code` or `state` is absent
    /// - `AuthError::CsrfValidation` if no login is pending or `state`
    ///   does not match
    /// - `AuthError::MissingPkceVerifier` if the pending login has no verifier
    /// - `AuthError::TokenExchange` or `AuthError::Signing` if the exchange
    ///   fails
    pub async fn complete_callback(
        &self,
        session: &SessionId,
        params: CallbackParams,
    ) -> AuthResult<AuthenticatedPrincipal> {
        let _guard = self.locks.lock(session).await;

        match self.handle_callback(session, params).await {
            Ok(principal) => {
                tracing::info!(
                    session = %session.log_id(),
                    username = %principal.username,
                    "Login completed"
                );
                Ok(principal)
            }
            Err(err) => {
                if let Err(remove_err) = self.store.remove(session).await {
                    tracing::error!(
                        session = %session.log_id(),
                        error = %remove_err,
                        "Failed to clear session after callback failure"
                    );
                }
                log_callback_failure(session, &err);
                Err(err)
            }
        }
    }

    async fn handle_callback(
        &self,
        session: &SessionId,
        params: CallbackParams,
    ) -> AuthResult<AuthenticatedPrincipal> {
        if let Some(error) = non_empty(params.error) {
            return Err(AuthError::authorization_server(
                error,
                params.error_description,
            ));
        }

        let code = non_empty(params.code).ok_or(AuthError::missing_parameter("code"))?;
        let state = non_empty(params.state).ok_or(AuthError::missing_parameter("state"))?;

        let code_verifier = match self.store.load(session).await? {
            Some(SessionAuthState::Pending {
                oauth_state,
                code_verifier,
                ..
            }) => {
                if oauth_state != state {
                    return Err(AuthError::csrf_validation("state does not match session"));
                }
                code_verifier
            }
            Some(SessionAuthState::Authenticated(_)) => {
                return Err(AuthError::csrf_validation("no login in progress"));
            }
            None => return Err(AuthError::csrf_validation("no session state")),
        };

        if code_verifier.is_empty() {
            return Err(AuthError::MissingPkceVerifier);
        }

        let token = self
            .token_client
            .exchange_code(&code, &code_verifier)
            .await?;
        let username = self.resolve_username(&token).await;

        let authenticated =
            AuthenticatedSession::from_token(token, username, OffsetDateTime::now_utc());
        let principal = AuthenticatedPrincipal::from_session(&authenticated);

        self.store
            .save(session, SessionAuthState::Authenticated(authenticated))
            .await?;

        Ok(principal)
    }

    async fn resolve_username(&self, token: &TokenResponse) -> String {
        let default = || self.config.default_username().to_string();

        let Some(client) = &self.userinfo_client else {
            return default();
        };

        match client.fetch(token).await {
            Ok(info) => info.username().map(str::to_string).unwrap_or_else(default),
            Err(err) => {
                tracing::warn!(error = %err, "UserInfo lookup failed, using default username");
                default()
            }
        }
    }

    /// Logs the session out. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn logout(&self, session: &SessionId) -> AuthResult<()> {
        let _guard = self.locks.lock(session).await;
        self.store.remove(session).await?;
        tracing::info!(session = %session.log_id(), "Logged out");
        Ok(())
    }

    /// Returns the principal of a logged-in session.
    ///
    /// Returns `None` if the session has no record, has a login in progress,
    /// or its token has expired. An expired record is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store fails.
    pub async fn authenticate(
        &self,
        session: &SessionId,
    ) -> AuthResult<Option<AuthenticatedPrincipal>> {
        let now = OffsetDateTime::now_utc();

        let Some(SessionAuthState::Authenticated(auth)) = self.store.load(session).await? else {
            return Ok(None);
        };

        if !auth.is_expired_at(now) {
            return Ok(Some(AuthenticatedPrincipal::from_session(&auth)));
        }

        // Re-check under the lock so a login started meanwhile is kept.
        let _guard = self.locks.lock(session).await;
        if let Some(SessionAuthState::Authenticated(current)) = self.store.load(session).await? {
            if current.is_expired_at(now) {
                self.store.remove(session).await?;
                tracing::info!(session = %session.log_id(), "Session token expired");
            }
        }

        Ok(None)
    }

    /// Purges idle sessions and unused locks. Returns the number of sessions
    /// removed.
    pub fn purge_expired(&self) -> usize {
        let removed = self.store.purge_expired();
        self.locks.prune();
        removed
    }
}

fn log_callback_failure(session: &SessionId, err: &AuthError) {
    match err {
        AuthError::TokenExchange { status, body, .. } => tracing::warn!(
            session = %session.log_id(),
            category = %err.category(),
            code = err.user_error_code(),
            status = ?status,
            body = body.as_deref().unwrap_or(""),
            error = %err,
            "Login callback failed"
        ),
        AuthError::AuthorizationServer { description, .. } => tracing::warn!(
            session = %session.log_id(),
            category = %err.category(),
            code = err.user_error_code(),
            description = description.as_deref().unwrap_or(""),
            error = %err,
            "Login callback failed"
        ),
        _ => tracing::warn!(
            session = %session.log_id(),
            category = %err.category(),
            code = err.user_error_code(),
            error = %err,
            "Login callback failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthClientSettings;
    use crate::storage::session::InMemorySessionStore;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> OAuthClientSettings {
        OAuthClientSettings {
            client_id: "frontdoor".to_string(),
            redirect_uri: "http://localhost:8080/oauth2/callback".to_string(),
            authorization_uri: format!("{}/authorize", server.uri()),
            token_uri: format!("{}/token", server.uri()),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        }
    }

    fn flow(settings: &OAuthClientSettings) -> (OAuthFlow, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::new(Duration::from_secs(60)));
        let config = Arc::new(ClientConfig::from_settings(settings).unwrap());
        let flow = OAuthFlow::new(config, None, store.clone()).unwrap();
        (flow, store)
    }

    fn state_param(url: &Url) -> String {
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    fn callback(code: &str, state: &str) -> CallbackParams {
        CallbackParams {
            code: Some(code.to_string()),
            state: Some(state.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_dpop_enabled_requires_keys() {
        let server = MockServer::start().await;
        let mut s = settings(&server);
        s.dpop_enabled = true;
        let config = Arc::new(ClientConfig::from_settings(&s).unwrap());
        let store = Arc::new(InMemorySessionStore::new(Duration::from_secs(60)));
        let err = OAuthFlow::new(config, None, store).err().unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_begin_login_stores_pending_state() {
        let server = MockServer::start().await;
        let (flow, store) = flow(&settings(&server));
        let session = SessionId::generate();

        let url = flow.begin_login(&session).await.unwrap();
        let state = state_param(&url);

        match store.load(&session).await.unwrap() {
            Some(SessionAuthState::Pending {
                oauth_state,
                code_verifier,
                ..
            }) => {
                assert_eq!(oauth_state, state);
                assert_eq!(code_verifier.len(), 64);
            }
            other => panic!("expected pending state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_login_replaces_first() {
        let server = MockServer::start().await;
        let (flow, _store) = flow(&settings(&server));
        let session = SessionId::generate();

        let first = state_param(&flow.begin_login(&session).await.unwrap());
        let second = state_param(&flow.begin_login(&session).await.unwrap());
        assert_ne!(first, second);

        let err = flow
            .complete_callback(&session, callback("code", &first))
            .await
            .unwrap_err();
        assert_eq!(err.user_error_code(), "invalid_state");
    }

    #[tokio::test]
    async fn test_provider_error_is_forwarded_and_clears_session() {
        let server = MockServer::start().await;
        let (flow, store) = flow(&settings(&server));
        let session = SessionId::generate();
        flow.begin_login(&session).await.unwrap();

        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            error_description: Some("user said no".to_string()),
            ..Default::default()
        };
        let err = flow.complete_callback(&session, params).await.unwrap_err();
        assert_eq!(err.user_error_code(), "access_denied");
        assert!(store.load(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let server = MockServer::start().await;
        let (flow, store) = flow(&settings(&server));
        let session = SessionId::generate();

        let url = flow.begin_login(&session).await.unwrap();
        let params = CallbackParams {
            state: Some(state_param(&url)),
            ..Default::default()
        };
        let err = flow.complete_callback(&session, params).await.unwrap_err();
        assert_eq!(err.user_error_code(), "missing_code");
        assert!(store.load(&session).await.unwrap().is_none());

        flow.begin_login(&session).await.unwrap();
        let params = CallbackParams {
            code: Some("abc".to_string()),
            state: Some(String::new()),
            ..Default::default()
        };
        let err = flow.complete_callback(&session, params).await.unwrap_err();
        assert_eq!(err.user_error_code(), "missing_state");
    }

    #[tokio::test]
    async fn test_missing_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let (flow, store) = flow(&settings(&server));
        let session = SessionId::generate();

        store
            .save(
                &session,
                SessionAuthState::Pending {
                    oauth_state: "s".repeat(32),
                    code_verifier: String::new(),
                    started_at: OffsetDateTime::now_utc(),
                },
            )
            .await
            .unwrap();

        let err = flow
            .complete_callback(&session, callback("abc", &"s".repeat(32)))
            .await
            .unwrap_err();
        assert_eq!(err.user_error_code(), "missing_code_verifier");
        assert!(store.load(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_successful_callback_uses_default_username() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        let (flow, _store) = flow(&settings(&server));
        let session = SessionId::generate();

        let state = state_param(&flow.begin_login(&session).await.unwrap());
        let principal = flow
            .complete_callback(&session, callback("abc", &state))
            .await
            .unwrap();
        assert_eq!(principal.username, "oauth-user");

        let principal = flow.authenticate(&session).await.unwrap().unwrap();
        assert_eq!(principal.access_token, "at");
        assert_eq!(principal.token_type, "Bearer");
    }

    #[tokio::test]
    async fn test_userinfo_provides_username() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "at"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sub": "1", "email": "bob@example.com"})),
            )
            .mount(&server)
            .await;

        let mut s = settings(&server);
        s.userinfo_uri = format!("{}/userinfo", server.uri());
        let (flow, _store) = flow(&s);
        let session = SessionId::generate();

        let state = state_param(&flow.begin_login(&session).await.unwrap());
        let principal = flow
            .complete_callback(&session, callback("abc", &state))
            .await
            .unwrap();
        assert_eq!(principal.username, "bob@example.com");
    }

    #[tokio::test]
    async fn test_userinfo_failure_does_not_fail_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "at"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut s = settings(&server);
        s.userinfo_uri = format!("{}/userinfo", server.uri());
        s.default_username = "guest".to_string();
        let (flow, _store) = flow(&s);
        let session = SessionId::generate();

        let state = state_param(&flow.begin_login(&session).await.unwrap());
        let principal = flow
            .complete_callback(&session, callback("abc", &state))
            .await
            .unwrap();
        assert_eq!(principal.username, "guest");
    }

    #[tokio::test]
    async fn test_callback_after_login_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "at"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        let (flow, store) = flow(&settings(&server));
        let session = SessionId::generate();

        let state = state_param(&flow.begin_login(&session).await.unwrap());
        flow.complete_callback(&session, callback("abc", &state))
            .await
            .unwrap();

        // Replaying the redirect must not exchange the code again.
        let err = flow
            .complete_callback(&session, callback("abc", &state))
            .await
            .unwrap_err();
        assert_eq!(err.user_error_code(), "invalid_state");
        assert!(store.load(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_callbacks_exchange_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "at"}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let (flow, _store) = flow(&settings(&server));
        let session = SessionId::generate();

        let state = state_param(&flow.begin_login(&session).await.unwrap());
        let (first, second) = tokio::join!(
            flow.complete_callback(&session, callback("abc", &state)),
            flow.complete_callback(&session, callback("abc", &state)),
        );

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(err.user_error_code(), "invalid_state");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_removes_expired_session() {
        let server = MockServer::start().await;
        let (flow, store) = flow(&settings(&server));
        let session = SessionId::generate();

        store
            .save(
                &session,
                SessionAuthState::Authenticated(AuthenticatedSession {
                    access_token: "at".to_string(),
                    token_type: "Bearer".to_string(),
                    expires_in: Some(60),
                    refresh_token: None,
                    scope: None,
                    id_token: None,
                    username: "alice".to_string(),
                    issued_at: OffsetDateTime::now_utc() - time::Duration::minutes(5),
                }),
            )
            .await
            .unwrap();

        assert!(flow.authenticate(&session).await.unwrap().is_none());
        assert!(store.load(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_pending_is_not_logged_in() {
        let server = MockServer::start().await;
        let (flow, store) = flow(&settings(&server));
        let session = SessionId::generate();

        flow.begin_login(&session).await.unwrap();
        assert!(flow.authenticate(&session).await.unwrap().is_none());
        // pending login is kept
        assert!(store.load(&session).await.unwrap().unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let server = MockServer::start().await;
        let (flow, store) = flow(&settings(&server));
        let session = SessionId::generate();

        flow.begin_login(&session).await.unwrap();
        flow.logout(&session).await.unwrap();
        flow.logout(&session).await.unwrap();
        assert!(store.load(&session).await.unwrap().is_none());
    }
}
