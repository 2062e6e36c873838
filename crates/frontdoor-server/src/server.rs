use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router, middleware,
    routing::get,
};
use frontdoor_auth::{
    AuthError, DpopKeyManager, KeyLoadError, OAuthFlow,
    middleware::{AuthFilterState, LOGIN_PATH, PublicPaths, SessionCookie, session_auth_filter},
    storage::{InMemorySessionStore, SessionStore},
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{config::AppConfig, handlers};

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("DPoP key setup failed: {0}")]
    Keys(#[from] KeyLoadError),
}

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<OAuthFlow>,
    pub cookie: SessionCookie,
    pub public_paths: Arc<PublicPaths>,
}

impl AppState {
    /// Wires the login flow from configuration.
    ///
    /// `dpop_keys` must be given when `oauth.dpop_enabled` is set.
    pub fn new(
        cfg: &AppConfig,
        dpop_keys: Option<Arc<DpopKeyManager>>,
    ) -> Result<Self, StartupError> {
        let client = Arc::new(cfg.client_config().map_err(StartupError::Config)?);
        let store: Arc<dyn SessionStore> =
            Arc::new(InMemorySessionStore::new(cfg.session.idle_timeout));
        let flow = Arc::new(OAuthFlow::new(client, dpop_keys, store)?);

        Ok(Self {
            flow,
            cookie: SessionCookie::new(
                cfg.session.cookie_name.clone(),
                cfg.session.secure_cookies,
            ),
            public_paths: Arc::new(PublicPaths::new(&cfg.filter.extra_public_paths)),
        })
    }

    fn filter_state(&self) -> AuthFilterState {
        AuthFilterState {
            flow: Arc::clone(&self.flow),
            cookie: self.cookie.clone(),
            public_paths: Arc::clone(&self.public_paths),
        }
    }
}

pub fn build_app(state: &AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route(LOGIN_PATH, get(handlers::login))
        .route(
            handlers::AUTHORIZE_PATH,
            get(handlers::authorize).post(handlers::authorize),
        )
        .route("/oauth2/callback", get(handlers::callback))
        .route("/logout", get(handlers::logout).post(handlers::logout))
        .route("/home", get(handlers::home))
        // Middleware stack (order: trace -> session filter)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|req: &axum::http::Request<_>| {
                            // Path only: the callback query carries the code and state
                            tracing::info_span!(
                                "http.request",
                                http.method = %req.method(),
                                http.path = %req.uri().path(),
                                http.status_code = tracing::field::Empty,
                            )
                        })
                        .on_response(
                            |res: &axum::http::Response<_>,
                             latency: Duration,
                             span: &tracing::Span| {
                                span.record(
                                    "http.status_code",
                                    tracing::field::display(res.status().as_u16()),
                                );
                                tracing::info!(
                                    http.status = %res.status().as_u16(),
                                    elapsed_ms = %latency.as_millis(),
                                    "request handled"
                                );
                            },
                        ),
                )
                .layer(middleware::from_fn_with_state(
                    state.filter_state(),
                    session_auth_filter,
                )),
        )
        .with_state(state.clone())
}

/// Periodically drops idle sessions.
pub fn spawn_session_purger(flow: Arc<OAuthFlow>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = flow.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, "Purged idle sessions");
            }
        }
    })
}

pub struct FrontdoorServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    purge_interval: Duration,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    dpop_keys: Option<Arc<DpopKeyManager>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            dpop_keys: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses the given keypair instead of loading one from `dpop` settings.
    pub fn with_dpop_keys(mut self, keys: Arc<DpopKeyManager>) -> Self {
        self.dpop_keys = Some(keys);
        self
    }

    pub fn build(self) -> Result<FrontdoorServer, StartupError> {
        let dpop_keys = match self.dpop_keys {
            Some(keys) => Some(keys),
            None if self.config.oauth.dpop_enabled => Some(Arc::new(
                DpopKeyManager::load_or_generate(&self.config.dpop)?,
            )),
            None => None,
        };

        let state = AppState::new(&self.config, dpop_keys)?;
        let app = build_app(&state);

        Ok(FrontdoorServer {
            addr: self.addr,
            app,
            state,
            purge_interval: self.config.session.purge_interval,
        })
    }
}

impl FrontdoorServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let purger = spawn_session_purger(Arc::clone(&self.state.flow), self.purge_interval);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        purger.abort();
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
